//! Fixed 65-byte HID feature report layout of the legacy device family.
//!
//! The firmware views queries and responses as packed structs; here both
//! are a plain byte array with offset-based accessors so no layout tricks
//! are needed. All offsets are part of the device ABI:
//!
//! ```text
//! Query:    0 zero | 1 command id | 2..61 payload | 61..65 CRC (u32 LE)
//! Response: 0 zero | 1 device status | 2 command id | 3..7 echoed query
//!           CRC (u32 LE) | 7 command status | 8..61 payload | 61..65 CRC
//! ```
//!
//! Both checksums cover bytes `[1..61)`.

use crate::domain::crc32::stm_crc32;
use zeroize::Zeroize;

/// Total report size, including the leading zero byte.
pub const HID_REPORT_SIZE: usize = 65;

/// Payload capacity of a query report.
pub const QUERY_PAYLOAD_SIZE: usize = HID_REPORT_SIZE - 6;

/// Payload capacity of a response report.
pub const RESPONSE_PAYLOAD_SIZE: usize = HID_REPORT_SIZE - 12;

const CRC_OFFSET: usize = HID_REPORT_SIZE - 4;
const CRC_SPAN: core::ops::Range<usize> = 1..CRC_OFFSET;

/// Outgoing feature report.
#[derive(Clone, Zeroize)]
pub struct QueryReport {
    data: [u8; HID_REPORT_SIZE],
}

impl QueryReport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: [0; HID_REPORT_SIZE],
        }
    }

    pub fn clear(&mut self) {
        self.data.zeroize();
    }

    pub fn set_command_id(&mut self, command_id: u8) {
        self.data[1] = command_id;
    }

    /// Mutable view of the payload area.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[2..2 + QUERY_PAYLOAD_SIZE]
    }

    /// Compute and store the trailer checksum; returns the stored value so
    /// the caller can match it against the device's echo later.
    pub fn seal(&mut self) -> u32 {
        let crc = stm_crc32(&self.data[CRC_SPAN]);
        self.data[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        crc
    }

    #[must_use]
    pub fn crc(&self) -> u32 {
        u32::from_le_bytes([
            self.data[CRC_OFFSET],
            self.data[CRC_OFFSET + 1],
            self.data[CRC_OFFSET + 2],
            self.data[CRC_OFFSET + 3],
        ])
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HID_REPORT_SIZE] {
        &self.data
    }
}

impl Default for QueryReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Incoming feature report.
#[derive(Clone, Zeroize)]
pub struct ResponseReport {
    data: [u8; HID_REPORT_SIZE],
}

impl ResponseReport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: [0; HID_REPORT_SIZE],
        }
    }

    pub fn clear(&mut self) {
        self.data.zeroize();
    }

    /// Mutable view for the transport read.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; HID_REPORT_SIZE] {
        &mut self.data
    }

    /// Device busy/status field; zero means the device accepted the query.
    #[must_use]
    pub fn device_status(&self) -> u8 {
        self.data[1]
    }

    #[must_use]
    pub fn command_id(&self) -> u8 {
        self.data[2]
    }

    /// Checksum of the query this response answers, as echoed by the
    /// device.
    #[must_use]
    pub fn last_command_crc(&self) -> u32 {
        u32::from_le_bytes([self.data[3], self.data[4], self.data[5], self.data[6]])
    }

    /// Outcome of the echoed command.
    #[must_use]
    pub fn last_command_status(&self) -> u8 {
        self.data[7]
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[8..8 + RESPONSE_PAYLOAD_SIZE]
    }

    #[must_use]
    pub fn stored_crc(&self) -> u32 {
        u32::from_le_bytes([
            self.data[CRC_OFFSET],
            self.data[CRC_OFFSET + 1],
            self.data[CRC_OFFSET + 2],
            self.data[CRC_OFFSET + 3],
        ])
    }

    /// Whether the stored checksum matches the report contents.
    #[must_use]
    pub fn crc_valid(&self) -> bool {
        stm_crc32(&self.data[CRC_SPAN]) == self.stored_crc()
    }
}

impl Default for ResponseReport {
    fn default() -> Self {
        Self::new()
    }
}
