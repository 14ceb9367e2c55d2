//! CCID bulk-transfer envelope around APDUs.
//!
//! Every message carries a 10-byte header:
//!
//! ```text
//! Offset  Size  Description
//! 0       1     Message type (0x6F = XfrBlock out, 0x80 = DataBlock in)
//! 1       4     Payload length (little-endian)
//! 5       1     Slot number
//! 6       1     Sequence number
//! 7       1     Reserved / slot status on responses
//! 8       2     Parameter (little-endian); chain indicator at offset 9
//! 10      N     Payload
//! ```
//!
//! Responses are parsed out of the full receive buffer; the declared
//! payload length is validated against the buffer before any slice is
//! taken, so a device lying about lengths surfaces as an error instead of
//! an overread.

use thiserror::Error;

/// PC-to-reader transfer block message type.
pub const XFR_BLOCK: u8 = 0x6F;

/// Size of the envelope header.
pub const HEADER_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CcidError {
    #[error("CCID frame of {0} bytes is shorter than the {HEADER_SIZE}-byte header")]
    ShortFrame(usize),
    #[error("declared payload of {declared} bytes does not fit a {buffer} byte buffer")]
    LengthOutOfBounds { declared: usize, buffer: usize },
}

/// Wrap `payload` in a CCID envelope.
#[must_use]
pub fn compose(msg_type: u8, payload: &[u8], slot: u8, seq: u8, param: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.push(msg_type);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.push(slot);
    out.push(seq);
    out.push(0);
    out.extend_from_slice(&param.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// A parsed reader-to-PC envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IccResponse {
    /// Slot status byte (offset 7).
    pub status: u8,
    /// Chain indicator (offset 9).
    pub chain: u8,
    /// Payload bytes (offset 10 onward).
    pub data: Vec<u8>,
    /// Trailing ISO7816 status word, when the payload carries one.
    pub status_word: u16,
}

impl IccResponse {
    /// First payload byte, if any.
    #[must_use]
    pub fn first_data_byte(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

/// Parse a response envelope out of `buf`.
///
/// `buf` is the whole receive buffer, which may be larger than the frame;
/// the declared length must satisfy `HEADER_SIZE + len < buf.len()`.
pub fn parse(buf: &[u8]) -> Result<IccResponse, CcidError> {
    if buf.len() < HEADER_SIZE {
        return Err(CcidError::ShortFrame(buf.len()));
    }
    let data_len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    if HEADER_SIZE + data_len >= buf.len() {
        return Err(CcidError::LengthOutOfBounds {
            declared: data_len,
            buffer: buf.len(),
        });
    }
    let data = buf[HEADER_SIZE..HEADER_SIZE + data_len].to_vec();
    let status_word = if data_len >= 2 {
        u16::from_be_bytes([data[data_len - 2], data[data_len - 1]])
    } else {
        0
    };
    Ok(IccResponse {
        status: buf[7],
        chain: buf[9],
        data,
        status_word,
    })
}
