//! ISO7816 command APDU construction.
//!
//! The token only ever receives short APDUs: CLA, INS, P1, P2, then an
//! optional Lc/data section and an optional Le byte. A length byte is
//! emitted only when data is present, and Le is emitted only when it is
//! non-zero; the token does not expect an explicit Le of zero on any
//! command this tool sends.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApduError {
    #[error("APDU data of {0} bytes exceeds the short-APDU limit of 255")]
    DataTooLong(usize),
}

/// A command APDU ready to serialize.
#[derive(Debug, Clone)]
pub struct Apdu<'a> {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: &'a [u8],
    pub le: u8,
}

impl<'a> Apdu<'a> {
    /// Shorthand for the common zero-class, zero-parameter command.
    #[must_use]
    pub fn command(ins: u8, data: &'a [u8]) -> Self {
        Self {
            cla: 0,
            ins,
            p1: 0,
            p2: 0,
            data,
            le: 0,
        }
    }

    /// Serialize to wire bytes.
    ///
    /// Oversized data is rejected rather than truncated; a short APDU
    /// cannot carry more than 255 data bytes and dropping the excess would
    /// corrupt the message without the caller noticing.
    pub fn encode(&self) -> Result<Vec<u8>, ApduError> {
        if self.data.len() > u8::MAX as usize {
            return Err(ApduError::DataTooLong(self.data.len()));
        }
        let mut out = Vec::with_capacity(4 + 1 + self.data.len() + 1);
        out.push(self.cla);
        out.push(self.ins);
        out.push(self.p1);
        out.push(self.p2);
        if !self.data.is_empty() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(self.data);
        }
        if self.le != 0 {
            out.push(self.le);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_without_data_or_le() {
        let apdu = Apdu::command(0xB2, &[]);
        assert_eq!(apdu.encode().unwrap(), vec![0x00, 0xB2, 0x00, 0x00]);
    }

    #[test]
    fn data_gets_a_length_byte() {
        let apdu = Apdu::command(0x01, &[0xAA, 0xBB]);
        assert_eq!(
            apdu.encode().unwrap(),
            vec![0x00, 0x01, 0x00, 0x00, 0x02, 0xAA, 0xBB]
        );
    }

    #[test]
    fn nonzero_le_is_appended() {
        let apdu = Apdu {
            cla: 0,
            ins: 0xC0,
            p1: 0,
            p2: 0,
            data: &[],
            le: 0xFF,
        };
        assert_eq!(apdu.encode().unwrap(), vec![0x00, 0xC0, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn zero_le_is_omitted() {
        let apdu = Apdu {
            cla: 0,
            ins: 0xC0,
            p1: 0,
            p2: 0,
            data: &[0x01],
            le: 0,
        };
        assert_eq!(
            apdu.encode().unwrap(),
            vec![0x00, 0xC0, 0x00, 0x00, 0x01, 0x01]
        );
    }

    #[test]
    fn select_apdu_matches_reference_bytes() {
        let apdu = Apdu {
            cla: 0,
            ins: 0xA4,
            p1: 0x04,
            p2: 0x00,
            data: &[0xA0, 0x00, 0x00, 0x05, 0x27, 0x21, 0x01],
            le: 0,
        };
        assert_eq!(
            apdu.encode().unwrap(),
            vec![0x00, 0xA4, 0x04, 0x00, 0x07, 0xA0, 0x00, 0x00, 0x05, 0x27, 0x21, 0x01]
        );
    }

    #[test]
    fn oversized_data_is_rejected() {
        let big = vec![0u8; 300];
        let apdu = Apdu::command(0x01, &big);
        assert_eq!(apdu.encode(), Err(ApduError::DataTooLong(300)));
    }
}
