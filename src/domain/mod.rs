//! Pure protocol layer: framing, codecs and constants.
//!
//! Nothing in this module performs I/O; everything operates on byte
//! buffers and is exercised directly by unit tests.

pub mod apdu;
pub mod ccid;
pub mod constants;
pub mod crc32;
pub mod hid_report;
pub mod tlv;
