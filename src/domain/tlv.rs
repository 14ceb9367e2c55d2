//! Tag-length-value records carried inside secrets-app APDUs.
//!
//! Three encodings exist on the wire: plain bytes (tag, length, value),
//! a 4-byte big-endian integer (tag, length 4, value), and a raw splice
//! that copies pre-built bytes without a tag/length header. Entry order is
//! significant and preserved. Raw splices are invisible to [`decode_one`]:
//! only entries written with a header can be located by tag.

use thiserror::Error;

/// A TLV entry to encode.
#[derive(Debug, Clone)]
pub enum Entry<'a> {
    /// String or byte value with a tag/length header.
    Bytes { tag: u8, value: &'a [u8] },
    /// 4-byte big-endian integer with a tag/length header.
    IntBe { tag: u8, value: u32 },
    /// Pre-built bytes copied verbatim, no header.
    Raw(&'a [u8]),
}

/// A decoded TLV entry borrowing from the response buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TlvError {
    #[error("no entry with tag {0:#04x}")]
    NotFound(u8),
    #[error("entry with tag {tag:#04x} declares {declared} value bytes, {available} available")]
    Truncated {
        tag: u8,
        declared: usize,
        available: usize,
    },
    #[error("value of {length} bytes does not fit a single-byte length field")]
    ValueTooLong { length: usize },
}

/// Encode `entries` in order into a freshly allocated buffer.
///
/// Values longer than 255 bytes cannot be represented in the single-byte
/// length field and are rejected rather than truncated.
pub fn encode(entries: &[Entry<'_>]) -> Result<Vec<u8>, TlvError> {
    let mut out = Vec::new();
    for entry in entries {
        match entry {
            Entry::Bytes { tag, value } => {
                if value.len() > u8::MAX as usize {
                    return Err(TlvError::ValueTooLong { length: value.len() });
                }
                out.push(*tag);
                out.push(value.len() as u8);
                out.extend_from_slice(value);
            }
            Entry::IntBe { tag, value } => {
                out.push(*tag);
                out.push(4);
                out.extend_from_slice(&value.to_be_bytes());
            }
            Entry::Raw(bytes) => out.extend_from_slice(bytes),
        }
    }
    Ok(out)
}

/// Locate the first entry with `tag` by a single linear pass over `buf`.
///
/// A declared length running past the end of the buffer is a hard error,
/// never an out-of-bounds read.
pub fn decode_one(buf: &[u8], tag: u8) -> Result<Tlv<'_>, TlvError> {
    let mut i = 0usize;
    while i < buf.len() {
        if buf[i] == tag {
            let Some(&length) = buf.get(i + 1) else {
                return Err(TlvError::Truncated {
                    tag,
                    declared: 0,
                    available: 0,
                });
            };
            let start = i + 2;
            let end = start + length as usize;
            if end > buf.len() {
                return Err(TlvError::Truncated {
                    tag,
                    declared: length as usize,
                    available: buf.len() - start.min(buf.len()),
                });
            }
            return Ok(Tlv {
                tag,
                value: &buf[start..end],
            });
        }
        // Skip tag, length and value of a non-matching entry.
        let length = buf.get(i + 1).copied().unwrap_or(0) as usize;
        i += 2 + length;
    }
    Err(TlvError::NotFound(tag))
}
