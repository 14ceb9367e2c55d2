//! Type-safe wrappers using new-type pattern
//!
//! Inputs coming from the command line are validated once, on
//! construction, so the protocol layers below only ever see well-formed
//! values.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;

use crate::domain::constants::MAX_PIN_SIZE_CCID;
use crate::infra::error::{TokenError, TokenResult};

/// Type-safe wrapper for the device PIN.
///
/// An empty PIN is legal: the CCID family allows provisioning a slot
/// without PIN protection.
#[derive(Clone)]
pub struct Pin(String);

impl Pin {
    /// Create a new Pin after validation
    pub fn new(pin: impl AsRef<str>) -> TokenResult<Self> {
        let pin = pin.as_ref();
        if pin.len() > MAX_PIN_SIZE_CCID {
            return Err(TokenError::TooLongPin);
        }
        Ok(Pin(pin.to_string()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromStr for Pin {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// Don't leak the PIN through Debug/Display output or logs.
impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PIN REDACTED]")
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PIN REDACTED]")
    }
}

/// Type-safe wrapper for a base32-encoded HOTP secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base32Secret(String);

impl Base32Secret {
    /// Create a new Base32Secret after validation
    pub fn new(secret: impl AsRef<str>) -> TokenResult<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::BadBase32("empty string".to_string()));
        }
        for c in secret.chars() {
            let in_valid_range =
                c.is_ascii_uppercase() || ('2'..='7').contains(&c) || c == '=';
            if !in_valid_range {
                return Err(TokenError::BadBase32(format!(
                    "character {c:?} is outside the base32 alphabet"
                )));
            }
        }
        Ok(Base32Secret(secret.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw key bytes, rejecting secrets longer than
    /// `max_bytes` (the capacity of the target slot).
    pub fn decode(&self, max_bytes: usize) -> TokenResult<Vec<u8>> {
        let trimmed = self.0.trim_end_matches('=');
        let raw = BASE32_NOPAD
            .decode(trimmed.as_bytes())
            .map_err(|e| TokenError::BadBase32(e.to_string()))?;
        if raw.len() > max_bytes {
            return Err(TokenError::BadBase32(format!(
                "decoded secret of {} bytes exceeds the {max_bytes}-byte slot capacity",
                raw.len()
            )));
        }
        Ok(raw)
    }
}

impl FromStr for Base32Secret {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Type-safe wrapper for a candidate HOTP code.
///
/// Codes are 6 or 8 decimal digits; anything else is rejected before any
/// device traffic happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotpCode(u32);

const HOTP_MAX_INT: u64 = 10000 * 10000;

impl HotpCode {
    /// Create a new HotpCode after validation
    pub fn new(code: impl AsRef<str>) -> TokenResult<Self> {
        let code = code.as_ref();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(TokenError::BadHotpCode(format!(
                "{code:?} is not a decimal number"
            )));
        }
        let value: u64 = code
            .parse()
            .map_err(|_| TokenError::BadHotpCode(format!("{code:?} is out of range")))?;
        if value >= HOTP_MAX_INT {
            return Err(TokenError::BadHotpCode(format!(
                "{code:?} exceeds 8 digits"
            )));
        }
        Ok(HotpCode(value as u32))
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl FromStr for HotpCode {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for HotpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
