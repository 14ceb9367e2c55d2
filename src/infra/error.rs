//! Error types for token operations.
//! Error handling types and result definitions shared by both transports.

use thiserror::Error;

use crate::domain::apdu::ApduError;
use crate::domain::ccid::CcidError;
use crate::domain::constants::hid_status_name;
use crate::domain::tlv::TlvError;

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Error taxonomy for token operations.
///
/// Raw ISO7816 status words and firmware status bytes are translated into
/// these variants at the operations boundary; callers never see wire-level
/// codes.
#[derive(Error, Debug, miette::Diagnostic)]
pub enum TokenError {
    #[error("communication error: {0}")]
    Comm(String),

    #[error("connection to the device was lost")]
    ConnectionLost,

    #[error("wrong PIN")]
    WrongPin,

    #[error("touch was not recognized, or there was other problem with the authentication")]
    SecurityStatusNotSatisfied,

    #[error("device does not show PIN attempts counter")]
    NoPinAttemptsLeft,

    #[error("HOTP slot is not configured")]
    SlotNotConfigured,

    #[error("the device rejected the operation")]
    ValidationFailed,

    #[error("invalid counter value: {0}")]
    BadCounter(u64),

    #[error("too long PIN given")]
    TooLongPin,

    #[error("invalid base32 string: {0}")]
    BadBase32(String),

    #[error("invalid HOTP code given: {0}")]
    BadHotpCode(String),

    #[error("current device is not supported or known: {0}")]
    UnknownDevice(String),

    #[error("device reported: {}", hid_status_name(*.0))]
    DeviceCommand(u8),
}

impl From<CcidError> for TokenError {
    fn from(error: CcidError) -> Self {
        TokenError::Comm(error.to_string())
    }
}

impl From<ApduError> for TokenError {
    fn from(error: ApduError) -> Self {
        TokenError::Comm(error.to_string())
    }
}

impl From<TlvError> for TokenError {
    fn from(error: TlvError) -> Self {
        TokenError::Comm(error.to_string())
    }
}
