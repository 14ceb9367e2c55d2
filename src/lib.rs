//! HOTP Verification Library
//!
//! Provisions and verifies counter-based one-time passcodes on Nitrokey
//! USB security tokens. Two mutually exclusive transports are supported:
//! the legacy HID feature-report protocol with CRC-guarded framing and
//! the CCID/ISO7816 protocol carrying TLV-encoded application data. The
//! HOTP computation itself happens on the token; this library frames the
//! requests and interprets the results.

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;
pub mod types;

pub use infra::error::{TokenError, TokenResult};
pub use infra::touch::{SilentTouchPrompt, StderrTouchPrompt, TouchPrompt};
pub use services::device::Device;
pub use services::operations::{DeviceStatus, Nk3Status, Verification};
pub use types::{Base32Secret, HotpCode, Pin};
