//! Adapter layer modules for external system integration.
//!
//! Provides adapters for:
//! - USB bulk transfers to the CCID device family (`rusb`)
//! - HID feature reports to the legacy device family (`hidapi`)

pub mod hid;
pub mod usb;
