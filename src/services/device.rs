//! Connected-device handle: transport selection and verb dispatch.
//!
//! A device is connected once, used for a bounded sequence of operations
//! over whichever transport answered, and wiped on disconnect. The HID
//! family is probed first, then the CCID family; the transport choice is
//! fixed for the session lifetime.

use crate::adapters::hid::HidapiTransport;
use crate::adapters::usb::RusbBulkTransport;
use crate::domain::constants::{CCID_DEVICES, HID_DEVICES};
use crate::infra::error::{TokenError, TokenResult};
use crate::infra::touch::StderrTouchPrompt;
use crate::services::ccid_session::CcidSession;
use crate::services::hid_session::HidSession;
use crate::services::operations::{self, DeviceStatus, Verification};
use crate::types::{Base32Secret, Pin};

enum Connection {
    Hid(HidSession<HidapiTransport>),
    Ccid(CcidSession<RusbBulkTransport>),
}

/// A connected token.
pub struct Device {
    connection: Connection,
    name: &'static str,
}

impl Device {
    /// Connect to the first supported token, trying the HID family first
    /// and falling back to the CCID family.
    pub fn connect() -> TokenResult<Self> {
        if let Some(transport) = HidapiTransport::open(HID_DEVICES)? {
            let name = transport.device_name();
            log::info!("connected to {name} over HID");
            return Ok(Self {
                connection: Connection::Hid(HidSession::new(transport)),
                name,
            });
        }

        if let Some(transport) = RusbBulkTransport::open(CCID_DEVICES)? {
            let name = transport.device_name();
            log::info!("connected to {name} over CCID");
            let mut session = CcidSession::new(transport, Box::new(StderrTouchPrompt));
            // The select also primes the applet; a failure here is logged
            // and surfaces properly on the first real operation.
            if let Err(e) = session.select() {
                log::warn!("initial application select failed: {e}");
            }
            return Ok(Self {
                connection: Connection::Ccid(session),
                name,
            });
        }

        Err(TokenError::UnknownDevice(
            "no supported device found".to_string(),
        ))
    }

    /// Marketing name of the connected device.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the session runs over the CCID transport.
    #[must_use]
    pub fn is_ccid(&self) -> bool {
        matches!(self.connection, Connection::Ccid(_))
    }

    /// Verify the PIN.
    pub fn authenticate(&mut self, pin: &Pin) -> TokenResult<()> {
        match &mut self.connection {
            Connection::Ccid(session) => operations::authenticate_ccid(session, pin),
            Connection::Hid(session) => operations::authenticate_admin_hid(session, pin),
        }
    }

    /// Set the PIN on a device without one.
    pub fn set_pin(&mut self, pin: &Pin) -> TokenResult<()> {
        match &mut self.connection {
            Connection::Ccid(session) => operations::set_pin_ccid(session, pin),
            Connection::Hid(_) => Err(TokenError::UnknownDevice(
                "setting a PIN is only supported on the CCID family".to_string(),
            )),
        }
    }

    /// Change an already-set PIN.
    pub fn change_pin(&mut self, old_pin: &Pin, new_pin: &Pin) -> TokenResult<()> {
        match &mut self.connection {
            Connection::Ccid(session) => operations::change_pin_ccid(session, old_pin, new_pin),
            Connection::Hid(_) => Err(TokenError::UnknownDevice(
                "PIN change is only supported on the CCID family".to_string(),
            )),
        }
    }

    /// Provision the HOTP secret with the given initial counter.
    pub fn set_secret(
        &mut self,
        secret: &Base32Secret,
        pin: &Pin,
        counter: u64,
    ) -> TokenResult<()> {
        match &mut self.connection {
            Connection::Ccid(session) => operations::set_secret_ccid(session, secret, pin, counter),
            Connection::Hid(session) => operations::set_secret_hid(session, secret, pin, counter),
        }
    }

    /// Check a candidate HOTP code; the device advances its counter on a
    /// match.
    pub fn verify_code(&mut self, code: u32) -> TokenResult<Verification> {
        match &mut self.connection {
            Connection::Ccid(session) => operations::verify_code_ccid(session, code),
            Connection::Hid(session) => operations::verify_code_hid(session, code),
        }
    }

    /// Query the device status.
    pub fn status(&mut self) -> TokenResult<DeviceStatus> {
        match &mut self.connection {
            Connection::Ccid(session) => operations::status_ccid(session, true),
            Connection::Hid(session) => operations::status_hid(session),
        }
    }

    /// Regenerate the AES key on the legacy family. The CCID family keeps
    /// no AES-protected slots, so there is nothing to do there.
    pub fn regenerate_aes_key(&mut self, pin: &Pin) -> TokenResult<()> {
        match &mut self.connection {
            Connection::Ccid(_) => Ok(()),
            Connection::Hid(session) => operations::regenerate_aes_key_hid(session, pin),
        }
    }

    /// Wipe session state and close the connection.
    pub fn disconnect(mut self) {
        if let Connection::Hid(session) = &mut self.connection {
            session.clear();
        }
        // CCID scratch lives on the exchange stack; the claimed interface
        // is released when the transport drops.
    }
}
