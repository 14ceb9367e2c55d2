//! USB bulk transport for the CCID device family.
//!
//! Raw send/receive over the token's bulk endpoints; the CCID envelope and
//! exchange sequencing live in [`crate::services::ccid_session`]. The
//! token exposes a fixed endpoint pair and a single interface, so no
//! descriptor walking is needed.

use std::time::Duration;

use rusb::{Context, DeviceHandle, UsbContext};

use crate::domain::constants::VidPid;
use crate::infra::error::{TokenError, TokenResult};

/// Bulk OUT endpoint of the token.
const WRITE_ENDPOINT: u8 = 0x01;

/// Bulk IN endpoint of the token.
const READ_ENDPOINT: u8 = 0x81;

/// Timeout for a single bulk transfer.
const USB_TIMEOUT: Duration = Duration::from_millis(1000);

/// Raw USB bulk IN/OUT primitive consumed by the CCID session.
pub trait UsbBulk {
    /// Write all of `data` to the OUT endpoint.
    fn send(&mut self, data: &[u8]) -> TokenResult<()>;

    /// Read one transfer from the IN endpoint into `buf`; returns the
    /// number of bytes received.
    fn receive(&mut self, buf: &mut [u8]) -> TokenResult<usize>;
}

/// Bulk transport over a claimed libusb device handle.
pub struct RusbBulkTransport {
    handle: DeviceHandle<Context>,
    device_name: &'static str,
    interface_claimed: bool,
}

impl RusbBulkTransport {
    /// Open the first device matching one of `candidates`.
    ///
    /// Returns `Ok(None)` when no candidate is present; USB errors while
    /// opening a present device are reported to the caller.
    pub fn open(candidates: &[VidPid]) -> TokenResult<Option<Self>> {
        let context = Context::new()
            .map_err(|e| TokenError::Comm(format!("failed to create USB context: {e}")))?;

        let devices = context
            .devices()
            .map_err(|e| TokenError::Comm(format!("failed to enumerate USB devices: {e}")))?;

        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(_) => continue,
            };

            let Some(id) = candidates
                .iter()
                .find(|id| id.vid == desc.vendor_id() && id.pid == desc.product_id())
            else {
                continue;
            };

            log::debug!(
                "found {}: VID={:04x} PID={:04x}",
                id.name,
                desc.vendor_id(),
                desc.product_id()
            );

            let mut handle = device
                .open()
                .map_err(|e| TokenError::Comm(format!("failed to open USB device: {e}")))?;

            #[cfg(target_os = "linux")]
            {
                if handle.kernel_driver_active(0).unwrap_or(false) {
                    handle.detach_kernel_driver(0).map_err(|e| {
                        TokenError::Comm(format!("failed to detach kernel driver: {e}"))
                    })?;
                }
            }

            handle
                .claim_interface(0)
                .map_err(|e| TokenError::Comm(format!("failed to claim USB interface: {e}")))?;

            handle
                .set_alternate_setting(0, 0)
                .map_err(|e| TokenError::Comm(format!("failed to set alt setting: {e}")))?;

            return Ok(Some(Self {
                handle,
                device_name: id.name,
                interface_claimed: true,
            }));
        }

        Ok(None)
    }

    /// Marketing name of the connected device.
    #[must_use]
    pub fn device_name(&self) -> &'static str {
        self.device_name
    }
}

impl UsbBulk for RusbBulkTransport {
    fn send(&mut self, data: &[u8]) -> TokenResult<()> {
        log::trace!("CCID TX: {data:02x?}");
        let written = self
            .handle
            .write_bulk(WRITE_ENDPOINT, data, USB_TIMEOUT)
            .map_err(|e| TokenError::Comm(format!("USB write failed: {e}")))?;
        if written != data.len() {
            return Err(TokenError::Comm(format!(
                "incomplete USB write: {written}/{} bytes",
                data.len()
            )));
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> TokenResult<usize> {
        let read = self
            .handle
            .read_bulk(READ_ENDPOINT, buf, USB_TIMEOUT)
            .map_err(|e| TokenError::Comm(format!("USB read failed: {e}")))?;
        log::trace!("CCID RX: {:02x?}", &buf[..read]);
        Ok(read)
    }
}

impl Drop for RusbBulkTransport {
    fn drop(&mut self) {
        if self.interface_claimed {
            let _ = self.handle.release_interface(0);
        }
    }
}
