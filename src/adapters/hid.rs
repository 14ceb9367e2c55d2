//! HID feature-report transport for the legacy device family.
//!
//! Reports are exchanged as fixed 65-byte feature reports; the CRC framing
//! and retry policy live in [`crate::services::hid_session`]. Connection
//! attempts cycle through the known device identities a bounded number of
//! times, matching the behavior users expect when the key is plugged in a
//! moment after the tool starts.

use std::thread;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};

use crate::domain::constants::VidPid;
use crate::infra::error::{TokenError, TokenResult};

const CONNECTION_ATTEMPTS_COUNT: usize = 2;
const CONNECTION_ATTEMPT_DELAY: Duration = Duration::from_millis(500);

/// Raw feature-report primitive consumed by the HID session.
pub trait HidFeature {
    /// Issue a feature-report write; returns the number of bytes accepted.
    fn send_feature_report(&mut self, report: &[u8]) -> TokenResult<usize>;

    /// Issue a feature-report read into `buf`; returns the number of bytes
    /// delivered.
    fn get_feature_report(&mut self, buf: &mut [u8]) -> TokenResult<usize>;
}

/// Feature-report transport over an open hidapi handle.
pub struct HidapiTransport {
    device: HidDevice,
    device_name: &'static str,
}

impl HidapiTransport {
    /// Open the first present device from `candidates`, retrying the whole
    /// list a few times with a delay between rounds.
    pub fn open(candidates: &[VidPid]) -> TokenResult<Option<Self>> {
        let api = HidApi::new()
            .map_err(|e| TokenError::Comm(format!("failed to initialize hidapi: {e}")))?;

        for round in 0..CONNECTION_ATTEMPTS_COUNT {
            for id in candidates {
                match api.open(id.vid, id.pid) {
                    Ok(device) => {
                        log::debug!("found {}: VID={:04x} PID={:04x}", id.name, id.vid, id.pid);
                        return Ok(Some(Self {
                            device,
                            device_name: id.name,
                        }));
                    }
                    Err(_) => thread::sleep(CONNECTION_ATTEMPT_DELAY),
                }
            }
            if round == 0 {
                log::info!("trying to connect to device");
            }
        }

        Ok(None)
    }

    /// Marketing name of the connected device.
    #[must_use]
    pub fn device_name(&self) -> &'static str {
        self.device_name
    }
}

impl HidFeature for HidapiTransport {
    fn send_feature_report(&mut self, report: &[u8]) -> TokenResult<usize> {
        self.device
            .send_feature_report(report)
            .map_err(|e| TokenError::Comm(format!("feature report write failed: {e}")))?;
        Ok(report.len())
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> TokenResult<usize> {
        self.device
            .get_feature_report(buf)
            .map_err(|e| TokenError::Comm(format!("feature report read failed: {e}")))
    }
}
