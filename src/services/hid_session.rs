//! Feature-report exchange for the legacy HID device family.
//!
//! Every query is a sealed 65-byte report; the device answers with a
//! report that echoes the query checksum. A response is accepted only
//! when its own checksum verifies, the echo matches the query just sent
//! and the device is not busy; otherwise the read is retried a bounded
//! number of times. Session state also holds the per-session temporary
//! passwords the firmware hands out on authentication; everything is
//! wiped on disconnect.

use std::thread;
use std::time::Duration;

use rand::RngCore;
use zeroize::Zeroize;

use crate::adapters::hid::HidFeature;
use crate::domain::hid_report::{QueryReport, ResponseReport, HID_REPORT_SIZE, QUERY_PAYLOAD_SIZE};
use crate::infra::error::{TokenError, TokenResult};

/// Number of read attempts before the connection counts as lost.
const RECEIVE_ATTEMPTS: usize = 10;

/// Length of the firmware's temporary passwords.
pub const TEMPORARY_PASSWORD_LENGTH: usize = 25;

/// One HID connection with its scratch reports and session passwords.
pub struct HidSession<T> {
    transport: T,
    query: QueryReport,
    response: ResponseReport,
    admin_temporary_password: [u8; TEMPORARY_PASSWORD_LENGTH],
    user_temporary_password: [u8; TEMPORARY_PASSWORD_LENGTH],
    receive_delay: Duration,
}

impl<T: HidFeature> HidSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            query: QueryReport::new(),
            response: ResponseReport::new(),
            admin_temporary_password: [0; TEMPORARY_PASSWORD_LENGTH],
            user_temporary_password: [0; TEMPORARY_PASSWORD_LENGTH],
            receive_delay: Duration::from_millis(100),
        }
    }

    /// Override the inter-poll delay; tests use a zero delay.
    pub fn set_receive_delay(&mut self, delay: Duration) {
        self.receive_delay = delay;
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Generate a fresh admin temporary password for this session and
    /// return a copy for the authenticate payload.
    pub fn fresh_admin_password(&mut self) -> [u8; TEMPORARY_PASSWORD_LENGTH] {
        rand::thread_rng().fill_bytes(&mut self.admin_temporary_password);
        self.admin_temporary_password
    }

    /// Temporary admin password scoping slot writes after authentication.
    #[must_use]
    pub fn admin_password(&self) -> &[u8; TEMPORARY_PASSWORD_LENGTH] {
        &self.admin_temporary_password
    }

    /// Generate a fresh user temporary password for this session and
    /// return a copy for the authenticate payload.
    pub fn fresh_user_password(&mut self) -> [u8; TEMPORARY_PASSWORD_LENGTH] {
        rand::thread_rng().fill_bytes(&mut self.user_temporary_password);
        self.user_temporary_password
    }

    /// Zero the scratch reports and session passwords.
    pub fn clear(&mut self) {
        self.query.clear();
        self.response.clear();
        self.admin_temporary_password.zeroize();
        self.user_temporary_password.zeroize();
    }

    /// Seal and send one query report.
    pub fn send(&mut self, payload: &[u8], command_id: u8) -> TokenResult<()> {
        self.query.clear();
        self.response.clear();

        self.query.set_command_id(command_id);
        if !payload.is_empty() {
            let copy_len = payload.len().min(QUERY_PAYLOAD_SIZE);
            self.query.payload_mut()[..copy_len].copy_from_slice(&payload[..copy_len]);
            if payload.len() > QUERY_PAYLOAD_SIZE {
                log::warn!(
                    "input data of {} bytes bigger than report payload, truncated",
                    payload.len()
                );
            }
        }
        self.query.seal();

        let written = self.transport.send_feature_report(self.query.as_bytes())?;
        if written != HID_REPORT_SIZE {
            log::warn!("could not send the data to the device");
            return Err(TokenError::ConnectionLost);
        }
        Ok(())
    }

    /// Poll for the response to the query just sent.
    ///
    /// When `out` is given, up to `out.len()` payload bytes are copied
    /// into it; a caller buffer smaller than the report payload is allowed
    /// and only warned about.
    pub fn receive(&mut self, out: Option<&mut [u8]>) -> TokenResult<()> {
        let mut accepted = false;
        for _ in 0..RECEIVE_ATTEMPTS {
            thread::sleep(self.receive_delay);

            let read = match self.transport.get_feature_report(self.response.as_bytes_mut()) {
                Ok(read) => read,
                Err(e) => {
                    log::debug!("feature report read attempt failed: {e}");
                    continue;
                }
            };
            if read != HID_REPORT_SIZE {
                continue;
            }

            let valid_response_crc = self.response.crc_valid();
            let valid_query_crc = self.response.last_command_crc() == self.query.crc();
            if valid_response_crc && valid_query_crc && self.response.device_status() == 0 {
                accepted = true;
                break;
            }
        }
        if !accepted {
            log::warn!("could not receive the data from the device");
            return Err(TokenError::ConnectionLost);
        }

        if let Some(out) = out {
            let payload = self.response.payload();
            let copy_len = out.len().min(payload.len());
            out[..copy_len].copy_from_slice(&payload[..copy_len]);
            if out.len() < payload.len() {
                log::warn!("incoming data bigger than provided output buffer");
            }
        }
        Ok(())
    }

    /// Outcome byte of the last accepted exchange.
    #[must_use]
    pub fn last_command_status(&self) -> u8 {
        self.response.last_command_status()
    }

    /// Payload of the last accepted response.
    #[must_use]
    pub fn response_payload(&self) -> &[u8] {
        self.response.payload()
    }

    /// Send `payload` under `command_id` and wait for the matching
    /// response.
    pub fn exchange(&mut self, payload: &[u8], command_id: u8) -> TokenResult<()> {
        self.send(payload, command_id)?;
        self.receive(None)
    }
}

impl<T> Drop for HidSession<T> {
    fn drop(&mut self) {
        self.query.clear();
        self.response.clear();
        self.admin_temporary_password.zeroize();
        self.user_temporary_password.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crc32::stm_crc32;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        sent: Vec<Vec<u8>>,
        reads: usize,
    }

    /// Scripted feature-report device.
    struct Scripted {
        wire: Rc<RefCell<Wire>>,
        responses: VecDeque<[u8; HID_REPORT_SIZE]>,
    }

    impl Scripted {
        fn new(responses: Vec<[u8; HID_REPORT_SIZE]>) -> (Self, Rc<RefCell<Wire>>) {
            let wire = Rc::new(RefCell::new(Wire::default()));
            (
                Self {
                    wire: wire.clone(),
                    responses: responses.into(),
                },
                wire,
            )
        }
    }

    impl HidFeature for Scripted {
        fn send_feature_report(&mut self, report: &[u8]) -> TokenResult<usize> {
            self.wire.borrow_mut().sent.push(report.to_vec());
            Ok(report.len())
        }

        fn get_feature_report(&mut self, buf: &mut [u8]) -> TokenResult<usize> {
            self.wire.borrow_mut().reads += 1;
            match self.responses.pop_front() {
                Some(report) => {
                    buf[..HID_REPORT_SIZE].copy_from_slice(&report);
                    Ok(HID_REPORT_SIZE)
                }
                None => Ok(0),
            }
        }
    }

    /// Forge a device response echoing `query_crc`.
    fn forge_response(query_crc: u32, command_status: u8, payload0: u8) -> [u8; HID_REPORT_SIZE] {
        let mut report = [0u8; HID_REPORT_SIZE];
        report[3..7].copy_from_slice(&query_crc.to_le_bytes());
        report[7] = command_status;
        report[8] = payload0;
        let crc = stm_crc32(&report[1..61]);
        report[61..65].copy_from_slice(&crc.to_le_bytes());
        report
    }

    fn query_crc_for(command_id: u8) -> u32 {
        let mut query = QueryReport::new();
        query.set_command_id(command_id);
        query.seal()
    }

    #[test]
    fn accepts_a_matching_response() {
        let crc = query_crc_for(0x00);
        let (device, _wire) = Scripted::new(vec![forge_response(crc, 0, 0x2A)]);
        let mut session = HidSession::new(device);
        session.set_receive_delay(Duration::ZERO);

        session.send(&[], 0x00).unwrap();
        let mut out = [0u8; 1];
        session.receive(Some(&mut out)).unwrap();
        assert_eq!(out[0], 0x2A);
        assert_eq!(session.last_command_status(), 0);
    }

    #[test]
    fn mismatched_query_crc_is_retried_then_lost() {
        let wrong = forge_response(0xDEAD_BEEF, 0, 0);
        let (device, wire) = Scripted::new(vec![wrong; RECEIVE_ATTEMPTS]);
        let mut session = HidSession::new(device);
        session.set_receive_delay(Duration::ZERO);

        session.send(&[], 0x00).unwrap();
        let err = session.receive(None).unwrap_err();
        assert!(matches!(err, TokenError::ConnectionLost));
        assert_eq!(wire.borrow().reads, RECEIVE_ATTEMPTS);
    }

    #[test]
    fn corrupted_response_crc_is_rejected() {
        let crc = query_crc_for(0x00);
        let mut bad = forge_response(crc, 0, 0);
        bad[8] ^= 0xFF; // payload no longer matches the trailer
        let good = forge_response(crc, 0, 0x01);
        let (device, wire) = Scripted::new(vec![bad, good]);
        let mut session = HidSession::new(device);
        session.set_receive_delay(Duration::ZERO);

        session.send(&[], 0x00).unwrap();
        session.receive(None).unwrap();
        assert_eq!(session.response_payload()[0], 0x01);
        assert_eq!(wire.borrow().reads, 2);
    }

    #[test]
    fn busy_device_status_is_retried() {
        let crc = query_crc_for(0x00);
        let mut busy = [0u8; HID_REPORT_SIZE];
        busy[1] = 1; // device busy
        busy[3..7].copy_from_slice(&crc.to_le_bytes());
        let busy_crc = stm_crc32(&busy[1..61]);
        busy[61..65].copy_from_slice(&busy_crc.to_le_bytes());

        let (device, wire) = Scripted::new(vec![busy, forge_response(crc, 0, 0)]);
        let mut session = HidSession::new(device);
        session.set_receive_delay(Duration::ZERO);

        session.send(&[], 0x00).unwrap();
        session.receive(None).unwrap();
        assert_eq!(wire.borrow().reads, 2);
    }

    #[test]
    fn payload_is_placed_behind_command_id() {
        let crc_probe = {
            let mut query = QueryReport::new();
            query.set_command_id(0x18);
            query.payload_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
            query.seal()
        };
        let (device, wire) = Scripted::new(vec![forge_response(crc_probe, 0, 0)]);
        let mut session = HidSession::new(device);
        session.set_receive_delay(Duration::ZERO);

        session.send(&[1, 2, 3, 4], 0x18).unwrap();
        session.receive(None).unwrap();

        let wire = wire.borrow();
        let sent = &wire.sent[0];
        assert_eq!(sent[1], 0x18);
        assert_eq!(&sent[2..6], &[1, 2, 3, 4]);
    }

    #[test]
    fn clear_wipes_session_passwords() {
        let (device, _wire) = Scripted::new(vec![]);
        let mut session = HidSession::new(device);
        let password = session.fresh_admin_password();
        assert_eq!(&password, session.admin_password());
        session.clear();
        assert_eq!(session.admin_password(), &[0; TEMPORARY_PASSWORD_LENGTH]);
    }
}
