//! Legacy HID command flows against a reactive feature-report mock.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use hotp_verify::adapters::hid::HidFeature;
use hotp_verify::domain::constants::{hid_command, hid_status};
use hotp_verify::domain::crc32::stm_crc32;
use hotp_verify::domain::hid_report::HID_REPORT_SIZE;
use hotp_verify::services::hid_session::{HidSession, TEMPORARY_PASSWORD_LENGTH};
use hotp_verify::services::operations::{
    authenticate_admin_hid, set_secret_hid, status_hid, verify_code_hid, Verification,
};
use hotp_verify::{Base32Secret, Pin, TokenError, TokenResult};

#[derive(Default)]
struct DeviceState {
    sent: Vec<Vec<u8>>,
    last_query_crc: u32,
    last_command_id: u8,
    /// Status byte to report for a command id.
    fail_command: Option<(u8, u8)>,
    /// Payload to return for a command id.
    payloads: Vec<(u8, Vec<u8>)>,
}

/// Mock that answers each query with a well-formed response echoing the
/// query checksum, the way the firmware does.
struct MockHid(Rc<RefCell<DeviceState>>);

impl MockHid {
    fn new() -> (Self, Rc<RefCell<DeviceState>>) {
        let state = Rc::new(RefCell::new(DeviceState::default()));
        (Self(state.clone()), state)
    }
}

impl HidFeature for MockHid {
    fn send_feature_report(&mut self, report: &[u8]) -> TokenResult<usize> {
        let mut state = self.0.borrow_mut();
        state.last_command_id = report[1];
        state.last_query_crc = u32::from_le_bytes([report[61], report[62], report[63], report[64]]);
        state.sent.push(report.to_vec());
        Ok(report.len())
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> TokenResult<usize> {
        let state = self.0.borrow();
        let mut report = [0u8; HID_REPORT_SIZE];
        report[2] = state.last_command_id;
        report[3..7].copy_from_slice(&state.last_query_crc.to_le_bytes());
        report[7] = match state.fail_command {
            Some((id, status)) if id == state.last_command_id => status,
            _ => hid_status::OK,
        };
        if let Some((_, payload)) = state
            .payloads
            .iter()
            .find(|(id, _)| *id == state.last_command_id)
        {
            report[8..8 + payload.len()].copy_from_slice(payload);
        }
        let crc = stm_crc32(&report[1..61]);
        report[61..65].copy_from_slice(&crc.to_le_bytes());
        buf[..HID_REPORT_SIZE].copy_from_slice(&report);
        Ok(HID_REPORT_SIZE)
    }
}

fn session_with(state_mods: impl FnOnce(&mut DeviceState)) -> (HidSession<MockHid>, Rc<RefCell<DeviceState>>) {
    let (mock, state) = MockHid::new();
    state_mods(&mut state.borrow_mut());
    let mut session = HidSession::new(mock);
    session.set_receive_delay(Duration::ZERO);
    (session, state)
}

#[test]
fn provisioning_issues_the_three_write_sequence() {
    let (mut session, state) = session_with(|_| {});
    let secret = Base32Secret::new("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap();
    let pin = Pin::new("12345678").unwrap();

    set_secret_hid(&mut session, &secret, &pin, 42).unwrap();

    let state = state.borrow();
    let ids: Vec<u8> = state.sent.iter().map(|report| report[1]).collect();
    assert_eq!(
        ids,
        vec![
            hid_command::FIRST_AUTHENTICATE,
            hid_command::SEND_OTP_DATA,
            hid_command::SEND_OTP_DATA,
            hid_command::WRITE_TO_SLOT,
        ]
    );

    // The temporary password offered during authentication must scope all
    // three writes.
    let auth = &state.sent[0];
    let temp_password = &auth[2 + TEMPORARY_PASSWORD_LENGTH..2 + 2 * TEMPORARY_PASSWORD_LENGTH];
    for report in &state.sent[1..] {
        assert_eq!(&report[2..2 + TEMPORARY_PASSWORD_LENGTH], temp_password);
    }

    // Secret chunk carries the decoded key bytes.
    let secret_write = &state.sent[1];
    assert_eq!(secret_write[2 + TEMPORARY_PASSWORD_LENGTH], b'S');
    assert_eq!(
        &secret_write[2 + TEMPORARY_PASSWORD_LENGTH + 2..2 + TEMPORARY_PASSWORD_LENGTH + 22],
        b"12345678901234567890"
    );

    // Name chunk.
    let name_write = &state.sent[2];
    assert_eq!(name_write[2 + TEMPORARY_PASSWORD_LENGTH], b'N');
    assert!(name_write[2 + TEMPORARY_PASSWORD_LENGTH + 2..].starts_with(b"Validation"));

    // Slot write: internal slot number and the counter in little-endian.
    let slot_write = &state.sent[3];
    assert_eq!(slot_write[2 + TEMPORARY_PASSWORD_LENGTH], 0x13);
    assert_eq!(
        &slot_write[2 + TEMPORARY_PASSWORD_LENGTH + 1..2 + TEMPORARY_PASSWORD_LENGTH + 9],
        &42u64.to_le_bytes()
    );
}

#[test]
fn wrong_admin_pin_stops_the_provisioning() {
    let (mut session, state) = session_with(|state| {
        state.fail_command = Some((hid_command::FIRST_AUTHENTICATE, hid_status::WRONG_PASSWORD));
    });
    let secret = Base32Secret::new("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap();
    let pin = Pin::new("wrong").unwrap();

    let err = set_secret_hid(&mut session, &secret, &pin, 0).unwrap_err();
    assert!(matches!(err, TokenError::WrongPin));
    // Nothing past the failed authentication goes out.
    assert_eq!(state.borrow().sent.len(), 1);
}

#[test]
fn code_verdict_comes_from_the_first_payload_byte() {
    let (mut session, _state) = session_with(|state| {
        state
            .payloads
            .push((hid_command::VERIFY_OTP_CODE, vec![1]));
    });
    assert_eq!(
        verify_code_hid(&mut session, 755_224).unwrap(),
        Verification::Passed
    );

    let (mut session, state) = session_with(|state| {
        state
            .payloads
            .push((hid_command::VERIFY_OTP_CODE, vec![0]));
    });
    assert_eq!(
        verify_code_hid(&mut session, 755_224).unwrap(),
        Verification::Failed
    );
    // The candidate code goes over the wire little-endian.
    let state = state.borrow();
    assert_eq!(&state.sent[0][2..6], &755_224u32.to_le_bytes());
}

#[test]
fn unprogrammed_slot_is_reported_as_such() {
    let (mut session, _state) = session_with(|state| {
        state.fail_command = Some((
            hid_command::VERIFY_OTP_CODE,
            hid_status::SLOT_NOT_PROGRAMMED,
        ));
    });
    assert!(matches!(
        verify_code_hid(&mut session, 755_224),
        Err(TokenError::SlotNotConfigured)
    ));
}

#[test]
fn status_assembles_version_serial_and_counters() {
    let (mut session, _state) = session_with(|state| {
        state
            .payloads
            .push((hid_command::GET_PASSWORD_RETRY_COUNT, vec![3]));
        state
            .payloads
            .push((hid_command::GET_USER_PASSWORD_RETRY_COUNT, vec![2]));
        // minor, major, serial u32 LE, general config
        let mut status_payload = vec![8u8, 0];
        status_payload.extend_from_slice(&0x00BC_614Eu32.to_le_bytes());
        status_payload.extend_from_slice(&[0, 1, 0, 1, 0]);
        state.payloads.push((hid_command::GET_STATUS, status_payload));
    });

    let status = status_hid(&mut session).unwrap();
    assert_eq!(status.firmware_version, (0, 8));
    assert_eq!(status.card_serial, 0x00BC_614E);
    assert_eq!(status.retry_admin, Some(3));
    assert_eq!(status.retry_user, Some(2));
    assert_eq!(status.general_config, [0, 1, 0, 1, 0]);
    assert!(status.nk3.is_none());
}

#[test]
fn pin_longer_than_the_password_field_is_rejected_before_io() {
    let (mut session, state) = session_with(|_| {});
    let pin = Pin::new("123456789012345678901234567890").unwrap();
    let err = authenticate_admin_hid(&mut session, &pin).unwrap_err();
    assert!(matches!(err, TokenError::TooLongPin));
    assert!(state.borrow().sent.is_empty());
}
