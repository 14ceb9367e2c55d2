//! CCID exchange state machine driven by scripted transports.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use hotp_verify::adapters::usb::UsbBulk;
use hotp_verify::domain::ccid::{self, XFR_BLOCK};
use hotp_verify::services::ccid_session::CcidSession;
use hotp_verify::{TokenError, TokenResult, TouchPrompt};

#[derive(Default)]
struct Wire {
    sent: Vec<Vec<u8>>,
    receives: usize,
}

struct ScriptedBulk {
    wire: Rc<RefCell<Wire>>,
    responses: VecDeque<Vec<u8>>,
    fail_receive: bool,
}

impl ScriptedBulk {
    fn new(responses: Vec<Vec<u8>>) -> (Self, Rc<RefCell<Wire>>) {
        let wire = Rc::new(RefCell::new(Wire::default()));
        (
            Self {
                wire: wire.clone(),
                responses: responses.into(),
                fail_receive: false,
            },
            wire,
        )
    }
}

impl UsbBulk for ScriptedBulk {
    fn send(&mut self, data: &[u8]) -> TokenResult<()> {
        self.wire.borrow_mut().sent.push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> TokenResult<usize> {
        self.wire.borrow_mut().receives += 1;
        if self.fail_receive {
            return Err(TokenError::Comm("USB read failed: timeout".to_string()));
        }
        let frame = self
            .responses
            .pop_front()
            .ok_or_else(|| TokenError::Comm("script exhausted".to_string()))?;
        buf.fill(0);
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }
}

#[derive(Default)]
struct Notices {
    requested: usize,
    ticks: usize,
    received: usize,
}

struct RecordingPrompt(Rc<RefCell<Notices>>);

impl TouchPrompt for RecordingPrompt {
    fn touch_requested(&mut self) {
        self.0.borrow_mut().requested += 1;
    }

    fn touch_tick(&mut self) {
        self.0.borrow_mut().ticks += 1;
    }

    fn touch_received(&mut self) {
        self.0.borrow_mut().received += 1;
    }
}

fn response_frame(status: u8, chain: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = ccid::compose(0x80, data, 0, 0, 0);
    frame[7] = status;
    frame[9] = chain;
    frame
}

fn request_frame() -> Vec<u8> {
    ccid::compose(XFR_BLOCK, &[0x00, 0xB2, 0x00, 0x00], 0, 1, 0)
}

#[test]
fn touch_wait_polls_and_notifies_exactly_once_each() {
    let touch = response_frame(0x80, 0, &[]);
    let done = response_frame(0x00, 0, &[0x90, 0x00]);
    let (transport, wire) = ScriptedBulk::new(vec![touch.clone(), touch, done]);

    let notices = Rc::new(RefCell::new(Notices::default()));
    let mut session = CcidSession::new(transport, Box::new(RecordingPrompt(notices.clone())));

    let response = session.process_single(&request_frame()).unwrap();
    assert_eq!(response.status_word, 0x9000);

    let wire = wire.borrow();
    assert_eq!(wire.receives, 3);
    assert_eq!(wire.sent.len(), 1, "touch wait must poll, never resend");

    let notices = notices.borrow();
    assert_eq!(notices.requested, 1);
    assert_eq!(notices.ticks, 1);
    assert_eq!(notices.received, 1);
}

#[test]
fn unexpected_chain_value_is_a_comm_error() {
    let (transport, wire) = ScriptedBulk::new(vec![response_frame(0, 5, &[0x90, 0x00])]);
    let notices = Rc::new(RefCell::new(Notices::default()));
    let mut session = CcidSession::new(transport, Box::new(RecordingPrompt(notices)));

    let err = session.process_single(&request_frame()).unwrap_err();
    assert!(matches!(err, TokenError::Comm(_)));
    assert_eq!(wire.borrow().receives, 1, "a bad chain value must not loop");
}

#[test]
fn receive_failure_is_fatal_without_retry() {
    let (mut transport, wire) = ScriptedBulk::new(vec![]);
    transport.fail_receive = true;
    let notices = Rc::new(RefCell::new(Notices::default()));
    let mut session = CcidSession::new(transport, Box::new(RecordingPrompt(notices)));

    let err = session.process_single(&request_frame()).unwrap_err();
    assert!(matches!(err, TokenError::Comm(_)));
    assert_eq!(wire.borrow().receives, 1);
}

#[test]
fn more_data_marker_fetches_the_remainder_within_the_same_exchange() {
    let more = response_frame(0, 0, &[0x61]);
    let rest = response_frame(0, 0, &[0xAB, 0xCD, 0x90, 0x00]);
    let (transport, wire) = ScriptedBulk::new(vec![more, rest]);
    let notices = Rc::new(RefCell::new(Notices::default()));
    let mut session = CcidSession::new(transport, Box::new(RecordingPrompt(notices)));

    let response = session.process_single(&request_frame()).unwrap();
    assert_eq!(response.data, vec![0xAB, 0xCD, 0x90, 0x00]);
    assert_eq!(response.status_word, 0x9000);

    let wire = wire.borrow();
    assert_eq!(wire.sent.len(), 2);
    // The follow-up carries a GetResponse APDU with Le = 0xFF.
    let followup_apdu = &wire.sent[1][10..];
    assert_eq!(followup_apdu, &[0x00, 0xC0, 0x00, 0x00, 0xFF]);
}

#[test]
fn malformed_frame_from_the_device_aborts_the_exchange() {
    // Declared payload length larger than the receive buffer.
    let mut lying = vec![0u8; 16];
    lying[0] = 0x80;
    lying[1..5].copy_from_slice(&u32::MAX.to_le_bytes());
    let (transport, _wire) = ScriptedBulk::new(vec![lying]);
    let notices = Rc::new(RefCell::new(Notices::default()));
    let mut session = CcidSession::new(transport, Box::new(RecordingPrompt(notices)));

    let err = session.process_single(&request_frame()).unwrap_err();
    assert!(matches!(err, TokenError::Comm(_)));
}
