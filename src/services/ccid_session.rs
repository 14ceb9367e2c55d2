//! Chained-exchange state machine for the CCID transport.
//!
//! A logical request is one envelope sent, followed by a receive loop that
//! has to cope with three token-side conditions before a final result is
//! available: a "more data available" ISO7816 reply that must be fetched
//! with a GetResponse follow-up, a touch-wait status that is polled (never
//! resent) until the user confirms, and CCID-level chaining where the
//! token pushes further frames on its own. Only one request is in flight
//! per session.

use crate::adapters::usb::UsbBulk;
use crate::domain::apdu::Apdu;
use crate::domain::ccid::{self, IccResponse, XFR_BLOCK};
use crate::domain::constants::{
    ins, status_word_name, AID_SECRETS, AWAITING_TOUCH_STATUS, MAX_CCID_BUFFER_SIZE,
    MORE_DATA_STATUS_BYTE,
};
use crate::domain::tlv::{self, Entry};
use crate::infra::error::{TokenError, TokenResult};
use crate::infra::touch::TouchPrompt;

/// Upper bound on receive polls within one exchange. A token stuck in the
/// touch-wait or chaining state surfaces as a bounded error instead of an
/// infinite loop.
const MAX_EXCHANGE_POLLS: usize = 300;

/// One CCID connection with its exchange sequencing state.
pub struct CcidSession<T> {
    transport: T,
    sequence: u8,
    prompt: Box<dyn TouchPrompt>,
}

impl<T: UsbBulk> CcidSession<T> {
    pub fn new(transport: T, prompt: Box<dyn TouchPrompt>) -> Self {
        Self {
            transport,
            sequence: 0,
            prompt,
        }
    }

    /// Next envelope sequence number. Monotonic for the session lifetime.
    fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Select the secrets application. Issued once after connecting; the
    /// response carries the status TLVs.
    pub fn select(&mut self) -> TokenResult<IccResponse> {
        let apdu = Apdu {
            cla: 0,
            ins: ins::SELECT,
            p1: 0x04,
            p2: 0x00,
            data: AID_SECRETS,
            le: 0,
        };
        self.transceive_apdu(&apdu)
    }

    /// Send `apdu` wrapped in a fresh envelope and run the receive loop.
    pub fn transceive_apdu(&mut self, apdu: &Apdu<'_>) -> TokenResult<IccResponse> {
        let apdu_bytes = apdu.encode()?;
        self.transceive_raw_apdu(&apdu_bytes, None)
    }

    /// Encode `entries` as a TLV payload, wrap it in a command APDU for
    /// `instruction` and exchange it.
    pub fn transceive_tlvs(
        &mut self,
        instruction: u8,
        entries: &[Entry<'_>],
    ) -> TokenResult<IccResponse> {
        let payload = tlv::encode(entries)?;
        let apdu_bytes = Apdu::command(instruction, &payload).encode()?;
        self.transceive_raw_apdu(&apdu_bytes, None)
    }

    /// Exchange pre-encoded APDU bytes. `seq` overrides the session's
    /// sequence counter for this one envelope.
    pub fn transceive_raw_apdu(
        &mut self,
        apdu_bytes: &[u8],
        seq: Option<u8>,
    ) -> TokenResult<IccResponse> {
        let seq = seq.unwrap_or_else(|| self.next_sequence());
        let frame = ccid::compose(XFR_BLOCK, apdu_bytes, 0, seq, 0);
        self.process_single(&frame)
    }

    /// Run several exchanges in order. With `continue_on_errors` a failed
    /// exchange is logged and the next one still runs; the last successful
    /// result is returned.
    pub fn process_many(
        &mut self,
        frames: &[Vec<u8>],
        continue_on_errors: bool,
    ) -> TokenResult<Option<IccResponse>> {
        let mut last = None;
        for frame in frames {
            match self.process_single(frame) {
                Ok(response) => last = Some(response),
                Err(e) if continue_on_errors => {
                    log::warn!("exchange failed, continuing: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(last)
    }

    /// One complete request/response exchange.
    pub fn process_single(&mut self, frame: &[u8]) -> TokenResult<IccResponse> {
        self.transport.send(frame)?;

        let mut buf = vec![0u8; MAX_CCID_BUFFER_SIZE];
        let mut touch_pending = false;

        for _ in 0..MAX_EXCHANGE_POLLS {
            self.transport.receive(&mut buf)?;
            let mut response = ccid::parse(&buf)?;
            log_response(&response);

            if response.first_data_byte() == Some(MORE_DATA_STATUS_BYTE) {
                // Fetch the remainder and keep inspecting the refreshed
                // result; this does not finish the exchange by itself.
                response = self.fetch_remainder(&mut buf)?;
                log_response(&response);
            }

            if response.status == AWAITING_TOUCH_STATUS {
                if touch_pending {
                    self.prompt.touch_tick();
                } else {
                    self.prompt.touch_requested();
                    touch_pending = true;
                }
                continue;
            }
            if touch_pending {
                self.prompt.touch_received();
                touch_pending = false;
            }

            match response.chain {
                0 | 2 => return Ok(response),
                // The token pushes the next frame on its own; receive
                // again without resending.
                1 | 3 => continue,
                other => {
                    return Err(TokenError::Comm(format!(
                        "invalid value for chain: {other}"
                    )))
                }
            }
        }

        Err(TokenError::Comm(format!(
            "exchange did not complete within {MAX_EXCHANGE_POLLS} polls"
        )))
    }

    /// Issue a GetResponse follow-up and return its parsed result.
    fn fetch_remainder(&mut self, buf: &mut [u8]) -> TokenResult<IccResponse> {
        let apdu = Apdu {
            cla: 0,
            ins: ins::GET_RESPONSE,
            p1: 0,
            p2: 0,
            data: &[],
            le: 0xFF,
        };
        let apdu_bytes = apdu.encode()?;
        let seq = self.next_sequence();
        let frame = ccid::compose(XFR_BLOCK, &apdu_bytes, 0, seq, 0);
        self.transport.send(&frame)?;
        buf.fill(0);
        self.transport.receive(buf)?;
        Ok(ccid::parse(buf)?)
    }
}

fn log_response(response: &IccResponse) {
    log::debug!("status {}, chain {}", response.status, response.chain);
    if !response.data.is_empty() {
        log::debug!(
            "    returned {} bytes, status code: {}",
            response.data.len(),
            status_word_name(response.status_word)
        );
    }
}
