//! Session-level verbs over either transport.
//!
//! Everything here translates token status codes into the crate error
//! taxonomy exactly once; callers never see raw ISO7816 status words or
//! firmware status bytes. The CCID functions speak TLV-in-APDU to the
//! secrets application, the HID functions speak the legacy packed-struct
//! commands.

use crate::adapters::hid::HidFeature;
use crate::adapters::usb::UsbBulk;
use crate::domain::apdu::Apdu;
use crate::domain::ccid::IccResponse;
use crate::domain::constants::{
    algo, hid_command, hid_status, ins, kind, status_word_name, sw, Tag, AID_ADMIN, AID_OPENPGP,
    CCID_SECRET_SIZE_BYTES, HID_HOTP_SLOT_NUMBER, HID_SECRET_SIZE_BYTES, HID_SLOT_NAME,
    HOTP_CODE_USE_8_DIGITS, SLOT_NAME,
};
use crate::domain::tlv::{self, Entry};
use crate::infra::error::{TokenError, TokenResult};
use crate::services::ccid_session::CcidSession;
use crate::services::hid_session::{HidSession, TEMPORARY_PASSWORD_LENGTH};
use crate::types::{Base32Secret, Pin};

/// Outcome of an HOTP code check. The token performs the comparison and
/// the counter resynchronization window check; this is only its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Passed,
    Failed,
}

/// Assembled status of a connected device.
#[derive(Debug, Clone, Default)]
pub struct DeviceStatus {
    /// Firmware (secrets-app) version as (major, minor).
    pub firmware_version: (u8, u8),
    /// Card serial number; zero when the device did not report one.
    pub card_serial: u32,
    /// Admin PIN retry counter; `None` when no PIN is set yet.
    pub retry_admin: Option<u8>,
    /// User PIN retry counter; `None` when no PIN is set yet.
    pub retry_user: Option<u8>,
    /// General configuration bytes of the legacy family (double-press slot
    /// bindings and user-password settings); zeroed on the CCID family.
    pub general_config: [u8; 5],
    /// Extra detail only the Nitrokey 3 family provides.
    pub nk3: Option<Nk3Status>,
}

/// Nitrokey 3 specific status detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nk3Status {
    /// Packed firmware build number; decode with [`Nk3Status::version_triplet`].
    pub firmware_version: u32,
    pub pgp_admin_pin_retries: u8,
    pub pgp_user_pin_retries: u8,
}

impl Nk3Status {
    /// Unpack the firmware build number into (major, minor, patch).
    #[must_use]
    pub fn version_triplet(&self) -> (u32, u32, u32) {
        (
            (self.firmware_version >> 22) & 0x3FF,
            (self.firmware_version >> 6) & 0xFFFF,
            self.firmware_version & 0x3F,
        )
    }
}

// ---------------------------------------------------------------------------
// CCID path
// ---------------------------------------------------------------------------

/// Verify the PIN against the secrets app.
pub fn authenticate_ccid<T: UsbBulk>(
    session: &mut CcidSession<T>,
    pin: &Pin,
) -> TokenResult<()> {
    let response = session.transceive_tlvs(
        ins::VERIFY_PIN,
        &[Entry::Bytes {
            tag: Tag::Password.into(),
            value: pin.as_bytes(),
        }],
    )?;
    match response.status_word {
        sw::SUCCESS => Ok(()),
        // Invalid PIN, or the PIN attempt counter is used up.
        sw::VERIFICATION_FAILED => Err(TokenError::WrongPin),
        sw::SECURITY_STATUS_NOT_SATISFIED => Err(TokenError::SecurityStatusNotSatisfied),
        sw::NOT_FOUND => Err(TokenError::NoPinAttemptsLeft),
        other => Err(TokenError::Comm(format!(
            "authentication failed: {}",
            status_word_name(other)
        ))),
    }
}

/// Set the PIN on a device that has none yet.
pub fn set_pin_ccid<T: UsbBulk>(session: &mut CcidSession<T>, pin: &Pin) -> TokenResult<()> {
    let response = session.transceive_tlvs(
        ins::SET_PIN,
        &[Entry::Bytes {
            tag: Tag::Password.into(),
            value: pin.as_bytes(),
        }],
    )?;
    expect_success(&response, "set PIN")
}

/// Change an already-set PIN.
pub fn change_pin_ccid<T: UsbBulk>(
    session: &mut CcidSession<T>,
    old_pin: &Pin,
    new_pin: &Pin,
) -> TokenResult<()> {
    let response = session.transceive_tlvs(
        ins::CHANGE_PIN,
        &[
            Entry::Bytes {
                tag: Tag::Password.into(),
                value: old_pin.as_bytes(),
            },
            Entry::Bytes {
                tag: Tag::NewPassword.into(),
                value: new_pin.as_bytes(),
            },
        ],
    )?;
    match response.status_word {
        sw::SUCCESS => Ok(()),
        sw::VERIFICATION_FAILED => Err(TokenError::WrongPin),
        other => Err(TokenError::Comm(format!(
            "PIN change failed: {}",
            status_word_name(other)
        ))),
    }
}

/// Verify the PIN, creating it first when the device has none.
pub fn authenticate_or_set_ccid<T: UsbBulk>(
    session: &mut CcidSession<T>,
    pin: &Pin,
) -> TokenResult<()> {
    match authenticate_ccid(session, pin) {
        Ok(()) => Ok(()),
        Err(TokenError::SecurityStatusNotSatisfied | TokenError::NoPinAttemptsLeft) => {
            log::info!("no PIN set on the device, setting the provided one");
            set_pin_ccid(session, pin)?;
            authenticate_ccid(session, pin)
        }
        Err(e) => Err(e),
    }
}

/// Remove the verification credential. A device that never had one
/// reports NotFound, which counts as success here.
pub fn delete_credential_ccid<T: UsbBulk>(session: &mut CcidSession<T>) -> TokenResult<()> {
    let response = session.transceive_tlvs(
        ins::DELETE,
        &[Entry::Bytes {
            tag: Tag::CredentialId.into(),
            value: SLOT_NAME,
        }],
    )?;
    match response.status_word {
        sw::SUCCESS | sw::NOT_FOUND => Ok(()),
        other => Err(TokenError::Comm(format!(
            "credential delete failed: {}",
            status_word_name(other)
        ))),
    }
}

/// Provision the HOTP secret into the verification credential.
pub fn set_secret_ccid<T: UsbBulk>(
    session: &mut CcidSession<T>,
    secret: &Base32Secret,
    pin: &Pin,
    counter: u64,
) -> TokenResult<()> {
    let raw_secret = secret.decode(CCID_SECRET_SIZE_BYTES)?;
    let initial_counter =
        u32::try_from(counter).map_err(|_| TokenError::BadCounter(counter))?;

    // A pre-existing credential under the same id would shadow the new one.
    delete_credential_ccid(session)?;

    if !pin.is_empty() {
        authenticate_or_set_ccid(session, pin)?;
    }

    // Key = [kind | algorithm, digit count] + raw secret bytes.
    let mut key = Vec::with_capacity(2 + raw_secret.len());
    key.push(kind::HOTP_REVERSE | algo::SHA1);
    key.push(if HOTP_CODE_USE_8_DIGITS { 8 } else { 6 });
    key.extend_from_slice(&raw_secret);

    let properties: [u8; 2] = [Tag::Properties.into(), 0x00];

    let response = session.transceive_tlvs(
        ins::PUT,
        &[
            Entry::Bytes {
                tag: Tag::CredentialId.into(),
                value: SLOT_NAME,
            },
            Entry::Bytes {
                tag: Tag::Key.into(),
                value: &key,
            },
            Entry::Raw(&properties),
            Entry::IntBe {
                tag: Tag::InitialCounter.into(),
                value: initial_counter,
            },
        ],
    )?;
    match response.status_word {
        sw::SUCCESS => Ok(()),
        sw::NOT_FOUND => Err(TokenError::NoPinAttemptsLeft),
        sw::SECURITY_STATUS_NOT_SATISFIED => Err(TokenError::SecurityStatusNotSatisfied),
        _ => Err(TokenError::ValidationFailed),
    }
}

/// Ask the token to verify `code` against the credential.
pub fn verify_code_ccid<T: UsbBulk>(
    session: &mut CcidSession<T>,
    code: u32,
) -> TokenResult<Verification> {
    let response = session.transceive_tlvs(
        ins::VERIFY_CODE,
        &[
            Entry::Bytes {
                tag: Tag::CredentialId.into(),
                value: SLOT_NAME,
            },
            Entry::IntBe {
                tag: Tag::Response.into(),
                value: code,
            },
        ],
    )?;
    match response.status_word {
        sw::SUCCESS => Ok(Verification::Passed),
        // Slot is not configured, or requires a PIN to proceed.
        sw::NOT_FOUND => Err(TokenError::SlotNotConfigured),
        _ => Ok(Verification::Failed),
    }
}

/// Query device status from the secrets-app select response, plus the
/// Nitrokey 3 extras when `with_nk3_extras` is set.
pub fn status_ccid<T: UsbBulk>(
    session: &mut CcidSession<T>,
    with_nk3_extras: bool,
) -> TokenResult<DeviceStatus> {
    let response = session.select()?;
    if response.data.is_empty() || response.status_word != sw::SUCCESS {
        return Err(TokenError::Comm(format!(
            "application select failed: {}",
            status_word_name(response.status_word)
        )));
    }
    let tlv_area = &response.data[..response.data.len() - 2];

    let retry_counter = match tlv::decode_one(tlv_area, Tag::PinCounter.into()) {
        Ok(tlv) => tlv.value.first().copied(),
        Err(tlv::TlvError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let card_serial = match tlv::decode_one(tlv_area, Tag::SerialNumber.into()) {
        Ok(tlv) if tlv.value.len() >= 4 => {
            u32::from_be_bytes([tlv.value[0], tlv.value[1], tlv.value[2], tlv.value[3]])
        }
        _ => 0,
    };

    // A device that cannot even report its version is not talking the
    // protocol we expect.
    let version_tlv = tlv::decode_one(tlv_area, Tag::Version.into())
        .map_err(|_| TokenError::Comm("firmware version TLV missing".to_string()))?;
    if version_tlv.value.len() < 2 {
        return Err(TokenError::Comm("firmware version TLV too short".to_string()));
    }
    let firmware_version = (version_tlv.value[0], version_tlv.value[1]);

    let nk3 = if with_nk3_extras {
        Some(nk3_extra_status(session)?)
    } else {
        None
    };

    Ok(DeviceStatus {
        firmware_version,
        card_serial,
        retry_admin: retry_counter,
        retry_user: retry_counter,
        general_config: [0; 5],
        nk3,
    })
}

/// Fetch the firmware build number and the OpenPGP PIN retry counters.
fn nk3_extra_status<T: UsbBulk>(session: &mut CcidSession<T>) -> TokenResult<Nk3Status> {
    // Firmware build number from the admin applet.
    let select_admin = Apdu {
        cla: 0,
        ins: ins::SELECT,
        p1: 0x04,
        p2: 0x00,
        data: AID_ADMIN,
        le: 0,
    };
    let response = session.transceive_apdu(&select_admin)?;
    expect_success(&response, "admin applet select")?;

    let get_version = Apdu {
        cla: 0,
        ins: ins::ADMIN_VERSION,
        p1: 0,
        p2: 0,
        data: &[],
        le: 0xFF,
    };
    let response = session.transceive_apdu(&get_version)?;
    expect_success(&response, "firmware version query")?;
    if response.data.len() < 6 {
        return Err(TokenError::Comm("firmware version response too short".to_string()));
    }
    let firmware_version = u32::from_be_bytes([
        response.data[0],
        response.data[1],
        response.data[2],
        response.data[3],
    ]);

    // PIN retry counters from the OpenPGP applet's password status bytes.
    let select_pgp = Apdu {
        cla: 0,
        ins: ins::SELECT,
        p1: 0x04,
        p2: 0x00,
        data: AID_OPENPGP,
        le: 0,
    };
    let response = session.transceive_apdu(&select_pgp)?;
    expect_success(&response, "OpenPGP applet select")?;

    let get_pw_status = Apdu {
        cla: 0,
        ins: ins::GET_DATA,
        p1: 0x00,
        p2: 0xC4,
        data: &[],
        le: 0xFF,
    };
    let response = session.transceive_apdu(&get_pw_status)?;
    expect_success(&response, "password status query")?;
    if response.data.len() < 9 {
        return Err(TokenError::Comm("password status response too short".to_string()));
    }

    Ok(Nk3Status {
        firmware_version,
        pgp_user_pin_retries: response.data[4],
        pgp_admin_pin_retries: response.data[6],
    })
}

fn expect_success(response: &IccResponse, what: &str) -> TokenResult<()> {
    if response.status_word != sw::SUCCESS {
        return Err(TokenError::Comm(format!(
            "{what} failed: {}",
            status_word_name(response.status_word)
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HID path
// ---------------------------------------------------------------------------

/// Size of the OTP data chunk in one slot-write command.
const OTP_DATA_CHUNK: usize = 30;

/// Admin password field size in the AES key regeneration command.
const AES_REGEN_PASSWORD_LEN: usize = 20;

fn map_hid_status(status: u8) -> TokenResult<()> {
    match status {
        hid_status::OK => Ok(()),
        hid_status::WRONG_PASSWORD => Err(TokenError::WrongPin),
        hid_status::SLOT_NOT_PROGRAMMED => Err(TokenError::SlotNotConfigured),
        other => Err(TokenError::DeviceCommand(other)),
    }
}

/// Admin-authenticate and install a fresh temporary password scoping the
/// writes that follow.
pub fn authenticate_admin_hid<T: HidFeature>(
    session: &mut HidSession<T>,
    pin: &Pin,
) -> TokenResult<()> {
    if pin.len() > TEMPORARY_PASSWORD_LENGTH {
        return Err(TokenError::TooLongPin);
    }
    let temporary_password = session.fresh_admin_password();

    // card_password[25] then temporary_password[25].
    let mut payload = [0u8; 2 * TEMPORARY_PASSWORD_LENGTH];
    payload[..pin.len()].copy_from_slice(pin.as_bytes());
    payload[TEMPORARY_PASSWORD_LENGTH..].copy_from_slice(&temporary_password);

    session.exchange(&payload, hid_command::FIRST_AUTHENTICATE)?;
    map_hid_status(session.last_command_status())
}

/// User-authenticate, for flows that only read OTP state.
pub fn authenticate_user_hid<T: HidFeature>(
    session: &mut HidSession<T>,
    pin: &Pin,
) -> TokenResult<()> {
    if pin.len() > TEMPORARY_PASSWORD_LENGTH {
        return Err(TokenError::TooLongPin);
    }
    let temporary_password = session.fresh_user_password();

    let mut payload = [0u8; 2 * TEMPORARY_PASSWORD_LENGTH];
    payload[..pin.len()].copy_from_slice(pin.as_bytes());
    payload[TEMPORARY_PASSWORD_LENGTH..].copy_from_slice(&temporary_password);

    session.exchange(&payload, hid_command::USER_AUTHENTICATE)?;
    map_hid_status(session.last_command_status())
}

/// One slot-write data chunk: secret bytes or slot name.
fn send_otp_data<T: HidFeature>(
    session: &mut HidSession<T>,
    data_type: u8,
    data: &[u8],
) -> TokenResult<()> {
    // temporary_admin_password[25] | type | id | data[30]
    let mut payload = [0u8; TEMPORARY_PASSWORD_LENGTH + 2 + OTP_DATA_CHUNK];
    payload[..TEMPORARY_PASSWORD_LENGTH].copy_from_slice(session.admin_password());
    payload[TEMPORARY_PASSWORD_LENGTH] = data_type;
    payload[TEMPORARY_PASSWORD_LENGTH + 1] = 0;
    let copy_len = data.len().min(OTP_DATA_CHUNK);
    payload[TEMPORARY_PASSWORD_LENGTH + 2..TEMPORARY_PASSWORD_LENGTH + 2 + copy_len]
        .copy_from_slice(&data[..copy_len]);

    session.exchange(&payload, hid_command::SEND_OTP_DATA)?;
    map_hid_status(session.last_command_status())
}

/// Provision the HOTP secret into the verification slot: secret chunk,
/// name chunk, then the slot-configuration write. Each step must succeed
/// on its own.
pub fn set_secret_hid<T: HidFeature>(
    session: &mut HidSession<T>,
    secret: &Base32Secret,
    pin: &Pin,
    counter: u64,
) -> TokenResult<()> {
    let raw_secret = secret.decode(HID_SECRET_SIZE_BYTES)?;

    authenticate_admin_hid(session, pin)?;

    send_otp_data(session, b'S', &raw_secret)?;
    send_otp_data(session, b'N', HID_SLOT_NAME)?;

    // temporary_admin_password[25] | slot | counter u64 LE | config | token id[13]
    let mut payload = [0u8; TEMPORARY_PASSWORD_LENGTH + 1 + 8 + 1 + 13];
    payload[..TEMPORARY_PASSWORD_LENGTH].copy_from_slice(session.admin_password());
    payload[TEMPORARY_PASSWORD_LENGTH] = 0x10 + HID_HOTP_SLOT_NUMBER;
    payload[TEMPORARY_PASSWORD_LENGTH + 1..TEMPORARY_PASSWORD_LENGTH + 9]
        .copy_from_slice(&counter.to_le_bytes());
    payload[TEMPORARY_PASSWORD_LENGTH + 9] = u8::from(HOTP_CODE_USE_8_DIGITS);

    session.exchange(&payload, hid_command::WRITE_TO_SLOT)?;
    map_hid_status(session.last_command_status())
}

/// Ask the device to verify `code` against the HOTP slot.
pub fn verify_code_hid<T: HidFeature>(
    session: &mut HidSession<T>,
    code: u32,
) -> TokenResult<Verification> {
    session.exchange(&code.to_le_bytes(), hid_command::VERIFY_OTP_CODE)?;
    map_hid_status(session.last_command_status())?;

    // First payload byte is the device's verdict.
    if session.response_payload()[0] != 0 {
        Ok(Verification::Passed)
    } else {
        Ok(Verification::Failed)
    }
}

/// Query firmware version, serial and both PIN retry counters.
///
/// Reading the smartcard counters takes an extra round-trip each, which
/// is why they come from dedicated commands.
pub fn status_hid<T: HidFeature>(session: &mut HidSession<T>) -> TokenResult<DeviceStatus> {
    session.exchange(&[], hid_command::GET_PASSWORD_RETRY_COUNT)?;
    let retry_admin = session.response_payload()[0];

    session.exchange(&[], hid_command::GET_USER_PASSWORD_RETRY_COUNT)?;
    let retry_user = session.response_payload()[0];

    session.exchange(&[], hid_command::GET_STATUS)?;
    let payload = session.response_payload();
    // minor | major | serial u32 | general config[5]
    let firmware_version = (payload[1], payload[0]);
    let card_serial = u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]);
    let mut general_config = [0u8; 5];
    general_config.copy_from_slice(&payload[6..11]);

    Ok(DeviceStatus {
        firmware_version,
        card_serial,
        retry_admin: Some(retry_admin),
        retry_user: Some(retry_user),
        general_config,
        nk3: None,
    })
}

/// Regenerate the AES key protecting the password-safe and OTP slots.
pub fn regenerate_aes_key_hid<T: HidFeature>(
    session: &mut HidSession<T>,
    pin: &Pin,
) -> TokenResult<()> {
    if pin.len() > AES_REGEN_PASSWORD_LEN {
        return Err(TokenError::TooLongPin);
    }
    authenticate_admin_hid(session, pin)?;

    let mut payload = [0u8; AES_REGEN_PASSWORD_LEN];
    payload[..pin.len()].copy_from_slice(pin.as_bytes());

    session.exchange(&payload, hid_command::BUILD_AES_KEY)?;
    map_hid_status(session.last_command_status())
}
