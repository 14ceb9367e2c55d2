//! Protocol constants shared by both transports.
//!
//! Tag and instruction values come from the secrets application on the
//! token; status words are standard ISO7816 with a few vendor additions.

/// USB vendor/product identity of a supported token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VidPid {
    pub vid: u16,
    pub pid: u16,
    pub name: &'static str,
}

/// HID-family devices, probed in order.
pub const HID_DEVICES: &[VidPid] = &[
    VidPid {
        vid: 0x20a0,
        pid: 0x4108,
        name: "Nitrokey Pro",
    },
    VidPid {
        vid: 0x316d,
        pid: 0x4c4b,
        name: "Librem Key",
    },
    VidPid {
        vid: 0x20a0,
        pid: 0x4109,
        name: "Nitrokey Storage",
    },
];

/// CCID-family devices.
pub const CCID_DEVICES: &[VidPid] = &[VidPid {
    vid: 0x20a0,
    pid: 0x42b2,
    name: "Nitrokey 3",
}];

/// TLV tags understood by the secrets application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    CredentialId = 0x71,
    NameList = 0x72,
    Key = 0x73,
    Challenge = 0x74,
    Response = 0x75,
    Properties = 0x78,
    Version = 0x79,
    InitialCounter = 0x7A,
    Algorithm = 0x7B,
    Password = 0x80,
    NewPassword = 0x81,
    PinCounter = 0x82,
    SerialNumber = 0x8F,
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> Self {
        tag as u8
    }
}

/// Credential kind stored in the first key header byte.
pub mod kind {
    pub const HOTP: u8 = 0x10;
    pub const TOTP: u8 = 0x20;
    pub const HOTP_REVERSE: u8 = 0x30;
}

/// Hash algorithm stored in the first key header byte.
pub mod algo {
    pub const SHA1: u8 = 0x01;
    pub const SHA256: u8 = 0x02;
    pub const SHA512: u8 = 0x03;
}

/// Secrets-application instruction bytes.
pub mod ins {
    pub const PUT: u8 = 0x01;
    pub const DELETE: u8 = 0x02;
    pub const VERIFY_CODE: u8 = 0xB1;
    pub const VERIFY_PIN: u8 = 0xB2;
    pub const CHANGE_PIN: u8 = 0xB3;
    pub const SET_PIN: u8 = 0xB4;
    pub const SELECT: u8 = 0xA4;
    pub const GET_RESPONSE: u8 = 0xC0;
    pub const GET_DATA: u8 = 0xCA;
    pub const ADMIN_VERSION: u8 = 0x62;
}

/// Application identifier of the secrets app.
pub const AID_SECRETS: &[u8] = &[0xA0, 0x00, 0x00, 0x05, 0x27, 0x21, 0x01];

/// Application identifier of the vendor admin app (Nitrokey 3).
pub const AID_ADMIN: &[u8] = &[0xA0, 0x00, 0x00, 0x08, 0x47, 0x00, 0x00, 0x00, 0x01];

/// Application identifier of the OpenPGP app.
pub const AID_OPENPGP: &[u8] = &[0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];

/// ISO7816 status words used by the operations layer.
pub mod sw {
    pub const SUCCESS: u16 = 0x9000;
    pub const VERIFICATION_FAILED: u16 = 0x6300;
    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const NOT_FOUND: u16 = 0x6A82;
}

/// First response byte signalling that more response data is available.
pub const MORE_DATA_STATUS_BYTE: u8 = 0x61;

/// Slot status value meaning the token is waiting for a user touch.
pub const AWAITING_TOUCH_STATUS: u8 = 0x80;

/// Human-readable name for an ISO7816 status word.
pub fn status_word_name(sw: u16) -> &'static str {
    if (sw & 0xFF00) == 0x6100 {
        return "MoreDataAvailable";
    }
    match sw {
        0x6300 => "VerificationFailed",
        0x6400 => "UnspecifiedNonpersistentExecutionError",
        0x6500 => "UnspecifiedPersistentExecutionError",
        0x6700 => "WrongLength",
        0x6881 => "LogicalChannelNotSupported",
        0x6882 => "SecureMessagingNotSupported",
        0x6884 => "CommandChainingNotSupported",
        0x6982 => "SecurityStatusNotSatisfied",
        0x6983 => "OperationBlocked",
        0x6985 => "ConditionsOfUseNotSatisfied",
        0x6A80 => "IncorrectDataParameter",
        0x6A81 => "FunctionNotSupported",
        0x6A82 => "NotFound",
        0x6A84 => "NotEnoughMemory",
        0x6A86 => "IncorrectP1OrP2Parameter",
        0x6A88 => "KeyReferenceNotFound",
        0x6D00 => "InstructionNotSupportedOrInvalid",
        0x6E00 => "ClassNotSupported",
        0x6F00 => "UnspecifiedCheckingError",
        0x9000 => "Success",
        _ => "Unknown error code",
    }
}

/// HID command-id bytes of the legacy device firmware.
pub mod hid_command {
    pub const GET_STATUS: u8 = 0x00;
    pub const WRITE_TO_SLOT: u8 = 0x01;
    pub const FIRST_AUTHENTICATE: u8 = 0x06;
    pub const GET_PASSWORD_RETRY_COUNT: u8 = 0x08;
    pub const USER_AUTHENTICATE: u8 = 0x0D;
    pub const GET_USER_PASSWORD_RETRY_COUNT: u8 = 0x0E;
    pub const CHANGE_ADMIN_PIN: u8 = 0x14;
    pub const SEND_OTP_DATA: u8 = 0x17;
    pub const VERIFY_OTP_CODE: u8 = 0x18;
    pub const BUILD_AES_KEY: u8 = 0x20;
}

/// Command status byte reported by the legacy firmware in each response.
pub mod hid_status {
    pub const OK: u8 = 0;
    pub const WRONG_CRC: u8 = 1;
    pub const WRONG_SLOT: u8 = 2;
    pub const SLOT_NOT_PROGRAMMED: u8 = 3;
    pub const WRONG_PASSWORD: u8 = 4;
    pub const NOT_AUTHORIZED: u8 = 5;
    pub const TIMESTAMP_WARNING: u8 = 6;
    pub const NO_NAME_ERROR: u8 = 7;
    pub const NOT_SUPPORTED: u8 = 8;
    pub const UNKNOWN_COMMAND: u8 = 9;
    pub const AES_DEC_FAILED: u8 = 10;
}

/// Name of a legacy firmware command status byte.
pub fn hid_status_name(status: u8) -> &'static str {
    match status {
        hid_status::OK => "ok",
        hid_status::WRONG_CRC => "wrong CRC",
        hid_status::WRONG_SLOT => "wrong slot",
        hid_status::SLOT_NOT_PROGRAMMED => "slot not programmed",
        hid_status::WRONG_PASSWORD => "wrong password",
        hid_status::NOT_AUTHORIZED => "not authorized",
        hid_status::TIMESTAMP_WARNING => "timestamp warning",
        hid_status::NO_NAME_ERROR => "no name",
        hid_status::NOT_SUPPORTED => "not supported",
        hid_status::UNKNOWN_COMMAND => "unknown command",
        hid_status::AES_DEC_FAILED => "AES decryption failed",
        _ => "unknown status",
    }
}

/// Credential identifier of the verification slot on the CCID family.
pub const SLOT_NAME: &[u8] = b"HEADS Validation";

/// Display name of the verification slot on the HID family.
pub const HID_SLOT_NAME: &[u8] = b"Validation";

/// HOTP slot index used on the HID family; the firmware numbers HOTP
/// slots from 0x10.
pub const HID_HOTP_SLOT_NUMBER: u8 = 3;

/// Validate 8-digit codes instead of 6-digit ones.
pub const HOTP_CODE_USE_8_DIGITS: bool = false;

/// Maximum raw secret accepted by the CCID family (320 bits).
pub const CCID_SECRET_SIZE_BYTES: usize = 40;

/// Maximum raw secret accepted by the HID family (160 bits).
pub const HID_SECRET_SIZE_BYTES: usize = 20;

/// Maximum PIN length accepted by the secrets app.
pub const MAX_PIN_SIZE_CCID: usize = 128;

/// Receive buffer size for CCID exchanges.
pub const MAX_CCID_BUFFER_SIZE: usize = 3072;
