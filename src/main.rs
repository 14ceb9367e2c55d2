//! HOTP verification CLI.
//!
//! Command-line interface around the device operations, with exit codes
//! stable enough to script against (boot-time attestation tooling keys on
//! them).

use clap::{Parser, Subcommand};

use hotp_verify::services::operations::DeviceStatus;
use hotp_verify::{Base32Secret, Device, HotpCode, Pin, TokenError, Verification};

#[derive(Parser)]
#[command(name = "hotp-verify")]
#[command(about = "HOTP code verification for Nitrokey USB security tokens")]
#[command(long_about = "
HOTP code verification application

The token stores the HOTP secret and counter; every check advances the
counter on the device itself, so a code can never validate twice.

EXAMPLES:
    # Provision the HOTP slot (counter starts at 0)
    hotp-verify set GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ 12345678

    # Verify a code
    hotp-verify check 755224

    # Show device identity and counters
    hotp-verify info

EXIT CODES:
    0 success / code valid        4 code rejected
    1 could not connect           6 slot not programmed
    2 wrong PIN                   7 badly formatted argument
    3 other error                 8 connection lost
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the application version
    Version,
    /// Print the card serial number
    Id,
    /// Print device status: serial, firmware versions, PIN counters
    Info,
    /// Verify an HOTP code against the device slot
    Check {
        /// 6 or 8 digit HOTP code
        code: String,
    },
    /// Provision the HOTP secret
    Set {
        /// Base32-encoded HOTP secret
        secret: String,
        /// Admin PIN
        admin_pin: String,
        /// Initial counter value
        counter: Option<u64>,
    },
    /// Regenerate the AES key (legacy devices)
    Regenerate {
        /// Admin PIN
        admin_pin: String,
    },
    /// Change the device PIN
    ChangePin {
        /// Current PIN
        old_pin: String,
        /// New PIN
        new_pin: String,
    },
}

const EXIT_NO_ERROR: i32 = 0;
const EXIT_CONNECTION_ERROR: i32 = 1;
const EXIT_WRONG_PIN: i32 = 2;
const EXIT_OTHER_ERROR: i32 = 3;
const EXIT_INVALID_HOTP_CODE: i32 = 4;
const EXIT_UNKNOWN_COMMAND: i32 = 5;
const EXIT_SLOT_NOT_PROGRAMMED: i32 = 6;
const EXIT_BAD_FORMAT: i32 = 7;
const EXIT_CONNECTION_LOST: i32 = 8;
const EXIT_INVALID_PARAMS: i32 = 100;

fn exit_code_for(error: &TokenError) -> i32 {
    use hotp_verify::domain::constants::hid_status;
    match error {
        TokenError::WrongPin => EXIT_WRONG_PIN,
        TokenError::SlotNotConfigured => EXIT_SLOT_NOT_PROGRAMMED,
        TokenError::ValidationFailed => EXIT_INVALID_HOTP_CODE,
        TokenError::BadBase32(_)
        | TokenError::BadHotpCode(_)
        | TokenError::BadCounter(_)
        | TokenError::TooLongPin => EXIT_BAD_FORMAT,
        TokenError::ConnectionLost => EXIT_CONNECTION_LOST,
        TokenError::DeviceCommand(status) if *status == hid_status::UNKNOWN_COMMAND => {
            EXIT_UNKNOWN_COMMAND
        }
        _ => EXIT_OTHER_ERROR,
    }
}

fn print_card_serial(status: &DeviceStatus) {
    if status.card_serial != 0 {
        println!("0x{:X}", status.card_serial);
    } else {
        println!("N/A");
    }
}

fn print_info(status: &DeviceStatus) {
    println!("Connected device status:");
    print!("\tCard serial: ");
    print_card_serial(status);
    if let Some(nk3) = &status.nk3 {
        let (major, minor, patch) = nk3.version_triplet();
        println!("\tFirmware Nitrokey 3: v{major}.{minor}.{patch}");
        println!(
            "\tFirmware Secrets App: v{}.{}",
            status.firmware_version.0, status.firmware_version.1
        );
        match status.retry_user {
            Some(counter) => println!("\tSecrets app PIN counter: {counter}"),
            None => {
                println!("\tSecrets app PIN counter: PIN is not set - set PIN before the first use")
            }
        }
        println!(
            "\tGPG Card counters: Admin {}, User {}",
            nk3.pgp_admin_pin_retries, nk3.pgp_user_pin_retries
        );
    } else {
        println!(
            "\tFirmware: v{}.{}",
            status.firmware_version.0, status.firmware_version.1
        );
        match (status.retry_admin, status.retry_user) {
            (Some(admin), Some(user)) => {
                println!("\tCard counters: Admin {admin}, User {user}");
            }
            _ => println!("\tCard counters: PIN is not set - set PIN before the first use"),
        }
    }
}

fn run(command: Commands) -> Result<i32, TokenError> {
    let mut device = match Device::connect() {
        Ok(device) => device,
        Err(e) => {
            println!("Could not connect to the device");
            log::debug!("connect failed: {e}");
            return Ok(EXIT_CONNECTION_ERROR);
        }
    };

    // Session state is wiped on disconnect even when the command failed.
    let result = dispatch(&mut device, command);
    device.disconnect();
    result
}

fn dispatch(device: &mut Device, command: Commands) -> Result<i32, TokenError> {
    match command {
        Commands::Version => unreachable!("handled before connecting"),
        Commands::Id => {
            let status = device.status()?;
            print_card_serial(&status);
            Ok(EXIT_NO_ERROR)
        }
        Commands::Info => {
            let status = device.status()?;
            print_info(&status);
            Ok(EXIT_NO_ERROR)
        }
        Commands::Check { code } => {
            let code = HotpCode::new(code)?;
            match device.verify_code(code.value())? {
                Verification::Passed => {
                    println!("HOTP code is correct");
                    Ok(EXIT_NO_ERROR)
                }
                Verification::Failed => {
                    println!("HOTP code is incorrect");
                    Ok(EXIT_INVALID_HOTP_CODE)
                }
            }
        }
        Commands::Set {
            secret,
            admin_pin,
            counter,
        } => {
            let secret = Base32Secret::new(secret)?;
            let pin = Pin::new(admin_pin)?;
            device.set_secret(&secret, &pin, counter.unwrap_or(0))?;
            println!("Operation success");
            Ok(EXIT_NO_ERROR)
        }
        Commands::Regenerate { admin_pin } => {
            let pin = Pin::new(admin_pin)?;
            device.regenerate_aes_key(&pin)?;
            println!("Operation success");
            Ok(EXIT_NO_ERROR)
        }
        Commands::ChangePin { old_pin, new_pin } => {
            let old_pin = Pin::new(old_pin)?;
            let new_pin = Pin::new(new_pin)?;
            device.change_pin(&old_pin, &new_pin)?;
            println!("Operation success");
            Ok(EXIT_NO_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(exit_code_for(&TokenError::WrongPin), EXIT_WRONG_PIN);
        assert_eq!(
            exit_code_for(&TokenError::SlotNotConfigured),
            EXIT_SLOT_NOT_PROGRAMMED
        );
        assert_eq!(
            exit_code_for(&TokenError::ValidationFailed),
            EXIT_INVALID_HOTP_CODE
        );
        assert_eq!(
            exit_code_for(&TokenError::BadBase32("x".into())),
            EXIT_BAD_FORMAT
        );
        assert_eq!(
            exit_code_for(&TokenError::BadHotpCode("x".into())),
            EXIT_BAD_FORMAT
        );
        assert_eq!(exit_code_for(&TokenError::TooLongPin), EXIT_BAD_FORMAT);
        assert_eq!(
            exit_code_for(&TokenError::ConnectionLost),
            EXIT_CONNECTION_LOST
        );
        assert_eq!(
            exit_code_for(&TokenError::Comm("x".into())),
            EXIT_OTHER_ERROR
        );
        assert_eq!(
            exit_code_for(&TokenError::DeviceCommand(
                hotp_verify::domain::constants::hid_status::UNKNOWN_COMMAND
            )),
            EXIT_UNKNOWN_COMMAND
        );
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    EXIT_NO_ERROR
                }
                _ => EXIT_INVALID_PARAMS,
            };
            std::process::exit(code);
        }
    };

    println!(
        "HOTP code verification application, version {}",
        env!("CARGO_PKG_VERSION")
    );

    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(EXIT_NO_ERROR);
    }

    match run(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            println!("Error occurred: {e}");
            std::process::exit(exit_code_for(&e));
        }
    }
}
