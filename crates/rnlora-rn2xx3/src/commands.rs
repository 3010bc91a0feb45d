//! RN2xx3 command builders and reply parsers.
//!
//! All functions are pure: they produce command text (without the CR LF
//! terminator, which the command channel appends) or interpret one reply
//! line. Each command has its own reply grammar:
//!
//! | Command          | Reply                                   |
//! |------------------|-----------------------------------------|
//! | `sys get hweui`  | 16 hex digits                           |
//! | `mac get band`   | decimal MHz                             |
//! | `mac reset <b>`  | `ok` or `invalid_param`                 |
//! | `mac get status` | hex 32-bit bitmask                      |
//! | `mac pause`      | decimal, how long the MAC may stay paused |
//! | `mac resume`     | `ok`                                    |
//! | `mac get sync`   | hex sync word (not interpreted)         |

use rnlora_core::{Error, Eui64, Result};

/// Read the preprogrammed 64-bit hardware EUI.
pub const CMD_SYS_GET_HWEUI: &str = "sys get hweui";
/// Read the current frequency band (RN2483 only).
pub const CMD_MAC_GET_BAND: &str = "mac get band";
/// Read the LoRaWAN MAC status bitmask.
pub const CMD_MAC_GET_STATUS: &str = "mac get status";
/// Pause the LoRaWAN stack.
pub const CMD_MAC_PAUSE: &str = "mac pause";
/// Resume the LoRaWAN stack.
pub const CMD_MAC_RESUME: &str = "mac resume";
/// Read the sync word.
pub const CMD_MAC_GET_SYNC: &str = "mac get sync";

/// Shape of the boot banner; a valid banner is at least this long.
pub const BANNER_TEMPLATE: &str = "RNxxxx X.Y.Z MMM DD YYYY HH:MM:SS";

const REPLY_OK: &str = "ok";
const REPLY_INVALID_PARAM: &str = "invalid_param";

/// Build `mac reset <band>`, which resets the MAC to the defaults of a band.
pub fn cmd_mac_reset(band: u16) -> String {
    format!("mac reset {band}")
}

/// The boot banner printed after reset, e.g.
/// `RN2483 1.0.3 Nov 23 2016 10:55:12`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Model code from characters 2..6.
    pub model_code: u16,
    /// The banner line as received.
    pub text: String,
}

impl Banner {
    /// The firmware version field (`1.0.3` in the example above).
    pub fn firmware_version(&self) -> Option<&str> {
        self.text.split_whitespace().nth(1)
    }
}

/// Validate the boot banner and extract the model code.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line is shorter than
/// [`BANNER_TEMPLATE`], does not start with `RN`, has no space at offset 6,
/// or the model code is not four decimal digits.
pub fn parse_banner(line: &str) -> Result<Banner> {
    let bytes = line.as_bytes();
    if bytes.len() < BANNER_TEMPLATE.len() || bytes[6] != b' ' || !line.starts_with("RN") {
        return Err(Error::Protocol(format!("unexpected banner: {line:?}")));
    }

    let code = &bytes[2..6];
    if !code.iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol(format!(
            "model code is not numeric in banner: {line:?}"
        )));
    }
    let model_code = code
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));

    Ok(Banner {
        model_code,
        text: line.to_string(),
    })
}

/// Parse the reply to `sys get hweui`.
pub fn parse_hweui(line: &str) -> Result<Eui64> {
    line.parse()
}

/// Parse the reply to `mac get band` (decimal MHz).
pub fn parse_band(line: &str) -> Result<u16> {
    parse_decimal(line, "band")
}

/// Interpret the reply to `mac reset <band>`.
///
/// # Errors
///
/// [`Error::Invalid`] for `invalid_param`, [`Error::Protocol`] for
/// anything other than `ok`.
pub fn parse_mac_reset_reply(line: &str) -> Result<()> {
    match line {
        REPLY_OK => Ok(()),
        REPLY_INVALID_PARAM => Err(Error::Invalid(line.to_string())),
        _ => Err(Error::Protocol(format!(
            "unexpected reply to mac reset: {line:?}"
        ))),
    }
}

/// Parse the reply to `mac get status` (hex, optional `0x` prefix).
pub fn parse_status(line: &str) -> Result<u32> {
    let digits = line
        .strip_prefix("0x")
        .or_else(|| line.strip_prefix("0X"))
        .unwrap_or(line);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Protocol(format!("invalid MAC status: {line:?}")));
    }
    u32::from_str_radix(digits, 16)
        .map_err(|e| Error::Protocol(format!("invalid MAC status: {line:?} ({e})")))
}

/// Parse the reply to `mac pause` (decimal).
pub fn parse_pause(line: &str) -> Result<u32> {
    parse_decimal(line, "pause duration")
}

/// Expect the literal `ok`.
pub fn parse_ok(line: &str) -> Result<()> {
    if line == REPLY_OK {
        Ok(())
    } else {
        Err(Error::Protocol(format!("expected \"ok\", got {line:?}")))
    }
}

fn parse_decimal<T: std::str::FromStr>(line: &str, what: &str) -> Result<T> {
    if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Protocol(format!("invalid {what}: {line:?}")));
    }
    line.parse::<T>()
        .map_err(|_| Error::Protocol(format!("{what} out of range: {line:?}")))
}
