//! The 64-bit hardware identifier (EUI-64) of a LoRa module.
//!
//! The module reports its identifier as exactly 16 hexadecimal digits,
//! most significant octet first (e.g. `0004A30B001A2B3C`).

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A globally unique 64-bit hardware identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eui64(u64);

impl Eui64 {
    /// Number of hex digits in the textual form.
    pub const HEX_LEN: usize = 16;

    pub const fn new(value: u64) -> Self {
        Eui64(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The identifier as eight octets, most significant first.
    pub fn octets(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for Eui64 {
    fn from(value: u64) -> Self {
        Eui64(value)
    }
}

impl From<Eui64> for u64 {
    fn from(eui: Eui64) -> Self {
        eui.0
    }
}

impl FromStr for Eui64 {
    type Err = Error;

    /// Parse exactly 16 hex digits. Signs, prefixes, and whitespace are
    /// rejected, unlike `u64::from_str_radix` which accepts a leading `+`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Protocol(format!(
                "expected {} hex digits for EUI, got {s:?}",
                Self::HEX_LEN
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Eui64)
            .map_err(|e| Error::Protocol(format!("invalid EUI {s:?}: {e}")))
    }
}

impl fmt::Display for Eui64 {
    /// `{}` prints 16 upper-case hex digits; `{:#}` prints colon-separated
    /// octets.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let octets = self.octets();
            for (i, octet) in octets.iter().enumerate() {
                if i > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{octet:02X}")?;
            }
            Ok(())
        } else {
            write!(f, "{:016X}", self.0)
        }
    }
}
