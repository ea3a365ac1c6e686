//! The `x402Version` field.

use serde::{Deserialize, Serialize};

/// The x402 protocol revision spoken by Cedros Pay servers.
///
/// Carried as the bare integer `1`; any other value is refused when a
/// payload is decoded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct X402Version;

impl X402Version {
    /// The numeric value on the wire.
    pub const VALUE: u8 = 1;
}

impl From<X402Version> for u8 {
    fn from(_: X402Version) -> Self {
        X402Version::VALUE
    }
}

impl TryFrom<u8> for X402Version {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value == Self::VALUE {
            Ok(Self)
        } else {
            Err(format!(
                "unsupported x402Version {value}, expected {}",
                Self::VALUE
            ))
        }
    }
}
