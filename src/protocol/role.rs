//! File roles.
//!
//! On the wire a role is exactly three decimal digits, each position an
//! independent flag:
//!
//! ```text
//!  digit 0   owner-role marker
//!  digit 1   0 = public, nonzero = private (owner-only)
//!  digit 2   0 = plaintext, 1 = convergent-encrypted
//! ```
//!
//! The digits are kept verbatim so any role read from the wire is written
//! back unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a role string is not three decimal digits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid file role {0:?}: expected three decimal digits")]
pub struct RoleParseError(pub String);

/// Visibility and encoding flags of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Role {
    digits: [u8; 3],
}

impl Role {
    /// Build a role from its named flags.
    #[must_use]
    pub const fn new(owner_marked: bool, private: bool, encrypted: bool) -> Self {
        Self {
            digits: [owner_marked as u8, private as u8, encrypted as u8],
        }
    }

    /// Public plaintext role (`000`).
    #[must_use]
    pub const fn public() -> Self {
        Self::new(false, false, false)
    }

    /// Whether the owner-role marker (digit 0) is set.
    #[must_use]
    pub const fn is_owner_marked(&self) -> bool {
        self.digits[0] != 0
    }

    /// Whether the file is visible to its owner only.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        self.digits[1] != 0
    }

    /// Whether the blob is stored convergent-encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.digits[2] == 1
    }

    /// Whether the file may be served to unauthenticated callers.
    ///
    /// Only public roles with digit 2 set (`001`, `101`) qualify.
    #[must_use]
    pub const fn is_publicly_served(&self) -> bool {
        !self.is_private() && self.digits[2] == 1
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.digits;
        write!(f, "{a}{b}{c}")
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(RoleParseError(s.to_string()));
        }
        Ok(Self {
            digits: [bytes[0] - b'0', bytes[1] - b'0', bytes[2] - b'0'],
        })
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
