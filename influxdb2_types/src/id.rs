//! Organization and bucket identifiers, compatible with the 16 hex digit IDs
//! issued by InfluxDB 2.x.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use std::{fmt, num::NonZeroU64, str::FromStr};
use thiserror::Error;

/// The exact length a string must have in order to be decoded into a valid
/// [`Id`].
pub const ID_LENGTH: usize = 16;

/// Errors returned when decoding an [`Id`] from its string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("id must have a length of 16 bytes, got {0}")]
    InvalidLength(usize),

    #[error("id is not valid hexadecimal")]
    InvalidHex,

    #[error("id cannot be zero")]
    Zero,
}

/// A unique identifier for an organization or bucket.
///
/// Its zero value is not a valid ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(NonZeroU64);

impl Id {
    /// Build an [`Id`] from its numeric value, returning [`None`] for zero.
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<u64> for Id {
    type Error = IdError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(IdError::Zero)
    }
}

impl From<NonZeroU64> for Id {
    fn from(value: NonZeroU64) -> Self {
        Self(value)
    }
}

impl From<Id> for u64 {
    fn from(value: Id) -> Self {
        value.get()
    }
}

impl TryFrom<&str> for Id {
    type Error = IdError;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        if hex.len() != ID_LENGTH {
            return Err(IdError::InvalidLength(hex.len()));
        }

        // from_str_radix tolerates a leading sign, an ID does not
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IdError::InvalidHex);
        }

        u64::from_str_radix(hex, 16)
            .map_err(|_| IdError::InvalidHex)
            .and_then(Self::try_from)
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        Self::try_from(hex)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.get())
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
