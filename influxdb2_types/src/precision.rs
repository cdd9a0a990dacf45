//! Write precision handling.
//!
//! Clients name a precision with the external tokens of the v2 write API
//! (`ns`, `us`, `ms`, `s`). Internally precisions are carried as the short
//! codes of the line protocol parser (`n`, `u`, `ms`, `s`, `m`, `h`), with the
//! empty string standing for "unspecified", which is nanoseconds.

use std::{fmt, str::FromStr};
use thiserror::Error;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

/// A precision token was rejected by one of the two validation stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPrecision {
    /// The token is not one of the external aliases.
    #[error("invalid precision {0:?} (use ns, us, ms or s)")]
    External(String),

    /// The token is not one of the internal precision codes.
    #[error("invalid precision {0:?} (use n, u, ms, s, m or h)")]
    Internal(String),
}

/// The time unit used to interpret explicit timestamps and to truncate
/// default timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    /// No precision was given; timestamps are nanoseconds.
    #[default]
    Unspecified,
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Minute,
    Hour,
}

impl Precision {
    /// Map an external precision token onto a [`Precision`].
    ///
    /// The token first has its aliases rewritten (`ns` to `n`, `us` to `u`)
    /// and is then validated against the internal code alphabet. Both stages
    /// must accept the token.
    pub fn normalize(token: &str) -> Result<Self, InvalidPrecision> {
        let code = rewrite_alias(token)?;
        Self::from_code(code)
    }

    /// Validate an internal precision code.
    pub fn from_code(code: &str) -> Result<Self, InvalidPrecision> {
        match code {
            "" => Ok(Self::Unspecified),
            "n" => Ok(Self::Nanosecond),
            "u" => Ok(Self::Microsecond),
            "ms" => Ok(Self::Millisecond),
            "s" => Ok(Self::Second),
            "m" => Ok(Self::Minute),
            "h" => Ok(Self::Hour),
            other => Err(InvalidPrecision::Internal(other.to_string())),
        }
    }

    /// The internal code of this precision.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::Nanosecond => "n",
            Self::Microsecond => "u",
            Self::Millisecond => "ms",
            Self::Second => "s",
            Self::Minute => "m",
            Self::Hour => "h",
        }
    }

    /// Number of nanoseconds in one unit of this precision.
    pub fn nanos_per_unit(&self) -> i64 {
        match self {
            Self::Unspecified | Self::Nanosecond => 1,
            Self::Microsecond => NANOS_PER_MICRO,
            Self::Millisecond => NANOS_PER_MILLI,
            Self::Second => NANOS_PER_SECOND,
            Self::Minute => NANOS_PER_MINUTE,
            Self::Hour => NANOS_PER_HOUR,
        }
    }

    /// Convert a timestamp expressed in this precision to nanoseconds,
    /// returning [`None`] when the result does not fit in an `i64`.
    pub fn to_nanos(&self, timestamp: i64) -> Option<i64> {
        timestamp.checked_mul(self.nanos_per_unit())
    }

    /// Round a nanosecond timestamp down to a whole unit of this precision.
    ///
    /// Near `i64::MIN`, where the unit below is not representable, rounds up
    /// to the next whole unit instead.
    pub fn truncate(&self, nanos: i64) -> i64 {
        let unit = self.nanos_per_unit();
        let rem = nanos.rem_euclid(unit);
        nanos
            .checked_sub(rem)
            .unwrap_or_else(|| nanos + (unit - rem))
    }
}

/// First validation stage: accept the external aliases and rewrite them to
/// internal codes. Minute and hour codes have no external alias and pass
/// through unchanged.
fn rewrite_alias(token: &str) -> Result<&str, InvalidPrecision> {
    match token {
        "ns" => Ok("n"),
        "us" => Ok("u"),
        "ms" | "s" | "" => Ok(token),
        "m" | "h" => Ok(token),
        other => Err(InvalidPrecision::External(other.to_string())),
    }
}

impl FromStr for Precision {
    type Err = InvalidPrecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
