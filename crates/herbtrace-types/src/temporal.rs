use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Earliest renderable instant: `0001-01-01T00:00:00Z`.
const MIN_UNIX_SECONDS: i64 = -62_135_596_800;
/// Latest renderable instant: `9999-12-31T23:59:59Z`.
const MAX_UNIX_SECONDS: i64 = 253_402_300_799;

/// Whole seconds since the UNIX epoch, in either of the shapes a commit log
/// client may hand them over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpochSeconds {
    /// A plain integer.
    Raw(i64),
    /// A 64-bit integer split into two 32-bit halves.
    Long {
        low: i32,
        high: i32,
        #[serde(default)]
        unsigned: bool,
    },
}

impl EpochSeconds {
    /// Split `seconds` into the two-halves form.
    pub fn long(seconds: i64) -> Self {
        Self::Long {
            low: seconds as i32,
            high: (seconds >> 32) as i32,
            unsigned: false,
        }
    }

    /// The integer value, whichever shape carried it.
    pub fn value(&self) -> Result<i64, TypeError> {
        match *self {
            Self::Raw(seconds) => Ok(seconds),
            Self::Long {
                low,
                high,
                unsigned: false,
            } => Ok((i64::from(high) << 32) | i64::from(low as u32)),
            Self::Long {
                low,
                high,
                unsigned: true,
            } => {
                let bits = (u64::from(high as u32) << 32) | u64::from(low as u32);
                i64::try_from(bits).map_err(|_| TypeError::TimestampOutOfRange(i128::from(bits)))
            }
        }
    }
}

/// Agreed transaction time supplied by the commit log for one transaction.
///
/// Sub-second precision is discarded during resolution, so a replica that
/// only sees the `seconds` component derives the same instant as one that
/// sees the full record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxTimestamp {
    /// Bare seconds value.
    Seconds(EpochSeconds),
    /// `{ seconds, nanos }` record.
    Record {
        seconds: EpochSeconds,
        #[serde(default)]
        nanos: i32,
    },
}

impl TxTimestamp {
    pub fn from_unix_seconds(seconds: i64) -> Self {
        Self::Seconds(EpochSeconds::Raw(seconds))
    }

    pub fn record(seconds: EpochSeconds, nanos: i32) -> Self {
        Self::Record { seconds, nanos }
    }

    /// Normalize any representation to the canonical commit instant.
    pub fn resolve(&self) -> Result<CommitInstant, TypeError> {
        let seconds = match self {
            Self::Seconds(seconds) => seconds,
            Self::Record { seconds, .. } => seconds,
        };
        CommitInstant::from_unix_seconds(seconds.value()?)
    }

    /// Resolve and render as the ISO-8601 string stored on events.
    pub fn to_iso8601(&self) -> Result<String, TypeError> {
        Ok(self.resolve()?.to_iso8601())
    }
}

/// Canonical commit instant, whole seconds in UTC.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitInstant(DateTime<Utc>);

impl CommitInstant {
    pub fn from_unix_seconds(seconds: i64) -> Result<Self, TypeError> {
        if !(MIN_UNIX_SECONDS..=MAX_UNIX_SECONDS).contains(&seconds) {
            return Err(TypeError::TimestampOutOfRange(i128::from(seconds)));
        }
        DateTime::from_timestamp(seconds, 0)
            .map(Self)
            .ok_or(TypeError::TimestampOutOfRange(i128::from(seconds)))
    }

    /// Parse a stored event timestamp back into an instant.
    pub fn parse_iso8601(value: &str) -> Result<Self, TypeError> {
        let parsed = DateTime::parse_from_rfc3339(value).map_err(|e| {
            TypeError::InvalidTimestamp {
                value: value.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self(parsed.with_timezone(&Utc)))
    }

    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Debug for CommitInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitInstant({})", self.to_iso8601())
    }
}

impl fmt::Display for CommitInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}
