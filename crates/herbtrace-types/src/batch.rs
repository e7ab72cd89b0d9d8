use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque key a batch's event history is stored under.
///
/// A batch has no record of its own: everything known about it is the event
/// array committed under this key. Ids are compared byte-for-byte.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    /// Parse a batch id, rejecting empty keys and keys with surrounding
    /// whitespace (the store would treat `" B1"` and `"B1"` as distinct).
    pub fn parse(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.is_empty() || value.trim() != value {
            return Err(TypeError::InvalidBatchId(value));
        }
        Ok(Self(value))
    }

    /// Mint a fresh id of the form `BATCH-<base36 millis>-<base36 nonce>`.
    pub fn generate() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let nonce = rand::thread_rng().gen_range(1000..10_000);
        Self::from_parts(now_ms, nonce)
    }

    /// Deterministic form of [`Self::generate`].
    pub fn from_parts(millis: u64, nonce: u64) -> Self {
        Self(format!("BATCH-{}-{}", base36(millis), base36(nonce)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

impl TryFrom<String> for BatchId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<BatchId> for String {
    fn from(id: BatchId) -> Self {
        id.0
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchId({})", self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
