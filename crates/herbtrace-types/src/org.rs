use std::fmt;

use serde::{Deserialize, Serialize};

/// Organizational credential (membership service provider id) a caller
/// presents, e.g. `Org1MSP`.
///
/// The ledger never interprets it beyond equality with the configured
/// organization ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if `credential` names this organization.
    pub fn matches(&self, credential: &str) -> bool {
        self.0 == credential
    }
}

impl From<&str> for OrgId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Debug for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrgId({})", self.0)
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_is_exact() {
        let org = OrgId::new("Org1MSP");
        assert!(org.matches("Org1MSP"));
        assert!(!org.matches("org1msp"));
        assert!(!org.matches("Org1MSP "));
    }
}
