use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Custody stage an event records.
///
/// The set is closed: a batch is collected by a farmer, processed by a
/// facility, and quality-tested by a lab. Each stage has a conventional
/// status label its writer sets when the payload does not carry one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Collection,
    Processing,
    Quality,
}

impl EventKind {
    pub const ALL: [Self; 3] = [Self::Collection, Self::Processing, Self::Quality];

    /// Wire name, as stored in the event's `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Processing => "processing",
            Self::Quality => "quality",
        }
    }

    /// Status label written when the caller supplies none.
    pub fn default_status(&self) -> &'static str {
        match self {
            Self::Collection => "pending",
            Self::Processing => "processed",
            Self::Quality => "tested",
        }
    }

    /// Human-facing stage title for consumer views.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Collection => "Collection",
            Self::Processing => "Processing",
            Self::Quality => "Lab Test",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TypeError::UnknownEventKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert_eq!(
            "shipping".parse::<EventKind>().unwrap_err(),
            TypeError::UnknownEventKind("shipping".into())
        );
    }

    #[test]
    fn default_status_labels() {
        assert_eq!(EventKind::Collection.default_status(), "pending");
        assert_eq!(EventKind::Processing.default_status(), "processed");
        assert_eq!(EventKind::Quality.default_status(), "tested");
        assert_eq!(EventKind::Quality.title(), "Lab Test");
    }
}
