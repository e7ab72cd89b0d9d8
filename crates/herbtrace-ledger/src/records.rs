use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use herbtrace_types::{BatchId, EventKind};

/// Caller-supplied fields the ledger does not model. Kept verbatim.
pub type Extensions = BTreeMap<String, Value>;

/// One committed append to a batch's history.
///
/// Serialized as a flat JSON object:
///
/// ```json
/// {"type":"collection","batchId":"B1","timestamp":"2024-03-01T10:00:00.000Z",
///  "status":"pending","species":"Mint","quality":"A+"}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Always equal to the key the history is stored under.
    pub batch_id: BatchId,
    /// ISO-8601 commit time, assigned once from the agreed transaction time.
    pub timestamp: String,
    /// Progress label set by the writer.
    pub status: String,
    #[serde(flatten)]
    pub details: EventDetails,
}

/// Stage-specific attributes, tagged by the event's `type` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventDetails {
    Collection(CollectionDetails),
    Processing(ProcessingDetails),
    Quality(QualityDetails),
}

/// Attributes of a farmer's collection event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farm_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Username of the farmer who submitted the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farmer: Option<String>,
    #[serde(flatten)]
    pub extra: Extensions,
}

/// Attributes of a processing facility's event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_type: Option<String>,
    /// Username of the processor who submitted the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    #[serde(flatten)]
    pub extra: Extensions,
}

/// Attributes of a lab's quality test event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_manager_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_status: Option<String>,
    /// Username of the lab account that submitted the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
    #[serde(flatten)]
    pub extra: Extensions,
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Collection(_) => EventKind::Collection,
            Self::Processing(_) => EventKind::Processing,
            Self::Quality(_) => EventKind::Quality,
        }
    }

    /// Fields carried through without interpretation.
    pub fn extra(&self) -> &Extensions {
        match self {
            Self::Collection(d) => &d.extra,
            Self::Processing(d) => &d.extra,
            Self::Quality(d) => &d.extra,
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }

    pub fn is(&self, kind: EventKind) -> bool {
        self.kind() == kind
    }

    pub fn as_collection(&self) -> Option<&CollectionDetails> {
        match &self.details {
            EventDetails::Collection(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_processing(&self) -> Option<&ProcessingDetails> {
        match &self.details {
            EventDetails::Processing(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_quality(&self) -> Option<&QualityDetails> {
        match &self.details {
            EventDetails::Quality(d) => Some(d),
            _ => None,
        }
    }

    /// Username of the account that submitted the event.
    pub fn actor(&self) -> Option<&str> {
        match &self.details {
            EventDetails::Collection(d) => d.farmer.as_deref(),
            EventDetails::Processing(d) => d.processor.as_deref(),
            EventDetails::Quality(d) => d.lab.as_deref(),
        }
    }

    /// Off-chain evidence: the collection photo or the lab report.
    pub fn evidence_link(&self) -> Option<&str> {
        let key = match self.kind() {
            EventKind::Collection => "imageLink",
            EventKind::Quality => "ipfsLink",
            EventKind::Processing => return None,
        };
        self.details
            .extra()
            .get(key)
            .and_then(Value::as_str)
            .filter(|link| !link.is_empty())
    }

    /// Raw extension value by name.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.details.extra().get(key)
    }
}

/// One entry of the all-batches read: a key and the history stored under it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Record")]
    pub record: Vec<Event>,
}

impl BatchRecord {
    /// First event of the given type; earlier entries win ties.
    pub fn first(&self, kind: EventKind) -> Option<&Event> {
        self.record.iter().find(|e| e.is(kind))
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.first(kind).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_json_parses_into_tagged_details() {
        let event: Event = serde_json::from_value(json!({
            "type": "collection",
            "batchId": "B1",
            "timestamp": "2024-03-01T10:00:00.000Z",
            "status": "pending",
            "species": "Mint",
            "quality": "A+",
            "lat": 12.5,
            "long": 77.25,
            "imageLink": "https://example.org/ipfs/abc"
        }))
        .unwrap();

        assert_eq!(event.kind(), EventKind::Collection);
        let details = event.as_collection().unwrap();
        assert_eq!(details.species.as_deref(), Some("Mint"));
        assert_eq!(details.extra.get("lat"), Some(&json!(12.5)));
        assert_eq!(event.evidence_link(), Some("https://example.org/ipfs/abc"));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let input = json!({
            "type": "quality",
            "batchId": "B1",
            "timestamp": "2024-03-01T10:00:00.000Z",
            "status": "tested",
            "labName": "Green Lab",
            "resultStatus": "PASS",
            "ipfsLink": null,
            "certificate": {"issuer": "AYUSH", "grade": 3},
            "tags": ["organic", "wild"]
        });
        let event: Event = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&event).unwrap(), input);
        assert_eq!(event.evidence_link(), None);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_value::<Event>(json!({
            "type": "shipping",
            "batchId": "B1",
            "timestamp": "2024-03-01T10:00:00.000Z",
            "status": "moving"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn batch_record_first_match_wins() {
        let record: BatchRecord = serde_json::from_value(json!({
            "Key": "B1",
            "Record": [
                {"type": "collection", "batchId": "B1", "timestamp": "t", "status": "pending", "species": "Mint"},
                {"type": "collection", "batchId": "B1", "timestamp": "t", "status": "pending", "species": "Basil"}
            ]
        }))
        .unwrap();
        let head = record.first(EventKind::Collection).unwrap();
        assert_eq!(head.as_collection().unwrap().species.as_deref(), Some("Mint"));
        assert!(!record.has(EventKind::Processing));
    }
}
