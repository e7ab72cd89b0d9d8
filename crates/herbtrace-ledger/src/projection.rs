use serde::Serialize;
use serde_json::Value;

use herbtrace_types::EventKind;

use crate::records::{BatchRecord, Event, EventDetails};

/// Row of the processing dashboard: a collected batch nobody has processed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingProcessing {
    pub batch_id: String,
    pub species: Option<String>,
    pub quality: Option<String>,
    pub status: String,
}

/// Row of the testing dashboard: a processed batch without a lab result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTesting {
    pub batch_id: String,
    pub species: Option<String>,
    pub status: String,
    pub processor: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub long: f64,
}

/// One stop on the custody route map.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetailLine {
    pub label: &'static str,
    pub value: String,
}

/// One event as a consumer sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProvenanceEntry {
    pub kind: EventKind,
    pub title: &'static str,
    pub timestamp: String,
    pub status: String,
    pub actor: Option<String>,
    pub details: Vec<DetailLine>,
    pub evidence: Option<String>,
    pub location: Option<GeoPoint>,
}

/// Consumer-facing provenance of one batch, in append order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceView {
    pub batch_id: String,
    pub entries: Vec<ProvenanceEntry>,
    /// Markers for the geo-tagged entries, in the same order.
    pub route: Vec<MapMarker>,
}

/// Deterministic read-side projections over committed histories.
pub struct ProjectionBuilder;

impl ProjectionBuilder {
    /// Batches that have been collected but not yet processed.
    pub fn pending_processing(records: &[BatchRecord]) -> Vec<PendingProcessing> {
        records
            .iter()
            .filter(|r| !r.has(EventKind::Processing))
            .filter_map(|r| {
                let head = r.first(EventKind::Collection)?;
                let collection = head.as_collection()?;
                Some(PendingProcessing {
                    batch_id: r.key.clone(),
                    species: collection.species.clone(),
                    quality: collection.quality.clone(),
                    status: head.status.clone(),
                })
            })
            .collect()
    }

    /// Batches that have been processed but not yet tested.
    pub fn pending_testing(records: &[BatchRecord]) -> Vec<PendingTesting> {
        records
            .iter()
            .filter(|r| !r.has(EventKind::Quality))
            .filter_map(|r| {
                let processed = r.first(EventKind::Processing)?;
                let species = r
                    .first(EventKind::Collection)
                    .and_then(Event::as_collection)
                    .and_then(|c| c.species.clone());
                Some(PendingTesting {
                    batch_id: r.key.clone(),
                    species,
                    status: processed.status.clone(),
                    processor: processed.actor().map(str::to_string),
                })
            })
            .collect()
    }

    pub fn provenance(batch_id: &str, history: &[Event]) -> ProvenanceView {
        let entries: Vec<ProvenanceEntry> = history.iter().map(entry).collect();
        let route = entries
            .iter()
            .filter_map(|e| {
                let point = e.location?;
                let label = match &e.actor {
                    Some(who) => format!("{} - {who}", e.title),
                    None => e.title.to_string(),
                };
                Some(MapMarker {
                    lat: point.lat,
                    lng: point.long,
                    label,
                })
            })
            .collect();

        ProvenanceView {
            batch_id: batch_id.to_string(),
            entries,
            route,
        }
    }
}

fn entry(event: &Event) -> ProvenanceEntry {
    let kind = event.kind();
    ProvenanceEntry {
        kind,
        title: kind.title(),
        timestamp: event.timestamp.clone(),
        status: event.status.clone(),
        actor: event.actor().map(str::to_string),
        details: detail_lines(&event.details),
        evidence: event.evidence_link().map(str::to_string),
        location: geo_point(event),
    }
}

fn detail_lines(details: &EventDetails) -> Vec<DetailLine> {
    let fields: Vec<(&'static str, &Option<String>)> = match details {
        EventDetails::Collection(d) => vec![
            ("Species", &d.species),
            ("Quality", &d.quality),
            ("Collector", &d.collector),
            ("Farm", &d.farm_location),
        ],
        EventDetails::Processing(d) => vec![
            ("Facility", &d.facility),
            ("Location", &d.facility_location),
            ("Manager", &d.manager_name),
            ("Process", &d.process_type),
        ],
        EventDetails::Quality(d) => vec![
            ("Lab", &d.lab_name),
            ("Location", &d.lab_location),
            ("Manager", &d.lab_manager_name),
            ("Result", &d.result_status),
        ],
    };
    fields
        .into_iter()
        .filter_map(|(label, value)| {
            value.as_ref().map(|v| DetailLine {
                label,
                value: v.clone(),
            })
        })
        .collect()
}

fn geo_point(event: &Event) -> Option<GeoPoint> {
    let lat = coordinate(event.extra("lat")?)?;
    let long = coordinate(event.extra("long")?)?;
    Some(GeoPoint { lat, long })
}

/// A finite number, given as a JSON number or a numeric string.
fn coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(key: &str, events: Value) -> BatchRecord {
        serde_json::from_value(json!({ "Key": key, "Record": events })).unwrap()
    }

    fn collection(key: &str, species: &str, status: &str) -> Value {
        json!({
            "type": "collection", "batchId": key, "timestamp": "2024-03-01T10:00:00.000Z",
            "status": status, "species": species, "quality": "A+", "farmer": "ravi"
        })
    }

    fn processing(key: &str, processor: &str) -> Value {
        json!({
            "type": "processing", "batchId": key, "timestamp": "2024-03-01T11:00:00.000Z",
            "status": "processed", "processType": "Drying", "processor": processor
        })
    }

    fn quality(key: &str) -> Value {
        json!({
            "type": "quality", "batchId": key, "timestamp": "2024-03-01T12:00:00.000Z",
            "status": "tested", "labName": "Green Lab", "resultStatus": "PASS"
        })
    }

    #[test]
    fn pending_processing_lists_only_unprocessed_batches() {
        let records = vec![
            record("B1", json!([collection("B1", "Mint", "pending")])),
            record(
                "B-other",
                json!([collection("B-other", "Basil", "processed"), processing("B-other", "mill")]),
            ),
        ];
        let pending = ProjectionBuilder::pending_processing(&records);
        assert_eq!(
            pending,
            vec![PendingProcessing {
                batch_id: "B1".into(),
                species: Some("Mint".into()),
                quality: Some("A+".into()),
                status: "pending".into(),
            }]
        );
    }

    #[test]
    fn pending_testing_uses_first_processing_event() {
        let records = vec![
            record(
                "B1",
                json!([
                    collection("B1", "Mint", "processed"),
                    processing("B1", "mill-a"),
                    processing("B1", "mill-b")
                ]),
            ),
            record(
                "B2",
                json!([collection("B2", "Tulsi", "processed"), processing("B2", "mill"), quality("B2")]),
            ),
            record("B3", json!([collection("B3", "Neem", "pending")])),
        ];
        let pending = ProjectionBuilder::pending_testing(&records);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].batch_id, "B1");
        assert_eq!(pending[0].species.as_deref(), Some("Mint"));
        assert_eq!(pending[0].processor.as_deref(), Some("mill-a"));
        assert_eq!(pending[0].status, "processed");
    }

    #[test]
    fn pending_rows_serialize_camel_case() {
        let row = PendingTesting {
            batch_id: "B1".into(),
            species: None,
            status: "processed".into(),
            processor: Some("mill".into()),
        };
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"batchId": "B1", "species": null, "status": "processed", "processor": "mill"})
        );
    }

    #[test]
    fn provenance_titles_details_and_route() {
        let mut head = collection("B1", "Mint", "processed");
        head["lat"] = json!(12.97);
        head["long"] = json!("77.59");
        head["imageLink"] = json!("https://gateway/ipfs/photo");
        let mut lab = quality("B1");
        lab["lat"] = json!(13.0);
        lab["long"] = Value::Null;
        lab["ipfsLink"] = json!("ipfs://report");
        lab["lab"] = json!("greenlab");

        let history = record("B1", json!([head, processing("B1", "mill"), lab])).record;
        let view = ProjectionBuilder::provenance("B1", &history);

        let titles: Vec<_> = view.entries.iter().map(|e| e.title).collect();
        assert_eq!(titles, ["Collection", "Processing", "Lab Test"]);

        let first = &view.entries[0];
        assert_eq!(first.details[0], DetailLine { label: "Species", value: "Mint".into() });
        assert_eq!(first.evidence.as_deref(), Some("https://gateway/ipfs/photo"));
        assert_eq!(first.location, Some(GeoPoint { lat: 12.97, long: 77.59 }));

        assert_eq!(view.entries[1].actor.as_deref(), Some("mill"));
        assert_eq!(view.entries[1].location, None);
        assert_eq!(view.entries[2].evidence.as_deref(), Some("ipfs://report"));
        assert_eq!(view.entries[2].location, None);

        assert_eq!(
            view.route,
            vec![MapMarker { lat: 12.97, lng: 77.59, label: "Collection - ravi".into() }]
        );
    }

    #[test]
    fn non_numeric_coordinates_are_ignored() {
        let mut head = collection("B1", "Mint", "pending");
        head["lat"] = json!("north");
        head["long"] = json!(77.0);
        let history = record("B1", json!([head])).record;
        let view = ProjectionBuilder::provenance("B1", &history);
        assert_eq!(view.entries[0].location, None);
        assert!(view.route.is_empty());
    }
}
