use serde::Serialize;

use herbtrace_types::{CommitInstant, EventKind};

use crate::records::{BatchRecord, Event};

/// Result of auditing one batch history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub batch_id: String,
    pub event_count: usize,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific problem found in a stored history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Position of the offending event; 0 for whole-history problems.
    pub index: usize,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    EmptyHistory,
    FirstEventNotCollection,
    BatchIdMismatch,
    InvalidTimestamp,
    TimestampRegression,
    CollectionStatusNotProcessed,
}

/// Read-only auditor for committed histories.
pub struct HistoryValidator;

impl HistoryValidator {
    pub fn validate(batch_id: &str, history: &[Event]) -> ValidationReport {
        let mut violations = Vec::new();

        match history.first() {
            None => violations.push(Violation {
                index: 0,
                kind: ViolationKind::EmptyHistory,
                description: "history holds no events".into(),
            }),
            Some(first) if !first.is(EventKind::Collection) => violations.push(Violation {
                index: 0,
                kind: ViolationKind::FirstEventNotCollection,
                description: format!("first event is {}, expected collection", first.kind()),
            }),
            Some(_) => {}
        }

        let processed = history.iter().any(|e| e.is(EventKind::Processing));
        let mut previous: Option<CommitInstant> = None;

        for (index, event) in history.iter().enumerate() {
            if event.batch_id.as_str() != batch_id {
                violations.push(Violation {
                    index,
                    kind: ViolationKind::BatchIdMismatch,
                    description: format!(
                        "event batchId {} differs from key {batch_id}",
                        event.batch_id
                    ),
                });
            }

            match CommitInstant::parse_iso8601(&event.timestamp) {
                Ok(instant) => {
                    if let Some(before) = previous {
                        if instant < before {
                            violations.push(Violation {
                                index,
                                kind: ViolationKind::TimestampRegression,
                                description: format!(
                                    "{} is earlier than preceding {before}",
                                    event.timestamp
                                ),
                            });
                        }
                    }
                    previous = Some(previous.map_or(instant, |before| before.max(instant)));
                }
                Err(err) => violations.push(Violation {
                    index,
                    kind: ViolationKind::InvalidTimestamp,
                    description: err.to_string(),
                }),
            }

            if processed && event.is(EventKind::Collection) && event.status != "processed" {
                violations.push(Violation {
                    index,
                    kind: ViolationKind::CollectionStatusNotProcessed,
                    description: format!(
                        "collection status is {:?} after processing",
                        event.status
                    ),
                });
            }
        }

        ValidationReport {
            batch_id: batch_id.to_string(),
            event_count: history.len(),
            violations,
        }
    }

    pub fn validate_all(records: &[BatchRecord]) -> Vec<ValidationReport> {
        records
            .iter()
            .map(|r| Self::validate(&r.key, &r.record))
            .collect()
    }
}
