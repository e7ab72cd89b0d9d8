use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, info, warn};

use herbtrace_types::{BatchId, CommitInstant, EventKind};

use crate::config::OrgTopology;
use crate::context::TransactionContext;
use crate::error::LedgerError;
use crate::records::{BatchRecord, Event};

/// Status every collection event takes once the batch is processed.
const PROCESSED_STATUS: &str = "processed";

/// Named operations callers can invoke with JSON text arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateBatch,
    ProcessBatch,
    AddLabTest,
    GetBatchHistory,
    GetAllBatches,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateBatch => "CreateBatch",
            Self::ProcessBatch => "ProcessBatch",
            Self::AddLabTest => "AddLabTest",
            Self::GetBatchHistory => "GetBatchHistory",
            Self::GetAllBatches => "GetAllBatches",
        }
    }

    /// `true` for operations that append to a history.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::CreateBatch | Self::ProcessBatch | Self::AddLabTest)
    }

    fn arity(&self) -> usize {
        match self {
            Self::CreateBatch | Self::ProcessBatch | Self::AddLabTest => 2,
            Self::GetBatchHistory => 1,
            Self::GetAllBatches => 0,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::CreateBatch,
            Self::ProcessBatch,
            Self::AddLabTest,
            Self::GetBatchHistory,
            Self::GetAllBatches,
        ]
        .into_iter()
        .find(|op| op.name() == s)
        .ok_or_else(|| LedgerError::UnknownOperation(s.to_string()))
    }
}

/// The batch provenance state machine.
///
/// Each write is one read-modify-write of a single batch key through the
/// transaction context: check the caller's organization, check whether the
/// batch exists, stamp the event with the agreed transaction time, and put
/// the whole updated history back. Nothing is written unless every check
/// passes.
#[derive(Clone, Debug, Default)]
pub struct TraceContract {
    orgs: OrgTopology,
}

impl TraceContract {
    pub fn new(orgs: OrgTopology) -> Self {
        Self { orgs }
    }

    pub fn orgs(&self) -> &OrgTopology {
        &self.orgs
    }

    /// Start a batch with its collection event. Farmers' organization only.
    pub fn create_batch<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        batch_id: &str,
        payload: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        self.append(ctx, EventKind::Collection, batch_id, payload)
    }

    /// Append a processing event and mark every collection event processed.
    pub fn process_batch<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        batch_id: &str,
        payload: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        self.append(ctx, EventKind::Processing, batch_id, payload)
    }

    /// Append a quality test event.
    pub fn add_lab_test<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        batch_id: &str,
        payload: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        self.append(ctx, EventKind::Quality, batch_id, payload)
    }

    /// The stored history JSON, exactly as committed. Readable by anyone.
    pub fn get_batch_history<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        batch_id: &str,
    ) -> Result<String, LedgerError> {
        let id = parse_batch_id(batch_id)?;
        let bytes = ctx
            .store()
            .get(id.as_str())?
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        String::from_utf8(bytes).map_err(|e| LedgerError::CorruptHistory {
            key: id.to_string(),
            reason: e.to_string(),
        })
    }

    /// The history decoded into events.
    pub fn history<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        batch_id: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        let raw = self.get_batch_history(ctx, batch_id)?;
        decode_history(batch_id, raw.as_bytes())
    }

    /// Every batch in the ledger, ordered by key.
    ///
    /// Entries whose stored value does not decode as a history are skipped.
    pub fn all_batches<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
    ) -> Result<Vec<BatchRecord>, LedgerError> {
        let mut records = Vec::new();
        for (key, bytes) in ctx.store().scan("")? {
            if bytes.is_empty() {
                continue;
            }
            match decode_history(&key, &bytes) {
                Ok(record) => records.push(BatchRecord { key, record }),
                Err(err) => warn!(key = %key, error = %err, "skipping undecodable batch record"),
            }
        }
        Ok(records)
    }

    /// `true` iff the key holds a non-empty history.
    pub fn batch_exists<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        batch_id: &str,
    ) -> Result<bool, LedgerError> {
        Ok(ctx.store().contains(batch_id)?)
    }

    /// Run an operation by name with JSON text arguments and a JSON text
    /// result.
    pub fn invoke<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        operation: Operation,
        args: &[&str],
    ) -> Result<String, LedgerError> {
        if args.len() != operation.arity() {
            return Err(LedgerError::MalformedPayload(format!(
                "{operation} expects {} argument(s), got {}",
                operation.arity(),
                args.len()
            )));
        }

        let history = match operation {
            Operation::CreateBatch => self.create_batch(ctx, args[0], args[1])?,
            Operation::ProcessBatch => self.process_batch(ctx, args[0], args[1])?,
            Operation::AddLabTest => self.add_lab_test(ctx, args[0], args[1])?,
            Operation::GetBatchHistory => return self.get_batch_history(ctx, args[0]),
            Operation::GetAllBatches => {
                let records = self.all_batches(ctx)?;
                return serde_json::to_string(&records)
                    .map_err(|e| LedgerError::Serialization(e.to_string()));
            }
        };
        serde_json::to_string(&history).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    fn append<C: TransactionContext + ?Sized>(
        &self,
        ctx: &C,
        kind: EventKind,
        batch_id: &str,
        payload: &str,
    ) -> Result<Vec<Event>, LedgerError> {
        let required = self.orgs.required_for(kind);
        let caller = ctx.caller_credential();
        if !required.matches(caller) {
            warn!(batch_id, %kind, caller, required = %required, "rejected unauthorized append");
            return Err(LedgerError::Unauthorized {
                action: format!("append {kind} events"),
                required: required.to_string(),
                caller: caller.to_string(),
            });
        }

        let id = parse_batch_id(batch_id)?;
        let exists = self.batch_exists(ctx, id.as_str())?;
        let mut history = match (kind, exists) {
            (EventKind::Collection, true) => return Err(LedgerError::AlreadyExists(id.to_string())),
            (EventKind::Collection, false) => Vec::new(),
            (_, false) => return Err(LedgerError::NotFound(id.to_string())),
            (_, true) => self.history(ctx, id.as_str())?,
        };

        let instant = ctx
            .transaction_time()
            .resolve()
            .map_err(LedgerError::Timestamp)?;
        if let Some(latest) = latest_instant(&history) {
            if latest > instant {
                warn!(batch_id = %id, %kind, %instant, %latest, "transaction time precedes history");
                return Err(LedgerError::Conflict(format!(
                    "transaction time {instant} precedes latest event {latest} of batch {id}"
                )));
            }
        }
        let event = build_event(&id, kind, payload, instant.to_iso8601())?;

        if kind == EventKind::Processing {
            for earlier in history.iter_mut().filter(|e| e.is(EventKind::Collection)) {
                earlier.status = PROCESSED_STATUS.to_string();
            }
        }
        history.push(event);

        let encoded =
            serde_json::to_vec(&history).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        ctx.store().put(id.as_str(), &encoded)?;

        info!(
            batch_id = %id,
            %kind,
            org = caller,
            events = history.len(),
            "appended batch event"
        );
        Ok(history)
    }
}

fn parse_batch_id(batch_id: &str) -> Result<BatchId, LedgerError> {
    BatchId::parse(batch_id).map_err(|_| LedgerError::InvalidBatchId(batch_id.to_string()))
}

/// Latest parseable event time in `history`.
fn latest_instant(history: &[Event]) -> Option<CommitInstant> {
    history
        .iter()
        .filter_map(|e| CommitInstant::parse_iso8601(&e.timestamp).ok())
        .max()
}

fn decode_history(key: &str, bytes: &[u8]) -> Result<Vec<Event>, LedgerError> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::CorruptHistory {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Turn caller JSON into an event of `kind` keyed to `id`.
///
/// The ledger owns `type`, `batchId`, and `timestamp`; `status` falls back
/// to the stage's conventional label. Every other field is kept as sent.
fn build_event(
    id: &BatchId,
    kind: EventKind,
    payload: &str,
    timestamp: String,
) -> Result<Event, LedgerError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| LedgerError::MalformedPayload(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(LedgerError::MalformedPayload(
            "event payload must be a JSON object".into(),
        ));
    };

    if let Some(declared) = fields.get("type").and_then(Value::as_str) {
        if declared != kind.as_str() {
            debug!(batch_id = %id, declared, %kind, "payload type overridden by operation");
        }
    }
    match fields.get("batchId") {
        None | Some(Value::Null) => {}
        Some(Value::String(declared)) if declared == id.as_str() => {}
        Some(other) => {
            return Err(LedgerError::MalformedPayload(format!(
                "payload batchId {other} does not match batch {id}"
            )));
        }
    }
    match fields.get("status") {
        Some(Value::String(_)) => {}
        None | Some(Value::Null) => {
            fields.insert("status".into(), kind.default_status().into());
        }
        Some(other) => {
            return Err(LedgerError::MalformedPayload(format!(
                "status must be a string, got {other}"
            )));
        }
    }

    fields.insert("type".into(), kind.as_str().into());
    fields.insert("batchId".into(), id.as_str().into());
    fields.insert("timestamp".into(), timestamp.into());

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| LedgerError::MalformedPayload(e.to_string()))
}
