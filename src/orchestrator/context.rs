//! Per-query context store
//!
//! Accumulates the write-once Result Record of every executed step plus a
//! small cache of resolved entities. One store per query; nothing here is
//! shared across queries and nothing survives the query's lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::orchestrator::plan::StepStatus;

/// Failure classification for a failed step
///
/// The three tool-facing kinds mirror the tool envelope;
/// `unresolved-reference` is produced by the invoker itself when a step
/// references an output that does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Caller-side malformed or unmatched parameters
    ValidationError,
    /// The tool itself failed (transport, 5xx, rate limit)
    ToolError,
    /// The invocation deadline elapsed
    Timeout,
    /// A referenced prior step has no usable output
    UnresolvedReference,
}

/// Error descriptor attached to a failed Result Record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

/// The write-once outcome of executing one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Terminal status: succeeded or failed
    pub status: StepStatus,
    /// Tool payload; `None` for failures and for empty successes
    pub payload: Option<Value>,
    /// Failure detail; `None` on success
    pub error: Option<ErrorDescriptor>,
    /// Wall-clock time the record was written
    pub recorded_at: DateTime<Utc>,
}

impl ResultRecord {
    /// A succeeded record with the given payload
    pub fn succeeded(payload: Option<Value>) -> Self {
        Self {
            status: StepStatus::Succeeded,
            payload,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    /// A failed record with a classified error
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            payload: None,
            error: Some(ErrorDescriptor {
                kind,
                message: message.into(),
            }),
            recorded_at: Utc::now(),
        }
    }

    /// Whether this record succeeded but carries no usable data
    ///
    /// Null, empty strings, and empty collections all count as empty;
    /// the decision procedure treats such a success as "the data is not
    /// there", distinct from any tool failure.
    pub fn has_empty_payload(&self) -> bool {
        match &self.payload {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }
}

/// A resolved company identity, cached for the life of the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    /// Company name
    pub name: String,
    /// SEC Central Index Key
    pub cik: String,
    /// Exchange ticker, if listed
    #[serde(default)]
    pub ticker: Option<String>,
    /// Listing exchange, if known
    #[serde(default)]
    pub exchange: Option<String>,
}

impl ResolvedEntity {
    /// Extract an entity from a resolution tool payload, if it has one
    pub fn from_payload(payload: &Value) -> Option<Self> {
        serde_json::from_value(payload.clone()).ok()
    }
}

/// Write-once violation or unresolvable reference
#[derive(Error, Debug, PartialEq)]
pub enum ContextError {
    /// A terminal record already exists at this position
    #[error("position {0} already has a terminal result record")]
    AlreadyRecorded(usize),
}

/// Failure to resolve a step-output reference into a concrete value
#[derive(Error, Debug, PartialEq)]
pub enum ReferenceError {
    /// No record exists at the referenced position
    #[error("step {0} has no recorded result")]
    Missing(usize),
    /// The referenced step did not succeed
    #[error("step {0} did not succeed")]
    NotSucceeded(usize),
    /// The referenced payload has no such field
    #[error("step {0} result has no field '{1}'")]
    MissingField(usize, String),
    /// The referenced payload is empty
    #[error("step {0} produced an empty payload")]
    EmptyPayload(usize),
}

/// Per-query accumulator of Result Records and resolved entities
#[derive(Debug, Default)]
pub struct ContextStore {
    records: BTreeMap<usize, ResultRecord>,
    entities: HashMap<String, ResolvedEntity>,
}

impl ContextStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the record for a step position
    ///
    /// Records are write-once: writing to a position that already holds a
    /// terminal record is a programming fault and is rejected, never
    /// silently overwritten.
    pub fn record(&mut self, position: usize, record: ResultRecord) -> Result<(), ContextError> {
        if self.records.contains_key(&position) {
            return Err(ContextError::AlreadyRecorded(position));
        }
        self.records.insert(position, record);
        Ok(())
    }

    /// The record at a position, if any
    pub fn get(&self, position: usize) -> Option<&ResultRecord> {
        self.records.get(&position)
    }

    /// Number of recorded steps
    #[allow(dead_code)] // Used by library callers
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded yet
    #[allow(dead_code)] // Paired with len()
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ordered iterator over (position, record)
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ResultRecord)> {
        self.records.iter().map(|(pos, record)| (*pos, record))
    }

    /// Resolve a step-output reference to a concrete string value
    ///
    /// With a `field`, the named key is looked up in the payload object;
    /// without one, a string payload is used as-is and any other payload
    /// is rendered as compact JSON.
    pub fn resolve_output(
        &self,
        position: usize,
        field: Option<&str>,
    ) -> Result<String, ReferenceError> {
        let record = self
            .records
            .get(&position)
            .ok_or(ReferenceError::Missing(position))?;
        if record.status != StepStatus::Succeeded {
            return Err(ReferenceError::NotSucceeded(position));
        }
        let payload = record
            .payload
            .as_ref()
            .filter(|p| !p.is_null())
            .ok_or(ReferenceError::EmptyPayload(position))?;

        match field {
            Some(name) => {
                let value = payload
                    .get(name)
                    .ok_or_else(|| ReferenceError::MissingField(position, name.to_string()))?;
                Ok(json_as_text(value))
            }
            None => Ok(json_as_text(payload)),
        }
    }

    /// A cached entity by the identifier string used in the query
    pub fn entity(&self, identifier: &str) -> Option<&ResolvedEntity> {
        self.entities.get(identifier)
    }

    /// Cache a resolved entity under its identifier string
    ///
    /// Repeated resolutions of the same identifier in one query reuse
    /// this entry instead of re-invoking the resolution tool.
    pub fn cache_entity(&mut self, identifier: impl Into<String>, entity: ResolvedEntity) {
        self.entities.insert(identifier.into(), entity);
    }

    /// Compact per-step summaries of succeeded results, for replanning
    ///
    /// Payloads are truncated so the planning prompt stays bounded.
    pub fn succeeded_summaries(&self, max_payload_chars: usize) -> Vec<(usize, String)> {
        self.records
            .iter()
            .filter(|(_, record)| record.status == StepStatus::Succeeded)
            .map(|(pos, record)| {
                let text = record
                    .payload
                    .as_ref()
                    .map(json_as_text)
                    .unwrap_or_else(|| "(empty)".to_string());
                let truncated: String = text.chars().take(max_payload_chars).collect();
                (*pos, truncated)
            })
            .collect()
    }
}

/// Render a JSON value as plain text for substitution into parameters
fn json_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_is_write_once() {
        let mut store = ContextStore::new();
        store
            .record(1, ResultRecord::succeeded(Some(json!("data"))))
            .unwrap();

        let second = store.record(1, ResultRecord::failed(FailureKind::ToolError, "boom"));
        assert_eq!(second, Err(ContextError::AlreadyRecorded(1)));

        // The original record is untouched
        let record = store.get(1).unwrap();
        assert_eq!(record.status, StepStatus::Succeeded);
        assert_eq!(record.payload, Some(json!("data")));
    }

    #[test]
    fn test_resolve_output_whole_payload() {
        let mut store = ContextStore::new();
        store
            .record(1, ResultRecord::succeeded(Some(json!("section text"))))
            .unwrap();
        assert_eq!(store.resolve_output(1, None).unwrap(), "section text");
    }

    #[test]
    fn test_resolve_output_field() {
        let mut store = ContextStore::new();
        store
            .record(
                2,
                ResultRecord::succeeded(Some(json!({"cik": "0000320193", "name": "Apple Inc."}))),
            )
            .unwrap();
        assert_eq!(store.resolve_output(2, Some("cik")).unwrap(), "0000320193");
        assert_eq!(
            store.resolve_output(2, Some("sic")),
            Err(ReferenceError::MissingField(2, "sic".to_string()))
        );
    }

    #[test]
    fn test_resolve_output_missing_step() {
        let store = ContextStore::new();
        assert_eq!(store.resolve_output(7, None), Err(ReferenceError::Missing(7)));
    }

    #[test]
    fn test_resolve_output_failed_step() {
        let mut store = ContextStore::new();
        store
            .record(1, ResultRecord::failed(FailureKind::Timeout, "deadline"))
            .unwrap();
        assert_eq!(
            store.resolve_output(1, None),
            Err(ReferenceError::NotSucceeded(1))
        );
    }

    #[test]
    fn test_empty_payload_detection() {
        assert!(ResultRecord::succeeded(None).has_empty_payload());
        assert!(ResultRecord::succeeded(Some(json!(null))).has_empty_payload());
        assert!(ResultRecord::succeeded(Some(json!(""))).has_empty_payload());
        assert!(ResultRecord::succeeded(Some(json!([]))).has_empty_payload());
        assert!(ResultRecord::succeeded(Some(json!({}))).has_empty_payload());
        assert!(!ResultRecord::succeeded(Some(json!("text"))).has_empty_payload());
        assert!(!ResultRecord::succeeded(Some(json!({"a": 1}))).has_empty_payload());
    }

    #[test]
    fn test_entity_cache() {
        let mut store = ContextStore::new();
        assert!(store.entity("AAPL").is_none());

        store.cache_entity(
            "AAPL",
            ResolvedEntity {
                name: "Apple Inc.".to_string(),
                cik: "0000320193".to_string(),
                ticker: Some("AAPL".to_string()),
                exchange: Some("NASDAQ".to_string()),
            },
        );

        let entity = store.entity("AAPL").unwrap();
        assert_eq!(entity.cik, "0000320193");
    }

    #[test]
    fn test_entity_from_payload() {
        let payload = json!({"name": "Tesla, Inc.", "cik": "0001318605", "ticker": "TSLA"});
        let entity = ResolvedEntity::from_payload(&payload).unwrap();
        assert_eq!(entity.name, "Tesla, Inc.");
        assert_eq!(entity.exchange, None);
    }

    #[test]
    fn test_succeeded_summaries_skip_failures() {
        let mut store = ContextStore::new();
        store
            .record(1, ResultRecord::succeeded(Some(json!({"cik": "123"}))))
            .unwrap();
        store
            .record(2, ResultRecord::failed(FailureKind::ToolError, "down"))
            .unwrap();

        let summaries = store.succeeded_summaries(100);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].0, 1);
        assert!(summaries[0].1.contains("cik"));
    }
}
