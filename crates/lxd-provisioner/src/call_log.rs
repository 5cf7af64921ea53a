//! Call logging sink for failed invocations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Record of one failed invocation, handed to the host's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallLogRecord {
    /// Unique id of the invocation
    pub request_id: Uuid,
    /// When the record was produced
    pub timestamp: DateTime<Utc>,
    /// Module name
    pub module: String,
    /// Action or dispatch function name
    pub action: String,
    /// Input parameters with secrets redacted
    pub input: BTreeMap<String, String>,
    /// Short outcome summary
    pub outcome: String,
    /// Full diagnostic trace
    pub trace: String,
}

impl CallLogRecord {
    /// Create a record stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        action: impl Into<String>,
        input: BTreeMap<String, String>,
        outcome: impl Into<String>,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            module: module.into(),
            action: action.into(),
            input,
            outcome: outcome.into(),
            trace: trace.into(),
        }
    }
}

/// Receiver of call log records.
///
/// Implementations must not fail back into the caller; anything that goes
/// wrong while recording is theirs to swallow.
pub trait CallLogger: Send + Sync {
    /// Record a call.
    fn log_call(&self, record: &CallLogRecord);
}

/// Emits records as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCallLogger;

impl CallLogger for TracingCallLogger {
    fn log_call(&self, record: &CallLogRecord) {
        let input = serde_json::to_string(&record.input).unwrap_or_default();
        warn!(
            request_id = %record.request_id,
            module = %record.module,
            action = %record.action,
            input = %input,
            outcome = %record.outcome,
            trace = %record.trace,
            "provisioning call failed"
        );
    }
}

/// Keeps records in memory; useful for hosts that collect them per request.
#[derive(Debug, Default)]
pub struct MemoryCallLogger {
    records: Mutex<Vec<CallLogRecord>>,
}

impl MemoryCallLogger {
    /// Create an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded entries.
    #[must_use]
    pub fn records(&self) -> Vec<CallLogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Remove and return the recorded entries.
    pub fn take(&self) -> Vec<CallLogRecord> {
        self.records
            .lock()
            .map(|mut records| std::mem::take(&mut *records))
            .unwrap_or_default()
    }
}

impl CallLogger for MemoryCallLogger {
    fn log_call(&self, record: &CallLogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(action: &str) -> CallLogRecord {
        let mut input = BTreeMap::new();
        input.insert("hostname".to_string(), "cloud1".to_string());
        CallLogRecord::new("lxd", action, input, "failed", "[TIMEOUT] action=suspend")
    }

    #[test]
    fn test_records_get_unique_ids() {
        assert_ne!(record("a").request_id, record("a").request_id);
    }

    #[test]
    fn test_memory_logger_collects_and_drains() {
        let logger = MemoryCallLogger::new();
        logger.log_call(&record("create_account"));
        logger.log_call(&record("suspend_account"));

        assert_eq!(logger.records().len(), 2);
        let taken = logger.take();
        assert_eq!(taken[1].action, "suspend_account");
        assert!(logger.records().is_empty());
    }

    #[test]
    fn test_record_serializes() {
        let value = serde_json::to_value(record("create_account")).unwrap();
        assert_eq!(value["module"], "lxd");
        assert_eq!(value["input"]["hostname"], "cloud1");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_tracing_logger_does_not_panic() {
        TracingCallLogger.log_call(&record("terminate_account"));
    }
}
