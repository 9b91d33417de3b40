//! Check log recording
//!
//! Every upgrade run collects one entry per resource or entity it touched and
//! persists them together as a single batch.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::EngineError;

pub mod store;

pub const SUCCESS: &str = "success";
pub const FAILED_PREFIX: &str = "failed: ";

/// Outcome of one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLog {
    pub content: String,
    pub result: String,
}

impl CheckLog {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            result: SUCCESS.to_string(),
        }
    }

    pub fn failed(content: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            content: content.into(),
            result: format!("{}{}", FAILED_PREFIX, message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == SUCCESS
    }
}

/// Persisted summary of one upgrade run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLogBatch {
    pub begin_check_date: DateTime<Utc>,
    pub end_check_date: DateTime<Utc>,
    /// JSON array of [`CheckLog`] entries
    pub log: String,
}

impl CheckLogBatch {
    /// Decode the serialized entries
    pub fn entries(&self) -> Result<Vec<CheckLog>, EngineError> {
        Ok(serde_json::from_str(&self.log)?)
    }
}

/// Append-only, clonable sink for check log entries
#[derive(Debug, Clone, Default)]
pub struct CheckLogRecorder {
    entries: Arc<Mutex<Vec<CheckLog>>>,
}

impl CheckLogRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: CheckLog) {
        info!(content = %entry.content, result = %entry.result, "check log");
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    pub fn success(&self, content: impl Into<String>) {
        self.record(CheckLog::success(content));
    }

    pub fn failed(&self, content: impl Into<String>, message: impl std::fmt::Display) {
        self.record(CheckLog::failed(content, message));
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<CheckLog> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the recorded entries into a batch
    pub fn into_batch(
        &self,
        begin_check_date: DateTime<Utc>,
        end_check_date: DateTime<Utc>,
    ) -> Result<CheckLogBatch, EngineError> {
        let log = serde_json::to_string(&self.snapshot())?;
        Ok(CheckLogBatch {
            begin_check_date,
            end_check_date,
            log,
        })
    }
}
