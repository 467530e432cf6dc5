//! Structured log entries recovered from program output.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use tsx_engine::LogMethod;

/// One recovered log line. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Opaque unique id
    pub id: String,
    pub content: String,
    /// 1-based source line of the originating console call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub method: LogMethod,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl LogEntry {
    pub fn new(method: LogMethod, content: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            line,
            method,
            timestamp: now_millis(),
        }
    }

    /// Synthetic entry for a failure outside the user program.
    pub fn system_error(message: impl std::fmt::Display) -> Self {
        Self::new(LogMethod::Error, format!("[Error] {}", message), None)
    }

    pub fn is_error(&self) -> bool {
        self.method == LogMethod::Error
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
