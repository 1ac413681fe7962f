//! The data the core treats mostly opaquely: log records and session
//! metadata.
//!
//! The logging-call frontend (formatters, variadic entry points,
//! severity-tagging conveniences) is out of scope; this module
//! only defines the data shapes the frontend hands to the `Coordinator`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Importance level of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

/// Arbitrary string-keyed JSON-serializable fields, used for both session
/// metadata and per-record augmentation.
///
/// Keys beginning with `_` are reserved for fields the agent itself adds
/// (timestamp, thread id, user-info block output) and may be overwritten by
/// it.
pub type Fields = BTreeMap<String, Value>;

/// A structured log message supplied by the frontend.
///
/// The core treats this opaquely except to tag it with environment fields
/// and serialize it into a `Buffer`. Timestamp formatting and environment
/// metadata collection (OS, locale, hardware) are the frontend's job; this
/// struct carries only what the core itself produces or is handed verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unix epoch milliseconds when the record was created. Set by the
    /// Coordinator at ingress time, not by the frontend.
    pub timestamp_millis: u64,
    /// Free-form message text.
    pub message: String,
    /// Optional importance level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<LogSeverity>,
    /// Optional space-separated filter tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Opaque OS thread identifier, stringified (`std::thread::ThreadId` has
    /// no stable numeric representation across platforms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Arbitrary user-supplied fields, plus anything the `userInfoBlock`
    /// hook adds.
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub fields: Fields,
}

impl LogRecord {
    /// Construct a record with only the frontend-supplied fields; the
    /// Coordinator fills in `timestamp_millis`/`thread_id` at ingress.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp_millis: 0,
            message: message.into(),
            severity: None,
            tags: None,
            thread_id: None,
            fields: Fields::new(),
        }
    }

    pub fn with_severity(mut self, severity: LogSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }
}
