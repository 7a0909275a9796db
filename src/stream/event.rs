// src/stream/event.rs

//! Wire shape of the remote job's event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventKind {
    Log,
    Status,
    Progress,
    Complete,
    Error,
    /// Any type this crate does not know; kept in the log only.
    #[serde(other)]
    Unknown,
}

/// One event from the remote job. Immutable once received.
///
/// ```json
/// {"type":"progress","timestamp":"2026-05-01T10:00:00Z","data":{"progress":40}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: LogEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LogEvent {
    pub fn new(kind: LogEventKind, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            message,
            data,
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Log, Some(message.into()), None)
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Status, Some(message.into()), None)
    }

    pub fn progress(value: f64) -> Self {
        Self::new(LogEventKind::Progress, None, Some(json!({ "progress": value })))
    }

    pub fn complete(result: Option<Value>) -> Self {
        Self::new(LogEventKind::Complete, None, result)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Error, Some(message.into()), None)
    }

    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, LogEventKind::Complete | LogEventKind::Error)
    }

    /// Numeric progress carried by a `progress` event.
    ///
    /// Looks at `data.progress`, then a bare numeric `data`, then a numeric
    /// message such as `"40"` or `"40%"`.
    pub fn progress_value(&self) -> Option<f64> {
        let from_data = match &self.data {
            Some(Value::Object(map)) => map.get("progress").and_then(Value::as_f64),
            Some(value) => value.as_f64(),
            None => None,
        };

        from_data.or_else(|| {
            self.message
                .as_deref()
                .map(|m| m.trim().trim_end_matches('%'))
                .and_then(|m| m.parse::<f64>().ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_type_is_kept() {
        let event: LogEvent =
            serde_json::from_str(r#"{"type":"heartbeat","timestamp":"2026-05-01T10:00:00Z"}"#)
                .unwrap();

        assert_eq!(event.kind, LogEventKind::Unknown);
        assert!(!event.is_terminal());
    }

    #[test]
    fn progress_is_read_from_data_or_message() {
        assert_eq!(LogEvent::progress(40.0).progress_value(), Some(40.0));

        let bare = LogEvent::new(LogEventKind::Progress, None, Some(json!(12)));
        assert_eq!(bare.progress_value(), Some(12.0));

        let text = LogEvent::new(LogEventKind::Progress, Some("75%".to_string()), None);
        assert_eq!(text.progress_value(), Some(75.0));

        let none = LogEvent::new(LogEventKind::Progress, Some("halfway".to_string()), None);
        assert_eq!(none.progress_value(), None);
    }
}
