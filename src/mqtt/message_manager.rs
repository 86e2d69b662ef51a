use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::debug;

use super::wire::InboundMessage;

/// One message as it passed over the wire. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    topic: String,
    raw_payload: String,
    received_at: DateTime<Local>,
    retained: bool,
    parsed: Option<Value>,
}

impl LogEntry {
    /// Builds an entry, attaching the JSON parse of `raw_payload` when there is one.
    pub fn new(
        topic: impl Into<String>,
        raw_payload: impl Into<String>,
        retained: bool,
        received_at: DateTime<Local>,
    ) -> Self {
        let raw_payload = raw_payload.into();
        let parsed = serde_json::from_str::<Value>(&raw_payload).ok();
        LogEntry {
            topic: topic.into(),
            raw_payload,
            received_at,
            retained,
            parsed,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn raw_payload(&self) -> &str {
        &self.raw_payload
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    pub fn retained(&self) -> bool {
        self.retained
    }

    pub fn parsed(&self) -> Option<&Value> {
        self.parsed.as_ref()
    }

    /// Payload for display: pretty JSON when it parsed, the raw text otherwise.
    pub fn pretty_payload(&self) -> String {
        self.parsed
            .as_ref()
            .and_then(|value| serde_json::to_string_pretty(value).ok())
            .unwrap_or_else(|| self.raw_payload.clone())
    }
}

/// Append-only record of every arrival in the current session.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an arrival stamped `now`.
    ///
    /// Timestamps never go backwards within the log: if the wall clock stepped
    /// back since the previous arrival, the previous timestamp is reused.
    pub fn ingest(&mut self, message: InboundMessage, now: DateTime<Local>) -> &LogEntry {
        let received_at = match self.entries.last() {
            Some(last) if last.received_at > now => last.received_at,
            _ => now,
        };

        let entry = LogEntry::new(
            message.destination_name,
            message.payload_string,
            message.retained,
            received_at,
        );
        debug!(
            "Logged message on {} (retained: {}, json: {})",
            entry.topic,
            entry.retained,
            entry.parsed.is_some()
        );

        let index = self.entries.len();
        self.entries.push(entry);
        &self.entries[index]
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
