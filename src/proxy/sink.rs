//! Diagnostic sink abstraction
//!
//! Diagnostic records are pushed through an injected sink rather than a
//! process-global logger so test harnesses can capture output directly.
//! Every field of a [`DiagnosticRecord`] is redacted *before* it reaches a
//! sink; implementations may write it anywhere without further scrubbing.

use std::fmt;

/// Which side of the exchange a record describes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Response => f.write_str("response"),
        }
    }
}

/// A single captured request or response, already redacted
#[derive(Clone, Debug)]
pub struct DiagnosticRecord {
    pub direction: Direction,
    pub method: String,
    pub uri: String,
    /// Response status; `None` for request records
    pub status: Option<u16>,
    pub headers: String,
    pub body: String,
    /// Body snippet was cut off at the capture limit
    pub truncated: bool,
}

/// Destination for diagnostic records
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, record: DiagnosticRecord);
}

/// Default sink that emits records as structured tracing events
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, record: DiagnosticRecord) {
        tracing::info!(
            direction = %record.direction,
            method = %record.method,
            uri = %record.uri,
            status = record.status,
            truncated = record.truncated,
            headers = %record.headers,
            body_snippet = %record.body,
            "diagnostic capture"
        );
    }
}

/// In-memory sink for assertions in tests
#[cfg(test)]
pub struct MemorySink {
    records: parking_lot::Mutex<Vec<DiagnosticRecord>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().clone()
    }
}

#[cfg(test)]
impl DiagnosticSink for MemorySink {
    fn record(&self, record: DiagnosticRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(direction: Direction) -> DiagnosticRecord {
        DiagnosticRecord {
            direction,
            method: "GET".to_string(),
            uri: "https://api.example.com/x".to_string(),
            status: Some(200),
            headers: String::new(),
            body: String::new(),
            truncated: false,
        }
    }

    #[test]
    fn memory_sink_collects_records() {
        let sink = Arc::new(MemorySink::new());
        sink.record(sample(Direction::Request));
        sink.record(sample(Direction::Response));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].direction, Direction::Request);
        assert_eq!(records[1].direction, Direction::Response);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Request.to_string(), "request");
        assert_eq!(Direction::Response.to_string(), "response");
    }
}
