//! Shared types for the OTLP ingress bridge.
//!
//! These are the only types that cross every module boundary: receivers
//! produce [`OTLPMessage`], the queue fabric stores it, and the source
//! driver turns it into a [`Record`].

use std::fmt;

pub mod error;

pub use error::IngressError;

/// One of the three OTLP telemetry kinds. Names are part of the external
/// contract: they appear verbatim in offset records and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKind {
    Traces,
    Metrics,
    Logs,
}

impl SignalKind {
    /// All three variants, in the fixed order `poll` drains them.
    pub const ALL: [SignalKind; 3] = [SignalKind::Traces, SignalKind::Metrics, SignalKind::Logs];

    /// The name used in offset records, metrics labels and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Traces => "TRACES",
            SignalKind::Metrics => "METRICS",
            SignalKind::Logs => "LOGS",
        }
    }

    /// Reverses [`Self::name`], for resolving the signal a persisted or
    /// in-flight offset record belongs to.
    pub fn from_name(name: &str) -> Option<SignalKind> {
        match name {
            "TRACES" => Some(SignalKind::Traces),
            "METRICS" => Some(SignalKind::Metrics),
            "LOGS" => Some(SignalKind::Logs),
            _ => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The payload encoding chosen for a run. Fixed at ingress start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    Json,
    Protobuf,
}

impl MessageFormat {
    pub fn value_type(&self) -> &'static str {
        "string"
    }
}

/// The unit handed from a receiver to a queue to a record.
///
/// Created by a receiver, owned by the queue while buffered, then owned by
/// the record until the caller's sink accepts it. No message is referenced
/// after commit.
#[derive(Debug, Clone)]
pub struct OTLPMessage {
    pub signal: SignalKind,
    /// UTF-8 JSON (default) or ASCII base64 of the protobuf wire form.
    pub payload: String,
    /// Monotonic milliseconds at ingest time.
    pub ingest_time: u64,
}

impl OTLPMessage {
    pub fn new(signal: SignalKind, payload: String, ingest_time: u64) -> Self {
        Self {
            signal,
            payload,
            ingest_time,
        }
    }
}

/// The stream identity used for offset bookkeeping: `{connector_name, signal_name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PartitionKey {
    pub connector_name: String,
    pub signal_name: String,
}

/// `{session_id, signal_name, sequence}` — the primary offset axis.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OffsetKey {
    pub session_id: String,
    pub signal_name: String,
    pub sequence: i64,
}

/// What the driver emits to the caller's sink per poll.
///
/// The physical stream partition and key are intentionally left unset —
/// that is the downstream integration's concern, not this core's.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub topic: String,
    pub value: String,
    pub value_type: &'static str,
    pub timestamp: u64,
    pub partition_key: PartitionKey,
    pub offset_key: OffsetKey,
}
