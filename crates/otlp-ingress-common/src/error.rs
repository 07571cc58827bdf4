//! The error taxonomy shared across receivers and the driver.
//!
//! Kinds, not type names: each variant maps to a specific HTTP status or
//! gRPC outcome at the boundary that raises it (see the receiver crates).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    /// Raised once at start; the caller must not retry without remediation.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A receiver could not acquire its listening port. Fatal; any
    /// partially-started resources are released by the caller.
    #[error("failed to bind {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A single OTLP request failed to decode. Surfaced per-request; never
    /// affects any other request.
    #[error("failed to decode OTLP payload: {0}")]
    DecodeError(String),

    /// The payload codec failed to serialize a structurally invalid
    /// protobuf message. Treated as a [`IngressError::DecodeError`] toward
    /// the client.
    #[error("failed to encode payload: {0}")]
    EncodingError(String),

    /// The destination queue was at capacity; the message was dropped.
    #[error("queue full for signal {0}")]
    QueueFull(&'static str),

    /// An unexpected fault within a receiver handler.
    #[error("internal error: {0}")]
    TransientInternal(String),
}
