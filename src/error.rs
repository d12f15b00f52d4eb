//! Error types for the voice gateway.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Telephony media socket protocol or transport error.
    #[error("telephony error: {0}")]
    Telephony(String),

    /// Model realtime socket protocol or transport error.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration error (missing/invalid environment value).
    #[error("config error: {0}")]
    Config(String),

    /// Outbound call command FSM error.
    #[error("outbound error: {0}")]
    Outbound(String),

    /// Transcript ingestion/rendering error.
    #[error("transcript error: {0}")]
    Transcript(String),

    /// Call-control REST error.
    #[error("call-control error: {0}")]
    CallControl(String),

    /// No call found for the given call id.
    #[error("unknown call: {0}")]
    UnknownCall(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, GatewayError>;
