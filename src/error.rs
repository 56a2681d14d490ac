//! Error types for a3s-audit-log

use thiserror::Error;

/// Errors that can occur anywhere in the ingestion and read pipeline
#[derive(Debug, Error)]
pub enum AuditLogError {
    /// Inbound payload could not be turned into an event
    #[error("Decode error: {0}")]
    Decode(String),

    /// Storage unreachable or transiently failing; the write may succeed later
    #[error("Storage connection lost: {0}")]
    ConnectionLost(String),

    /// Storage rejected decodable but invalid data
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Query against the store failed
    #[error("Read error: {0}")]
    Read(String),

    /// Caller has no verified identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Broker connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transient broker failure while pulling (heartbeat loss, timeouts)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Broker refused the subscription definition
    #[error("Failed to subscribe '{subscription}' to topic '{topic}': {reason}")]
    Subscribe {
        topic: String,
        subscription: String,
        reason: String,
    },

    /// Publish failure
    #[error("Failed to publish to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Acknowledgement failure
    #[error("Failed to acknowledge message: {0}")]
    Ack(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization failure on the outbound path
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server failure
    #[error("Server error: {0}")]
    Server(String),
}

impl AuditLogError {
    /// Whether a broker-side failure should be retried by re-subscribing
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuditLogError::Connection(_) | AuditLogError::Transport(_) | AuditLogError::Timeout(_)
        )
    }

    /// Whether a failed write should leave the message unacknowledged
    ///
    /// Everything else that reaches the writer is terminal for that message.
    pub fn is_retryable_write(&self) -> bool {
        matches!(
            self,
            AuditLogError::ConnectionLost(_) | AuditLogError::Timeout(_)
        )
    }
}

/// Result type alias for audit log operations
pub type Result<T> = std::result::Result<T, AuditLogError>;

impl axum::response::IntoResponse for AuditLogError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AuditLogError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
