//! Error types for the gateway.

use thiserror::Error;

/// Primary error type for all gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request is malformed or structurally invalid. Rejected before
    /// the engine is invoked.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The engine stream violated its contract (ended without a terminal
    /// result, or produced an unrecognized shape).
    #[error("Engine protocol error: {0}")]
    EngineProtocol(String),

    /// The engine raised an error mid-execution.
    #[error("Engine error: {0}")]
    EngineRuntime(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller abandoned the request; the engine invocation was asked
    /// to stop. Not a failure of either side.
    #[error("Request cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Error-type tag used in wire-level error bodies.
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request_error",
            _ => "api_error",
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GatewayError>;
