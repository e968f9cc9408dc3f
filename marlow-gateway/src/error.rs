//! Gateway client errors

use thiserror::Error;

/// Errors from the settlement gateway client.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Connection, DNS or mid-body failure; retryable
    #[error("Transport error: {0}")]
    Transport(String),

    /// Per-attempt timeout; retryable
    #[error("Request timed out")]
    Timeout,

    /// Non-success HTTP status from the gateway
    #[error("Gateway returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated for logs
        body: String,
    },

    /// Retries exhausted the outbound-effect TTL without an ack
    #[error("Retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made before giving up
        attempts: u32,
        /// Last error observed
        last: String,
    },

    /// Request body failed to serialize
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GatewayError {
    /// Terminal errors dead-letter the settlement; everything else retries.
    ///
    /// 4xx is terminal except 408 (request timeout) and 429 (throttled),
    /// which the gateway contract treats as transient.
    pub fn is_terminal(&self) -> bool {
        match self {
            GatewayError::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            },
            GatewayError::Serialization(_) => true,
            _ => false,
        }
    }
}
