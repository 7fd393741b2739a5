//! Error types for the CometBFT RPC client.
//!
//! This module provides the error hierarchy for RPC operations:
//!
//! - [`CometError`] - The primary error type for all client operations
//! - Various error kinds for different failure modes (network, RPC, parsing)
//!
//! # Error Philosophy
//!
//! These errors are designed to be:
//! - **Actionable**: Each variant tells you what went wrong
//! - **Convertible**: Easy to convert into your application's error types
//! - **Classifiable**: Helpers distinguish transient from permanent failures

use std::fmt;

use thiserror::Error;

/// Result type alias using [`CometError`].
pub type Result<T> = std::result::Result<T, CometError>;

/// Errors that can occur when using the CometBFT RPC client.
///
/// # Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | Network | `Connection`, `Timeout`, `Http` | Network issues, node down |
/// | Protocol | `Rpc` | Node rejected the request |
/// | Data | `Serialization`, `InvalidResponse` | Malformed data |
/// | Usage | `InvalidConfig`, `PageLimitExceeded` | Configuration problem |
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CometError {
    /// Failed to establish connection to the RPC endpoint.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out waiting for a response.
    ///
    /// The timeout duration is [`ClientConfig::timeout`](crate::ClientConfig::timeout).
    #[error("request timed out")]
    Timeout,

    /// HTTP-level error (non-2xx status code, TLS issues, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error returned by the node.
    #[error("RPC error ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable error message from the node.
        message: String,
        /// Optional additional data from the error response.
        data: Option<String>,
    },

    /// Failed to serialize a request or deserialize a response.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response was valid JSON but had unexpected structure.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration provided to the client.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transaction search pagination limit exceeded.
    ///
    /// The query required more pages than the configured maximum.
    #[error("tx_search page limit exceeded: {pages} pages (max {max})")]
    PageLimitExceeded {
        /// Number of pages fetched before stopping.
        pages: usize,
        /// Maximum allowed pages.
        max: usize,
    },
}

impl CometError {
    /// Create an RPC error from code and message.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Check if this error is an `EOF`-suffixed transport failure.
    ///
    /// Load balancers in front of CometBFT nodes drop idle connections,
    /// which surfaces as an error message ending in `EOF`. These calls
    /// almost always succeed when repeated, so the client retries them
    /// once automatically.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Connection(msg) | Self::Http(msg) | Self::InvalidResponse(msg) => {
                msg.trim_end().ends_with("EOF")
            }
            Self::Rpc { message, data, .. } => {
                message.trim_end().ends_with("EOF")
                    || data.as_deref().is_some_and(|d| d.trim_end().ends_with("EOF"))
            }
            _ => false,
        }
    }

    /// Check if this error is likely transient and retryable.
    ///
    /// Returns `true` for network issues, timeouts, and server-side errors
    /// that might succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            Self::Http(msg) => {
                // 5xx errors are typically retryable
                msg.contains("500")
                    || msg.contains("502")
                    || msg.contains("503")
                    || msg.contains("504")
            }
            Self::Rpc { code, .. } => {
                // Server overloaded (generic internal error)
                *code == -32000 || *code == -32603
            }
            _ => self.is_eof(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS FROM reqwest ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<reqwest::Error> for CometError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_request() || err.is_body() || err.is_decode() {
            Self::Http(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC ERROR DETAILS
// ═══════════════════════════════════════════════════════════════════════════════

/// Detailed information from a JSON-RPC error response.
///
/// Used internally for parsing error responses from the node.
#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct RpcErrorDetail {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorDetail {
    /// Convert this detail into a [`CometError`].
    pub fn into_error(self) -> CometError {
        CometError::Rpc {
            code: self.code,
            message: self.message,
            data: self.data.map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RpcErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error ({}): {}", self.code, self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_eof() {
        let eof = CometError::Connection("unexpected EOF".into());
        assert!(eof.is_eof());

        let eof_rpc = CometError::Rpc {
            code: -32603,
            message: "post failed: EOF".into(),
            data: None,
        };
        assert!(eof_rpc.is_eof());

        let eof_data = CometError::Rpc {
            code: -32603,
            message: "internal error".into(),
            data: Some("read tcp 10.0.0.1: EOF".into()),
        };
        assert!(eof_data.is_eof());

        let not_eof = CometError::Connection("connection refused".into());
        assert!(!not_eof.is_eof());

        let timeout = CometError::Timeout;
        assert!(!timeout.is_eof());
    }

    #[test]
    fn error_is_retryable() {
        assert!(CometError::Timeout.is_retryable());
        assert!(CometError::Connection("connection refused".into()).is_retryable());
        assert!(CometError::Http("503 Service Unavailable".into()).is_retryable());
        assert!(CometError::rpc(-32603, "internal error").is_retryable());

        assert!(!CometError::InvalidConfig("bad url".into()).is_retryable());
        assert!(!CometError::InvalidResponse("missing field".into()).is_retryable());
        assert!(!CometError::rpc(-32602, "invalid params").is_retryable());
    }

    #[test]
    fn rpc_error_detail_deserialization() {
        let json = r#"{"code": -32603, "message": "Internal error", "data": "height 5 is not available"}"#;
        let detail: RpcErrorDetail = serde_json::from_str(json).expect("parse failed");
        assert_eq!(detail.code, -32603);
        assert_eq!(detail.message, "Internal error");
        assert!(detail.data.is_some());
    }

    #[test]
    fn rpc_error_detail_into_error_keeps_string_data() {
        let detail = RpcErrorDetail {
            code: -32603,
            message: "Internal error".into(),
            data: Some(serde_json::Value::String("EOF".into())),
        };
        let err = detail.into_error();
        assert!(err.is_eof());
    }
}
