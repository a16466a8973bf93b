use std::sync::Arc;

use alloy::transports::{RpcError, TransportErrorKind};
use thiserror::Error;
use tokio::time::error::Elapsed;

/// JSON-RPC code some providers (Infura, Alchemy) use for "limit exceeded" on `eth_getLogs`.
pub const LIMIT_EXCEEDED_CODE: i64 = -32005;
/// Generic "invalid params" code; only a range error when the message mentions the range.
pub const INVALID_PARAMS_CODE: i64 = -32602;

/// Message fragments providers return when an `eth_getLogs` block range is too wide or the
/// response would be too large. Matched case-insensitively.
const RANGE_TOO_LARGE_PATTERNS: &[&str] = &[
    "query returned more than",
    "block range",
    "range too large",
    "range is too large",
    "too many logs",
    "too many results",
    "limit exceeded",
    "response size",
    "exceed maximum block range",
];

/// Errors produced by the network layer.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A call (including its retries) did not complete within the configured timeout.
    #[error("Operation timed out")]
    Timeout,

    /// The underlying transport or the remote node returned an error.
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),

    /// A push subscription ended without an explicit error.
    #[error("Subscription closed")]
    SubscriptionClosed,

    /// The governing cancellation token fired. Never reported as a failure.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` when the provider rejected a log query because the requested block range
    /// (or the resulting response) is too large.
    #[must_use]
    pub fn is_range_too_large(&self) -> bool {
        match self {
            Error::RpcError(err) => is_range_too_large(err),
            _ => false,
        }
    }

    /// Returns `true` for [`Error::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub(crate) fn is_range_too_large(err: &RpcError<TransportErrorKind>) -> bool {
    let message = err.to_string().to_lowercase();
    match err {
        RpcError::ErrorResp(payload) if payload.code == LIMIT_EXCEEDED_CODE => true,
        RpcError::ErrorResp(payload) if payload.code == INVALID_PARAMS_CODE && message.contains("range") => true,
        _ => RANGE_TOO_LARGE_PATTERNS.iter().any(|pattern| message.contains(pattern)),
    }
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        Error::RpcError(Arc::new(err))
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::Timeout
    }
}
