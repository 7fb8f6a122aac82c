//! Upstream error type and its coarse classification.

use std::time::Duration;

use thiserror::Error;

/// Coarse error classes used by callers to pick a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UpstreamUnavailable,
    UpstreamQuotaExceeded,
    UpstreamDecode,
    UpstreamRpc,
    Cancelled,
    DeadlineExceeded,
    Internal,
}

impl ErrorKind {
    /// Cancellation and deadline expiry are retryable by the caller.
    pub fn is_timeout(self) -> bool {
        matches!(self, ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }
}

/// Failure of one logical upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure. Never retried.
    #[error("upstream unavailable")]
    Unavailable(#[source] reqwest::Error),

    /// Provider kept answering with empty bodies.
    #[error("too many requests to upstream: no data after {attempts} attempts")]
    QuotaExceeded { attempts: u32 },

    #[error("field `{field}` is not a hex quantity: {value:?}")]
    InvalidHex { field: &'static str, value: String },

    #[error("upstream response did not match the expected shape")]
    Malformed(#[source] serde_json::Error),

    #[error("upstream response to {0} carried no result")]
    MissingResult(&'static str),

    #[error("block {0} not found upstream")]
    BlockNotFound(String),

    #[error("upstream rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("upstream call cancelled")]
    Cancelled,

    #[error("upstream call exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    #[error("invalid upstream configuration: {0}")]
    Config(String),
}

impl UpstreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpstreamError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
            UpstreamError::QuotaExceeded { .. } => ErrorKind::UpstreamQuotaExceeded,
            UpstreamError::InvalidHex { .. }
            | UpstreamError::Malformed(_)
            | UpstreamError::MissingResult(_)
            | UpstreamError::BlockNotFound(_) => ErrorKind::UpstreamDecode,
            UpstreamError::Rpc { .. } => ErrorKind::UpstreamRpc,
            UpstreamError::Cancelled => ErrorKind::Cancelled,
            UpstreamError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            UpstreamError::Config(_) => ErrorKind::Internal,
        }
    }
}
