//! Aggregation errors.

use std::time::Duration;

use bc_data::{BlockId, ErrorKind, UpstreamError};
use thiserror::Error;

/// Failure of one `compute` call. No partial result accompanies it.
#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("failed to resolve current block height")]
    Height(#[source] UpstreamError),

    #[error("failed to resolve deltas for block {block}")]
    Block {
        block: BlockId,
        #[source]
        source: UpstreamError,
    },

    /// The caller's token fired before the window was resolved.
    #[error("aggregation cancelled")]
    Cancelled,

    #[error("aggregation exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    #[error("internal aggregation error: {0}")]
    Internal(String),
}

impl ChangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChangeError::Height(source) | ChangeError::Block { source, .. } => source.kind(),
            ChangeError::Cancelled => ErrorKind::Cancelled,
            ChangeError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            ChangeError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for cancellation and deadline expiry, which callers may retry.
    pub fn is_timeout(&self) -> bool {
        self.kind().is_timeout()
    }

    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            ChangeError::Height(source) | ChangeError::Block { source, .. } => Some(source),
            _ => None,
        }
    }
}
