//! Seam between the aggregation engine and whatever supplies block data.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::UpstreamError;
use crate::types::{BlockId, Transaction};

/// Source of chain heights and block transactions.
///
/// Implementations must return [`UpstreamError::Cancelled`] promptly once
/// `cancel` fires, without issuing new requests.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Height of the newest block.
    async fn current_height(&self, cancel: &CancellationToken) -> Result<BlockId, UpstreamError>;

    /// Transactions of `block`, in block order.
    async fn transactions_for_block(
        &self,
        cancel: &CancellationToken,
        block: &BlockId,
    ) -> Result<Vec<Transaction>, UpstreamError>;
}
