//! Window aggregation: resolve height, fan out one worker per block, merge,
//! reduce.
//!
//! A worker is only spawned once it holds a semaphore slot, so live tasks,
//! upstream load and memory stay bounded regardless of window size. The first
//! failing worker records its error and cancels the shared token; no further
//! workers are launched, and the call still waits for the launched ones
//! before returning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bc_data::{BiggestChange, BlockId, BlockSource, UpstreamError};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::BlockDeltaCache;
use crate::delta::{AddressDelta, AggregateDelta};
use crate::error::ChangeError;

/// Upper bound for the aggregate map's initial allocation.
const MAX_PREALLOCATED_ADDRESSES: usize = 1 << 20;

/// Aggregation settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Blocks kept in the delta cache.
    pub cache_size: usize,
    /// Blocks resolved concurrently.
    pub max_workers: usize,
    /// Window used when a caller asks for zero blocks.
    pub default_window: u64,
    /// Expected distinct addresses per block, used to size maps.
    pub addresses_per_block: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_size: 100,
            max_workers: 50,
            default_window: 100,
            addresses_per_block: 200,
        }
    }
}

/// Finds the address with the largest net balance change over recent blocks.
pub struct Aggregator {
    source: Arc<dyn BlockSource>,
    cache: Arc<BlockDeltaCache>,
    config: EngineConfig,
}

impl Aggregator {
    pub fn new(source: Arc<dyn BlockSource>, mut config: EngineConfig) -> Self {
        config.max_workers = config.max_workers.max(1);
        Self {
            source,
            cache: Arc::new(BlockDeltaCache::new(config.cache_size)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &BlockDeltaCache {
        &self.cache
    }

    /// Address with the largest absolute net change over the last `window`
    /// blocks. Zero selects the configured default window.
    ///
    /// A window reaching past genesis is clamped to `height + 1` blocks, and
    /// the result reports the clamped size.
    ///
    /// # Errors
    /// Fails if the height or any block of the window cannot be resolved, or
    /// if `cancel` fires first. No partial result is returned.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn compute(
        &self,
        window: u64,
        cancel: &CancellationToken,
    ) -> Result<BiggestChange, ChangeError> {
        let started = Instant::now();
        let requested = if window == 0 {
            self.config.default_window
        } else {
            window
        };

        let height = self
            .source
            .current_height(cancel)
            .await
            .map_err(ChangeError::Height)?;

        let window = clamp_to_chain(requested, &height);
        if window == 0 {
            debug!(last_block = %height, "empty window, nothing to aggregate");
            return Ok(AggregateDelta::default().summarize(&height, 0));
        }

        let first = BlockId::new(height.height() - BigUint::from(window - 1));
        let aggregate = self.resolve_window(&first, window, cancel).await?;
        let change = aggregate.summarize(&height, window);

        let stats = self.cache.stats();
        info!(
            window,
            last_block = %height,
            address = %change.address,
            amount = %change.amount,
            addresses = aggregate.len(),
            cache_hits = stats.hits,
            cache_misses = stats.misses,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "computed biggest change"
        );

        Ok(change)
    }

    /// [`Aggregator::compute`] bounded end-to-end by `deadline`.
    ///
    /// On expiry every outstanding worker is aborted and
    /// [`ChangeError::DeadlineExceeded`] is returned.
    pub async fn compute_within(
        &self,
        window: u64,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<BiggestChange, ChangeError> {
        match tokio::time::timeout(deadline, self.compute(window, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(window, deadline_ms = deadline.as_millis() as u64, "aggregation timed out");
                Err(ChangeError::DeadlineExceeded(deadline))
            }
        }
    }

    async fn resolve_window(
        &self,
        first: &BlockId,
        window: u64,
        cancel: &CancellationToken,
    ) -> Result<AggregateDelta, ChangeError> {
        if cancel.is_cancelled() {
            return Err(ChangeError::Cancelled);
        }

        let shared = cancel.child_token();
        // Dropping this call (e.g. an outer timeout) cancels every worker.
        let _cancel_on_drop = shared.clone().drop_guard();

        let permits = Arc::new(Semaphore::new(self.config.max_workers));
        let hint = usize::try_from(window)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.config.addresses_per_block)
            .min(MAX_PREALLOCATED_ADDRESSES);
        let aggregate = Arc::new(Mutex::new(AggregateDelta::with_capacity(hint)));
        let failure: Arc<Mutex<Option<ChangeError>>> = Arc::new(Mutex::new(None));
        let mut workers = JoinSet::new();

        for offset in 0..window {
            // A slot is claimed before the worker exists, so at most
            // `max_workers` tasks are alive at any time.
            let permit = tokio::select! {
                biased;
                _ = shared.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            while let Some(joined) = workers.try_join_next() {
                record_panic(joined, &failure, &shared);
            }
            if shared.is_cancelled() {
                break;
            }

            let block = first.advance(offset);
            let source = self.source.clone();
            let cache = self.cache.clone();
            let shared = shared.clone();
            let aggregate = aggregate.clone();
            let failure = failure.clone();
            let addresses_per_block = self.config.addresses_per_block;

            workers.spawn(async move {
                let _permit = permit;
                match resolve_block(&*source, &cache, &shared, &block, addresses_per_block).await {
                    Ok(delta) => aggregate.lock().absorb(&delta),
                    Err(source) => {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            let err = ChangeError::Block { block, source };
                            warn!(error = %err, "block resolution failed, cancelling remaining workers");
                            *slot = Some(err);
                            shared.cancel();
                        }
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            record_panic(joined, &failure, &shared);
        }

        if cancel.is_cancelled() {
            let failed = failure.lock().take();
            return match failed {
                Some(err) if !err.is_timeout() => Err(err),
                _ => Err(ChangeError::Cancelled),
            };
        }
        if let Some(err) = failure.lock().take() {
            return Err(err);
        }

        let merged = std::mem::take(&mut *aggregate.lock());
        Ok(merged)
    }
}

/// A worker that panicked fails the window unless another failure came first.
fn record_panic(
    joined: Result<(), JoinError>,
    failure: &Mutex<Option<ChangeError>>,
    shared: &CancellationToken,
) {
    if let Err(e) = joined {
        let mut slot = failure.lock();
        if slot.is_none() {
            *slot = Some(ChangeError::Internal(format!("block worker failed: {e}")));
            shared.cancel();
        }
    }
}

/// Cache first, otherwise fetch, fold and populate the cache.
async fn resolve_block(
    source: &dyn BlockSource,
    cache: &BlockDeltaCache,
    cancel: &CancellationToken,
    block: &BlockId,
    addresses_per_block: usize,
) -> Result<Arc<AddressDelta>, UpstreamError> {
    if let Some(delta) = cache.get(block) {
        trace!(%block, "delta cache hit");
        return Ok(delta);
    }

    let txs = source.transactions_for_block(cancel, block).await?;
    let mut delta = AddressDelta::with_capacity(addresses_per_block);
    for tx in &txs {
        delta.apply(tx);
    }

    let delta = Arc::new(delta);
    cache.put(block.clone(), delta.clone());
    trace!(%block, tx_count = txs.len(), addresses = delta.len(), "folded block");
    Ok(delta)
}

/// Blocks `0..=height` are all that exist.
fn clamp_to_chain(requested: u64, height: &BlockId) -> u64 {
    let available = height.height() + 1u32;
    if BigUint::from(requested) > available {
        available.to_u64().unwrap_or(requested)
    } else {
        requested
    }
}
