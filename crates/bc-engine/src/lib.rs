//! bc-engine crate
//!
//! Concurrent aggregation of per-address balance deltas over a window of
//! recent blocks, with a shared per-block delta cache and max-change
//! reduction.

pub mod aggregator;
pub mod cache;
pub mod delta;
pub mod error;

pub use aggregator::{Aggregator, EngineConfig};
pub use cache::{BlockDeltaCache, CacheStats};
pub use delta::{AddressDelta, AggregateDelta};
pub use error::ChangeError;
