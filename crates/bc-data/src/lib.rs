//! bc-data crate
//!
//! Chain-facing half of the biggest-change service: the block and transaction
//! model, the hex quantity codec, the outbound rate limiter and the retrying
//! JSON-RPC client that feeds the aggregation engine.

pub mod error;
pub mod hex;
pub mod limiter;
pub mod rpc;
pub mod source;
pub mod types;

pub use error::{ErrorKind, UpstreamError};
pub use limiter::{LimiterConfig, RpsLimiter};
pub use rpc::{RpcClient, RpcConfig};
pub use source::BlockSource;
pub use types::{BiggestChange, BlockId, Transaction};
