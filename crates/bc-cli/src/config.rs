//! Command-line and environment configuration.
//!
//! Every knob is a flag with an environment fallback, so the service can be
//! configured from a `.env` file, the process environment or the command line.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bc_data::{LimiterConfig, RpcConfig};
use bc_engine::EngineConfig;
use clap::Args;
use color_eyre::eyre::{eyre, Context, Result};

/// Upstream JSON-RPC provider settings.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// JSON-RPC endpoint of the Ethereum provider.
    #[arg(long, env = "API_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Requests allowed per rate window.
    #[arg(long, env = "API_RPS", default_value_t = 60, global = true)]
    pub rps: u32,

    #[arg(long, env = "API_TIME_WINDOW_RPS_MS", default_value_t = 1_000, global = true)]
    pub rps_window_ms: u64,

    #[arg(long, env = "API_LIMITER_POLL_MS", default_value_t = 100, global = true)]
    pub limiter_poll_ms: u64,

    /// Deadline for one upstream call, retries included.
    #[arg(long, env = "API_TIMEOUT_MS", default_value_t = 5_000, global = true)]
    pub upstream_timeout_ms: u64,

    #[arg(long, env = "API_MAX_RETRIES", default_value_t = 5, global = true)]
    pub max_retries: u32,

    #[arg(long, env = "API_TIME_BETWEEN_RETRIES_MS", default_value_t = 500, global = true)]
    pub retry_delay_ms: u64,
}

impl UpstreamArgs {
    pub fn rpc_url(&self) -> Result<&str> {
        self.rpc_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| eyre!("an RPC endpoint is required: pass --rpc-url or set API_URL"))
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            requests: self.rps,
            window: Duration::from_millis(self.rps_window_ms),
            poll_interval: Duration::from_millis(self.limiter_poll_ms),
        }
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            timeout: Duration::from_millis(self.upstream_timeout_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Aggregation engine settings.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Window used when a request asks for zero blocks.
    #[arg(long, env = "APP_COUNT_OF_BLOCKS", default_value_t = 100, global = true)]
    pub default_blocks: u64,

    /// Blocks resolved concurrently per request.
    #[arg(long, env = "APP_MAX_GOROUTINES", default_value_t = 50, global = true)]
    pub max_workers: usize,

    /// Expected distinct addresses per block, used for map sizing.
    #[arg(long, env = "APP_AVG_ADDRS", default_value_t = 200, global = true)]
    pub avg_addresses: usize,

    /// Blocks kept in the delta cache.
    #[arg(long, env = "APP_CACHE_SIZE", default_value_t = 100, global = true)]
    pub cache_size: usize,
}

impl EngineArgs {
    pub fn engine_config(&self) -> Result<EngineConfig> {
        if self.max_workers == 0 {
            return Err(eyre!("--max-workers must be at least 1"));
        }
        Ok(EngineConfig {
            cache_size: self.cache_size,
            max_workers: self.max_workers,
            default_window: self.default_blocks,
            addresses_per_block: self.avg_addresses,
        })
    }
}

/// Parses a listen address. A bare port binds every interface.
pub fn listen_address(raw: &str) -> Result<SocketAddr> {
    let raw = raw.trim();
    let raw = raw.strip_prefix(':').unwrap_or(raw);
    if let Ok(port) = raw.parse::<u16>() {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    raw.parse::<SocketAddr>()
        .wrap_err_with(|| format!("invalid listen address {raw:?}"))
}
