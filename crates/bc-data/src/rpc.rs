//! Retrying JSON-RPC client for the upstream chain provider.
//!
//! Every call goes through the shared [`RpsLimiter`]. Empty bodies and HTTP
//! 429 are the provider's quota-exhaustion symptoms and are retried after a
//! fixed delay; transport and decode failures abort the call. The configured
//! timeout bounds the whole retry sequence of one call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::hex::{decode_optional_quantity, decode_quantity};
use crate::limiter::RpsLimiter;
use crate::source::BlockSource;
use crate::types::{BlockId, Transaction};

/// Retry and deadline settings for [`RpcClient`].
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// Deadline for one logical call including all retries.
    pub timeout: Duration,
    /// Attempts before giving up on a provider that returns no data.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RpcBlock {
    #[serde(default)]
    transactions: Vec<RpcTransaction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    from: Option<String>,
    to: Option<String>,
    gas: Option<String>,
    gas_price: Option<String>,
    value: Option<String>,
}

/// JSON-RPC client over HTTP POST.
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: Url,
    limiter: Arc<RpsLimiter>,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Creates a client for `rpc_url`, sharing `limiter` with other clients.
    ///
    /// # Errors
    /// Returns [`UpstreamError::Config`] if the URL is not http(s), if
    /// `max_retries` is zero, or if the HTTP client cannot be built.
    pub fn new(
        rpc_url: &str,
        limiter: Arc<RpsLimiter>,
        config: RpcConfig,
    ) -> Result<Self, UpstreamError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| UpstreamError::Config(format!("invalid RPC URL {rpc_url:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UpstreamError::Config(format!(
                "RPC URL must be http or https, got {:?}",
                url.scheme()
            )));
        }
        if config.max_retries == 0 {
            return Err(UpstreamError::Config("max_retries must be at least 1".into()));
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| UpstreamError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url,
            limiter,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Newest block height via `eth_blockNumber`.
    #[tracing::instrument(skip_all)]
    pub async fn block_number(&self, cancel: &CancellationToken) -> Result<BlockId, UpstreamError> {
        let result: Option<String> = self.call(cancel, "eth_blockNumber", json!([])).await?;
        let raw = result.ok_or(UpstreamError::MissingResult("eth_blockNumber"))?;
        let height = decode_quantity("result", &raw)?;

        debug!(height = %height, "resolved current block height");
        Ok(BlockId::new(height))
    }

    /// Full transaction list of `block` via `eth_getBlockByNumber`.
    #[tracing::instrument(skip_all, fields(block = %block))]
    pub async fn block_transactions(
        &self,
        cancel: &CancellationToken,
        block: &BlockId,
    ) -> Result<Vec<Transaction>, UpstreamError> {
        let number = block.to_hex();
        let result: Option<RpcBlock> = self
            .call(cancel, "eth_getBlockByNumber", json!([number, true]))
            .await?;
        let body = result.ok_or(UpstreamError::BlockNotFound(number))?;

        let txs = body
            .transactions
            .into_iter()
            .map(decode_transaction)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(tx_count = txs.len(), "decoded block transactions");
        Ok(txs)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, UpstreamError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        match tokio::time::timeout(self.config.timeout, self.send_with_retry(cancel, &request))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(UpstreamError::DeadlineExceeded(self.config.timeout)),
        }
    }

    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        request: &RpcRequest,
    ) -> Result<Option<T>, UpstreamError> {
        for attempt in 1..=self.config.max_retries {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                _ = self.limiter.admit() => {}
            }

            self.release_if_cancelled(cancel)?;

            let (status, body) = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                exchanged = self.exchange(request) => exchanged?,
            };

            if status == StatusCode::TOO_MANY_REQUESTS || body.trim_ascii().is_empty() {
                warn!(
                    method = request.method,
                    attempt,
                    status = status.as_u16(),
                    "upstream returned no data, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                }
                continue;
            }

            let response: RpcResponse<T> =
                serde_json::from_slice(&body).map_err(UpstreamError::Malformed)?;
            if let Some(err) = response.error {
                return Err(UpstreamError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            return Ok(response.result);
        }

        Err(UpstreamError::QuotaExceeded {
            attempts: self.config.max_retries,
        })
    }

    /// Returns a just-claimed slot when cancellation won the race with
    /// admission, so no window capacity leaks to a request never sent.
    fn release_if_cancelled(&self, cancel: &CancellationToken) -> Result<(), UpstreamError> {
        if cancel.is_cancelled() {
            self.limiter.rollback();
            return Err(UpstreamError::Cancelled);
        }
        Ok(())
    }

    async fn exchange(&self, request: &RpcRequest) -> Result<(StatusCode, Vec<u8>), UpstreamError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(UpstreamError::Unavailable)?;
        let status = response.status();
        let body = response.bytes().await.map_err(UpstreamError::Unavailable)?;
        Ok((status, body.to_vec()))
    }
}

#[async_trait]
impl BlockSource for RpcClient {
    async fn current_height(&self, cancel: &CancellationToken) -> Result<BlockId, UpstreamError> {
        self.block_number(cancel).await
    }

    async fn transactions_for_block(
        &self,
        cancel: &CancellationToken,
        block: &BlockId,
    ) -> Result<Vec<Transaction>, UpstreamError> {
        self.block_transactions(cancel, block).await
    }
}

fn decode_transaction(raw: RpcTransaction) -> Result<Transaction, UpstreamError> {
    Ok(Transaction {
        gas: decode_optional_quantity("gas", raw.gas.as_deref())?,
        gas_price: decode_optional_quantity("gasPrice", raw.gas_price.as_deref())?,
        value: decode_optional_quantity("value", raw.value.as_deref())?,
        from: raw.from.unwrap_or_default(),
        to: raw.to.unwrap_or_default(),
    })
}
