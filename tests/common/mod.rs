//! Shared test helpers.
//!
//! Runs a scriptable JSON-RPC provider on a loopback port so the real HTTP
//! client, limiter and retry loop are exercised end to end.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bc_data::{LimiterConfig, RpcClient, RpcConfig, RpsLimiter};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request as seen by the provider.
#[derive(Clone, Debug)]
pub struct RpcCall {
    pub method: String,
    pub params: Value,
    /// 1-based count of requests received so far, this one included.
    pub seq: usize,
}

/// What the provider sends back.
pub enum Reply {
    Result(Value),
    RpcError { code: i64, message: &'static str },
    EmptyBody,
    Status(StatusCode),
    Hang,
}

type Script = dyn Fn(&RpcCall) -> Reply + Send + Sync;

struct Shared {
    script: Box<Script>,
    calls: Mutex<Vec<RpcCall>>,
}

/// Loopback JSON-RPC provider. The server task stops on drop.
pub struct FakeProvider {
    url: String,
    shared: Arc<Shared>,
    server: JoinHandle<()>,
}

impl FakeProvider {
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&RpcCall) -> Reply + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/", post(answer))
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("loopback bind should succeed");
        let addr = listener.local_addr().expect("bound listener has an address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake provider crashed");
        });

        Self {
            url: format!("http://{addr}/"),
            shared,
            server,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Total requests received.
    pub fn calls(&self) -> usize {
        self.shared.calls.lock().len()
    }

    pub fn calls_for(&self, method: &str) -> usize {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }
}

impl Drop for FakeProvider {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn answer(State(shared): State<Arc<Shared>>, body: Bytes) -> Response {
    let request: Value = serde_json::from_slice(&body).expect("client sends valid json");
    let call = {
        let mut calls = shared.calls.lock();
        let call = RpcCall {
            method: request["method"].as_str().unwrap_or_default().to_string(),
            params: request["params"].clone(),
            seq: calls.len() + 1,
        };
        calls.push(call.clone());
        call
    };
    let id = request["id"].clone();

    match (shared.script)(&call) {
        Reply::Result(result) => envelope(json!({"jsonrpc": "2.0", "id": id, "result": result})),
        Reply::RpcError { code, message } => envelope(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        })),
        Reply::EmptyBody => StatusCode::OK.into_response(),
        Reply::Status(status) => status.into_response(),
        Reply::Hang => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            StatusCode::OK.into_response()
        }
    }
}

fn envelope(body: Value) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

/// Transaction object as returned by `eth_getBlockByNumber(.., true)`.
pub fn tx_json(from: &str, to: &str, value: u64, gas: u64, gas_price: u64) -> Value {
    json!({
        "hash": format!("0x{:064x}", value ^ gas),
        "from": from,
        "to": to,
        "value": format!("0x{value:x}"),
        "gas": format!("0x{gas:x}"),
        "gasPrice": format!("0x{gas_price:x}"),
        "input": "0x",
    })
}

/// Serves a fixed chain: `eth_blockNumber` answers `height`, and blocks not in
/// `blocks` are empty.
pub fn chain_script(
    height: u64,
    blocks: HashMap<u64, Vec<Value>>,
) -> impl Fn(&RpcCall) -> Reply + Send + Sync + 'static {
    move |call| match call.method.as_str() {
        "eth_blockNumber" => Reply::Result(json!(format!("0x{height:x}"))),
        "eth_getBlockByNumber" => {
            let number = requested_block(&call.params);
            let txs = blocks.get(&number).cloned().unwrap_or_default();
            Reply::Result(json!({
                "number": format!("0x{number:x}"),
                "transactions": txs,
            }))
        }
        other => panic!("unexpected method {other}"),
    }
}

/// Block number named in `eth_getBlockByNumber` params.
pub fn requested_block(params: &Value) -> u64 {
    let raw = params[0].as_str().expect("block tag is a string");
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).expect("block tag is hex")
}

/// Fast settings: short retry delay, generous rate, small deadline.
pub fn fast_rpc_config() -> RpcConfig {
    RpcConfig {
        timeout: Duration::from_secs(2),
        max_retries: 5,
        retry_delay: Duration::from_millis(10),
    }
}

pub fn client(url: &str, config: RpcConfig) -> RpcClient {
    let limiter = Arc::new(RpsLimiter::new(LimiterConfig {
        requests: 1_000,
        ..LimiterConfig::default()
    }));
    RpcClient::new(url, limiter, config).expect("valid client config")
}
