//! JSON-RPC 2.0 endpoint exposing `JsonRpc.GetBiggestChange`.
//!
//! Protocol errors (unparsable body, bad envelope, unknown method, bad params)
//! use the standard reserved codes. Computation failures carry only
//! `"process timeout"` or `"internal server error"` as their message.

use axum::{body::Bytes, extract::State, Json};
use bc_data::BiggestChange;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiError;
use super::AppState;

const METHODS: [&str; 2] = ["JsonRpc.GetBiggestChange", "getBiggestChange"];

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const PROCESS_TIMEOUT: i64 = -32000;

#[derive(Debug, Deserialize)]
struct Call {
    #[serde(default)]
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetBiggestChangeArgs {
    #[serde(default)]
    count_of_blocks: u64,
}

#[derive(Debug, Serialize)]
pub struct Reply {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<BiggestChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Fault>,
    id: Value,
}

#[derive(Debug, Serialize)]
struct Fault {
    code: i64,
    message: String,
}

impl Reply {
    fn success(id: Value, result: BiggestChange) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(Fault {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

/// `POST /`. Always answers 200; failures travel in the reply's error object.
pub async fn handle(State(state): State<AppState>, body: Bytes) -> Json<Reply> {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "unparsable json-rpc body");
            return Json(Reply::failure(Value::Null, PARSE_ERROR, "parse error"));
        }
    };

    let call: Call = match serde_json::from_value(raw) {
        Ok(call) => call,
        Err(e) => {
            tracing::debug!(error = %e, "invalid json-rpc envelope");
            return Json(Reply::failure(Value::Null, INVALID_REQUEST, "invalid request"));
        }
    };

    if call.jsonrpc.as_deref().is_some_and(|version| version != "2.0") {
        return Json(Reply::failure(call.id, INVALID_REQUEST, "invalid request"));
    }
    if !METHODS.contains(&call.method.as_str()) {
        return Json(Reply::failure(
            call.id,
            METHOD_NOT_FOUND,
            format!("method not found: {}", call.method),
        ));
    }

    let args = match parse_args(call.params) {
        Ok(args) => args,
        Err(e) => {
            return Json(Reply::failure(
                call.id,
                INVALID_PARAMS,
                format!("invalid params: {e}"),
            ))
        }
    };

    match state.biggest_change(args.count_of_blocks).await {
        Ok(change) => Json(Reply::success(call.id, change)),
        Err(err) => {
            let err = ApiError::from(err);
            err.log("jsonrpc");
            let code = match err {
                ApiError::Timeout(_) => PROCESS_TIMEOUT,
                _ => INTERNAL_ERROR,
            };
            Json(Reply::failure(call.id, code, err.to_string()))
        }
    }
}

/// Accepts `[{...}]`, `{...}`, `[]` or no params at all.
fn parse_args(params: Value) -> Result<GetBiggestChangeArgs, serde_json::Error> {
    match params {
        Value::Null => Ok(GetBiggestChangeArgs::default()),
        Value::Array(mut items) => match items.len() {
            0 => Ok(GetBiggestChangeArgs::default()),
            1 => serde_json::from_value(items.remove(0)),
            n => Err(serde::de::Error::invalid_length(n, &"at most one argument object")),
        },
        other => serde_json::from_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::json;
    use std::time::Duration;

    fn post(body: impl Into<String>) -> Request<Body> {
        Request::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.into()))
            .unwrap()
    }

    fn call(method: &str, params: Value) -> Request<Body> {
        post(
            json!({"jsonrpc": "2.0", "id": "1", "method": method, "params": params}).to_string(),
        )
    }

    #[tokio::test]
    async fn get_biggest_change_succeeds() {
        let app = app(sample_chain(), Duration::from_secs(5));
        let (status, body) = send(
            app,
            call("JsonRpc.GetBiggestChange", json!([{"countOfBlocks": 1}])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "jsonrpc": "2.0",
                "result": {
                    "address": "0x1",
                    "amount": "0x258",
                    "lastBlock": "0xc8",
                    "windowSize": 1,
                    "isPositive": false,
                },
                "id": "1",
            })
        );
    }

    #[tokio::test]
    async fn alias_and_object_params_are_accepted() {
        let app = app(sample_chain(), Duration::from_secs(5));
        let (_, body) = send(app, call("getBiggestChange", json!({"countOfBlocks": 1}))).await;
        assert_eq!(body["result"]["address"], "0x1");
    }

    #[tokio::test]
    async fn zero_count_uses_default_window() {
        let app = app(sample_chain(), Duration::from_secs(5));
        let (_, body) = send(
            app,
            call("JsonRpc.GetBiggestChange", json!([{"countOfBlocks": 0}])),
        )
        .await;
        assert_eq!(body["result"]["windowSize"], 100);
    }

    #[tokio::test]
    async fn timeout_reports_process_timeout() {
        let chain = StaticChain {
            latency: Duration::from_secs(30),
            ..sample_chain()
        };
        let app = app(chain, Duration::from_millis(20));
        let (status, body) = send(
            app,
            call("JsonRpc.GetBiggestChange", json!([{"countOfBlocks": 10}])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["code"], PROCESS_TIMEOUT);
        assert_eq!(body["error"]["message"], "process timeout");
        assert!(body.get("result").is_none());
        assert_eq!(body["id"], "1");
    }

    #[tokio::test]
    async fn upstream_failure_reports_internal_error() {
        let chain = StaticChain {
            broken: true,
            ..sample_chain()
        };
        let app = app(chain, Duration::from_secs(5));
        let (_, body) = send(
            app,
            call("JsonRpc.GetBiggestChange", json!([{"countOfBlocks": 10}])),
        )
        .await;

        assert_eq!(body["error"]["code"], INTERNAL_ERROR);
        assert_eq!(body["error"]["message"], "internal server error");
    }

    #[tokio::test]
    async fn protocol_errors_use_reserved_codes() {
        let cases = [
            (post("{not json"), PARSE_ERROR),
            (post(r#"{"id": 1}"#), INVALID_REQUEST),
            (call("JsonRpc.Unknown", json!([])), METHOD_NOT_FOUND),
            (
                call("JsonRpc.GetBiggestChange", json!([{"countOfBlocks": "ten"}])),
                INVALID_PARAMS,
            ),
            (
                call("JsonRpc.GetBiggestChange", json!([{}, {}])),
                INVALID_PARAMS,
            ),
        ];

        for (request, expected) in cases {
            let app = app(sample_chain(), Duration::from_secs(5));
            let (status, body) = send(app, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["error"]["code"], expected, "{body}");
        }
    }

    #[test]
    fn params_shapes() {
        assert_eq!(parse_args(Value::Null).unwrap().count_of_blocks, 0);
        assert_eq!(parse_args(json!([])).unwrap().count_of_blocks, 0);
        assert_eq!(parse_args(json!([{"countOfBlocks": 5}])).unwrap().count_of_blocks, 5);
        assert_eq!(parse_args(json!({"countOfBlocks": 6})).unwrap().count_of_blocks, 6);
        assert!(parse_args(json!("7")).is_err());
    }
}
