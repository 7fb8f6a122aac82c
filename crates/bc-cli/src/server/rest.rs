use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use bc_data::BiggestChange;
use serde::Deserialize;

use super::error::ApiError;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct BiggestChangeQuery {
    /// Zero or absent selects the configured default window.
    #[serde(default)]
    pub count_of_blocks: u64,
}

/// `GET /api/v1/get_biggest_change?count_of_blocks=N`
pub async fn get_biggest_change(
    State(state): State<AppState>,
    query: Result<Query<BiggestChangeQuery>, QueryRejection>,
) -> Result<Json<BiggestChange>, ApiError> {
    let result = match query {
        Ok(Query(query)) => state
            .biggest_change(query.count_of_blocks)
            .await
            .map_err(ApiError::from),
        Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
    };

    result.map(Json).inspect_err(|err| err.log("rest"))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use std::time::Duration;

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn returns_the_biggest_change() {
        let app = app(sample_chain(), Duration::from_secs(5));
        let (status, body) = send(app, get("/api/v1/get_biggest_change?count_of_blocks=1")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "address": "0x1",
                "amount": "0x258",
                "lastBlock": "0xc8",
                "windowSize": 1,
                "isPositive": false,
            })
        );
    }

    #[tokio::test]
    async fn missing_count_uses_default_window() {
        let app = app(sample_chain(), Duration::from_secs(5));
        let (status, body) = send(app, get("/api/v1/get_biggest_change")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["windowSize"], 100);
        assert_eq!(body["address"], "0x1");
    }

    #[tokio::test]
    async fn malformed_count_is_bad_request() {
        for uri in [
            "/api/v1/get_biggest_change?count_of_blocks=abc",
            "/api/v1/get_biggest_change?count_of_blocks=-1",
        ] {
            let app = app(sample_chain(), Duration::from_secs(5));
            let (status, body) = send(app, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "BAD_REQUEST");
        }
    }

    #[tokio::test]
    async fn slow_upstream_is_gateway_timeout() {
        let chain = StaticChain {
            latency: Duration::from_secs(30),
            ..sample_chain()
        };
        let app = app(chain, Duration::from_millis(20));
        let (status, body) = send(app, get("/api/v1/get_biggest_change?count_of_blocks=3")).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["message"], "process timeout");
    }

    #[tokio::test]
    async fn upstream_failure_is_internal_error() {
        let chain = StaticChain {
            broken: true,
            ..sample_chain()
        };
        let app = app(chain, Duration::from_secs(5));
        let (status, body) = send(app, get("/api/v1/get_biggest_change?count_of_blocks=3")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "internal server error");
    }
}
