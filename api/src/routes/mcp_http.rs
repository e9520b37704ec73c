use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use valet_mcp_runtime::{McpRuntimeConfig, handle_http_jsonrpc};

use crate::state::AppState;

const MCP_PATH: &str = "/mcp";

pub fn router() -> Router<AppState> {
    Router::new().route(MCP_PATH, post(mcp_post).get(mcp_get))
}

async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": {
                        "code": -32700,
                        "message": "Parse error"
                    }
                })),
            )
                .into_response();
        }
    };

    let responses = handle_http_jsonrpc(
        McpRuntimeConfig {
            request_headers: request_metadata(&headers),
            server_api_key: state.server_api_key.clone(),
        },
        incoming,
    )
    .await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 {
        return (
            StatusCode::OK,
            Json(responses.into_iter().next().unwrap_or(Value::Null)),
        )
            .into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}

/// The per-request metadata handed to the runtime: header names lower-cased,
/// first value wins for repeated names, non-UTF-8 values skipped. Built fresh
/// per request and dropped with it.
fn request_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            metadata
                .entry(name.as_str().to_ascii_lowercase())
                .or_insert_with(|| value.to_string());
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn request_metadata_lowercases_names() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Tavily-Api-Key", HeaderValue::from_static("tvly-abc"));
        let metadata = request_metadata(&headers);
        assert_eq!(
            metadata.get("x-tavily-api-key").map(String::as_str),
            Some("tvly-abc")
        );
    }

    #[test]
    fn request_metadata_keeps_the_first_of_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-tavily-api-key", HeaderValue::from_static("first"));
        headers.append("x-tavily-api-key", HeaderValue::from_static("second"));
        let metadata = request_metadata(&headers);
        assert_eq!(
            metadata.get("x-tavily-api-key").map(String::as_str),
            Some("first")
        );
    }

    #[test]
    fn request_metadata_skips_non_utf8_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-opaque",
            HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );
        let metadata = request_metadata(&headers);
        assert!(metadata.is_empty());
    }

    #[tokio::test]
    async fn get_on_mcp_path_is_method_not_allowed() {
        let response = mcp_get().await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn invalid_json_body_is_a_parse_error_response() {
        let response = mcp_post(
            State(AppState::default()),
            HeaderMap::new(),
            Bytes::from_static(b"not json"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn notification_only_body_is_accepted_with_no_content() {
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        let response = mcp_post(
            State(AppState::default()),
            HeaderMap::new(),
            Bytes::from(body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
