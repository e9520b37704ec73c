//! Search mediation: credential gate, provider call, outcome normalization.
//!
//! Every path returns a string the caller can render directly. The provider's
//! tri-state outcome stays distinguishable in the text: results, an explicit
//! "no results" with the raw payload for diagnosis, or a failure line carrying
//! the error kind and detail.

use serde_json::Value;

use crate::credentials::SERVER_API_KEY_ENV;
use crate::providers::SearchProvider;

const NO_TITLE_PLACEHOLDER: &str = "(no title)";
const RAW_PAYLOAD_PREVIEW_MAX_CHARS: usize = 400;

pub async fn run_search(
    provider: &dyn SearchProvider,
    query: &str,
    api_key: Option<&str>,
) -> String {
    let Some(api_key) = api_key else {
        return missing_key_message();
    };

    let payload = match provider.search(query, api_key).await {
        Ok(payload) => payload,
        Err(err) => return format!("Search failed during execution: {err}"),
    };

    let results = payload
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if results.is_empty() {
        return format!(
            "No results. Raw provider response: {}",
            preview(&payload.to_string())
        );
    }

    let blocks: Vec<String> = results.iter().map(render_result).collect();
    blocks.join("\n\n")
}

fn missing_key_message() -> String {
    format!(
        "No Tavily API key available. Supply one per request via an \
         'Authorization: Bearer <key>' or 'X-Tavily-Api-Key' header, or set \
         {SERVER_API_KEY_ENV} in the server environment."
    )
}

fn render_result(item: &Value) -> String {
    let title = item
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(NO_TITLE_PLACEHOLDER);
    let snippet = item
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .replace('\n', " ");
    format!("{title}\n{}", snippet.trim())
}

fn preview(raw: &str) -> String {
    if raw.chars().count() <= RAW_PAYLOAD_PREVIEW_MAX_CHARS {
        return raw.to_string();
    }
    let cut: String = raw.chars().take(RAW_PAYLOAD_PREVIEW_MAX_CHARS).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::providers::ProviderError;

    struct CountingProvider {
        payload: Result<Value, String>,
        calls: Arc<AtomicUsize>,
    }

    impl CountingProvider {
        fn ok(payload: Value) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    payload: Ok(payload),
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn failing(detail: &str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    payload: Err(detail.to_string()),
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl SearchProvider for CountingProvider {
        async fn search(&self, _query: &str, _api_key: &str) -> Result<Value, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.payload {
                Ok(payload) => Ok(payload.clone()),
                Err(detail) => Err(ProviderError::Decode(detail.clone())),
            }
        }
    }

    #[tokio::test]
    async fn missing_key_short_circuits_before_the_provider() {
        let (provider, calls) = CountingProvider::ok(json!({ "results": [] }));
        let text = run_search(&provider, "rust", None).await;
        assert!(text.contains("Authorization: Bearer"));
        assert!(text.contains("X-Tavily-Api-Key"));
        assert!(text.contains("TAVILY_API_KEY"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn formats_titles_and_collapsed_snippets() {
        let (provider, _) = CountingProvider::ok(json!({
            "results": [
                { "title": "A", "content": "x\ny" },
                { "content": "z" }
            ]
        }));
        let text = run_search(&provider, "rust", Some("key")).await;
        assert_eq!(text, "A\nx y\n\n(no title)\nz");
    }

    #[tokio::test]
    async fn preserves_provider_result_order() {
        let (provider, _) = CountingProvider::ok(json!({
            "results": [
                { "title": "first", "content": "1" },
                { "title": "second", "content": "2" },
                { "title": "third", "content": "3" }
            ]
        }));
        let text = run_search(&provider, "rust", Some("key")).await;
        assert_eq!(text, "first\n1\n\nsecond\n2\n\nthird\n3");
    }

    #[tokio::test]
    async fn empty_results_report_the_raw_payload() {
        let (provider, _) = CountingProvider::ok(json!({ "results": [] }));
        let text = run_search(&provider, "rust", Some("key")).await;
        assert!(text.starts_with("No results."));
        assert!(text.contains(r#"{"results":[]}"#));
    }

    #[tokio::test]
    async fn missing_results_field_is_treated_as_no_results() {
        let (provider, _) = CountingProvider::ok(json!({ "answer": "42" }));
        let text = run_search(&provider, "rust", Some("key")).await;
        assert!(text.starts_with("No results."));
        assert!(text.contains("42"));
    }

    #[tokio::test]
    async fn raw_payload_preview_is_bounded() {
        let (provider, _) = CountingProvider::ok(json!({
            "results": [],
            "debug": "y".repeat(5000)
        }));
        let text = run_search(&provider, "rust", Some("key")).await;
        assert!(text.len() < 600);
        assert!(text.ends_with("..."));
    }

    #[tokio::test]
    async fn provider_failure_is_reported_with_kind_and_detail() {
        let (provider, calls) = CountingProvider::failing("unexpected token");
        let text = run_search(&provider, "rust", Some("key")).await;
        assert!(text.starts_with("Search failed during execution:"));
        assert!(text.contains("decode_error"));
        assert!(text.contains("unexpected token"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_query_is_passed_through_to_the_provider() {
        let (provider, calls) = CountingProvider::ok(json!({ "results": [] }));
        let _ = run_search(&provider, "", Some("key")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
