//! Per-request credential resolution for the search provider.
//!
//! Callers may bring their own Tavily key through transport headers; the
//! server key from the environment is only a fallback. Resolution is a total
//! function: "no key" is a value, never an error.

use std::collections::HashMap;

/// Header carrying `Bearer <key>` (preferred form).
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Dedicated header carrying the raw key, for callers that cannot set
/// `Authorization`.
pub const API_KEY_HEADER: &str = "x-tavily-api-key";
/// Process-wide fallback, read by the binaries at startup.
pub const SERVER_API_KEY_ENV: &str = "TAVILY_API_KEY";

const BEARER_SCHEME: &str = "bearer";

/// Resolve the search credential for one request.
///
/// Precedence, first non-empty match wins:
/// 1. `Authorization: Bearer <key>`
/// 2. `X-Tavily-Api-Key: <key>`
/// 3. `server_key` (the process-wide `TAVILY_API_KEY`)
///
/// Header names are compared case-insensitively. Values are trimmed; a value
/// that is empty after trimming falls through to the next step.
pub fn resolve_api_key(
    headers: &HashMap<String, String>,
    server_key: Option<&str>,
) -> Option<String> {
    let normalized: HashMap<String, &str> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
        .collect();

    let resolved = bearer_token(normalized.get(AUTHORIZATION_HEADER).copied())
        .or_else(|| non_empty(normalized.get(API_KEY_HEADER).copied()))
        .or_else(|| non_empty(server_key));

    // Names only. The key itself must never reach the logs.
    let mut header_names: Vec<String> = normalized.into_keys().collect();
    header_names.sort();
    tracing::debug!(
        api_key_present = resolved.is_some(),
        header_names = ?header_names,
        "resolved search credential"
    );

    resolved
}

fn bearer_token(value: Option<&str>) -> Option<String> {
    let (scheme, token) = value?.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    non_empty(Some(token))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
