//! Error mapping for provider HTTP APIs
//!
//! Converts non-success HTTP replies from judge backends into `ProviderError`,
//! pulling a human-readable message out of the vendor's error body.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;

use super::ProviderError;
use crate::util::truncate_string;

const MAX_BODY_IN_MESSAGE: usize = 200;

/// Map a non-success HTTP reply to a ProviderError
pub fn map_http_error(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ProviderError {
    let message = match serde_json::from_str::<Value>(body) {
        Ok(json) => extract_message(&json).unwrap_or_else(|| fallback_message(status, body)),
        Err(_) => fallback_message(status, body),
    };

    ProviderError::http_with_retry_after(status.as_u16(), message, retry_after)
}

/// Read a `Retry-After` header given in delta-seconds
///
/// HTTP-date values are ignored; the retry policy's own delay applies then.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

// OpenAI:    {"error": {"message": "...", "type": "..."}}
// Anthropic: {"type": "error", "error": {"type": "...", "message": "..."}}
// Others:    {"message": "..."} or {"error": "..."}
fn extract_message(json: &Value) -> Option<String> {
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
            return Some(match error.get("type").and_then(|t| t.as_str()) {
                Some(kind) => format!("{} ({})", message, kind),
                None => message.to_string(),
            });
        }
        if let Some(message) = error.as_str() {
            return Some(message.to_string());
        }
    }

    json.get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, truncate_string(body, MAX_BODY_IN_MESSAGE))
    }
}
