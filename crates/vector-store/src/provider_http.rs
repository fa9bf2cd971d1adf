//! Turning failed provider HTTP responses into short, clean messages.
//!
//! Remote bodies are never passed through as-is: JSON error payloads
//! contribute their message, HTML error pages are replaced outright and
//! anything else is cut down to [`MAX_DETAIL_CHARS`].

use serde_json::Value;

pub const MAX_DETAIL_CHARS: usize = 200;

/// Coarse class of an HTTP status, shared by embedding and answer providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Unauthorized,
    RateLimited,
    Unavailable,
    Rejected,
}

#[must_use]
pub const fn classify_status(status: u16) -> StatusClass {
    match status {
        401 | 403 => StatusClass::Unauthorized,
        429 => StatusClass::RateLimited,
        500..=599 => StatusClass::Unavailable,
        _ => StatusClass::Rejected,
    }
}

/// `"<provider> returned status N: <detail>"` with the detail sanitized
#[must_use]
pub fn describe_http_failure(
    provider: &str,
    status: u16,
    content_type: Option<&str>,
    body: &str,
) -> String {
    if looks_like_html(content_type, body) {
        return format!("{provider} returned an HTML error page (status {status})");
    }
    match extract_detail(body) {
        Some(detail) => format!("{provider} returned status {status}: {detail}"),
        None => format!("{provider} returned status {status}"),
    }
}

/// First `max` characters of `text`, with an ellipsis when cut
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html")) {
        return true;
    }
    let lowered: String = body
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    lowered.starts_with("<!doctype html") || lowered.starts_with("<html")
}

fn extract_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        return json_message(&json).map(|msg| truncate_chars(msg.trim(), MAX_DETAIL_CHARS));
    }
    Some(truncate_chars(&collapse_whitespace(trimmed), MAX_DETAIL_CHARS))
}

fn json_message(json: &Value) -> Option<&str> {
    match json.get("error") {
        Some(Value::String(msg)) => Some(msg),
        Some(Value::Object(obj)) => obj.get("message").and_then(Value::as_str),
        _ => json.get("message").and_then(Value::as_str),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
