//! Failure taxonomy for the generation pipeline and the classifier that maps
//! provider faults into it.

use crate::providers::ProviderError;
use crate::providers::sanitize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Stable failure codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ApiKeyMissing,
    ResponseEmpty,
    ResponseInvalidJson,
    ResponseSchemaMismatch,
    ResponseMissingFields,
    RateLimited,
    Timeout,
    ServerError,
    NetworkError,
    AuthenticationFailed,
    ContentPolicy,
    InvalidRequest,
    Unknown,
}

impl ErrorCode {
    /// Retryability assigned to each kind when nothing more specific is known.
    pub fn default_retryable(&self) -> bool {
        match self {
            ErrorCode::ResponseEmpty
            | ErrorCode::ResponseInvalidJson
            | ErrorCode::ResponseSchemaMismatch
            | ErrorCode::ResponseMissingFields
            | ErrorCode::RateLimited
            | ErrorCode::Timeout
            | ErrorCode::ServerError
            | ErrorCode::NetworkError => true,
            ErrorCode::ApiKeyMissing
            | ErrorCode::AuthenticationFailed
            | ErrorCode::ContentPolicy
            | ErrorCode::InvalidRequest
            | ErrorCode::Unknown => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ApiKeyMissing => "API_KEY_MISSING",
            ErrorCode::ResponseEmpty => "RESPONSE_EMPTY",
            ErrorCode::ResponseInvalidJson => "RESPONSE_INVALID_JSON",
            ErrorCode::ResponseSchemaMismatch => "RESPONSE_SCHEMA_MISMATCH",
            ErrorCode::ResponseMissingFields => "RESPONSE_MISSING_FIELDS",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::AuthenticationFailed => "AUTHENTICATION_FAILED",
            ErrorCode::ContentPolicy => "CONTENT_POLICY",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error surfaced by the generation pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AiServiceError {
    pub message: String,
    pub code: ErrorCode,
    pub retryable: bool,
    pub details: Option<serde_json::Value>,
}

impl AiServiceError {
    /// Build an error carrying the code's default retryability.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            retryable: code.default_retryable(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn api_key_missing() -> Self {
        Self::new(
            ErrorCode::ApiKeyMissing,
            "No API key configured for the completion provider",
        )
    }

    pub fn empty_response() -> Self {
        Self::new(ErrorCode::ResponseEmpty, "Model returned an empty response")
    }

    pub fn invalid_json(reason: impl fmt::Display, raw: &str) -> Self {
        Self::new(
            ErrorCode::ResponseInvalidJson,
            format!("Model response is not valid JSON: {reason}"),
        )
        .with_details(json!({ "raw": sanitize::truncate(raw, sanitize::MAX_DETAIL_CHARS) }))
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResponseSchemaMismatch, message)
    }

    pub fn missing_fields(missing: &[&str]) -> Self {
        Self::new(
            ErrorCode::ResponseMissingFields,
            format!("Model response is missing sections: {}", missing.join(", ")),
        )
        .with_details(json!({ "missing": missing }))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }
}

/// Anything the retry controller can ask "should I try again?".
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AiServiceError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        classify(self).retryable
    }
}

impl From<ProviderError> for AiServiceError {
    fn from(err: ProviderError) -> Self {
        classify(&err)
    }
}

const CONTENT_POLICY_MARKERS: [&str; 5] = [
    "content_policy",
    "content policy",
    "content_filter",
    "safety",
    "flagged",
];

fn mentions_content_policy(body: &str) -> bool {
    let lower = body.to_lowercase();
    CONTENT_POLICY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Extract a Retry-After hint (seconds) from an error body, in milliseconds.
pub fn parse_retry_after_ms(text: &str) -> Option<u64> {
    let lower = text.to_lowercase();
    for prefix in ["retry-after:", "retry_after:", "retry-after ", "retry_after "] {
        let Some(pos) = lower.find(prefix) else {
            continue;
        };
        let num: String = lower[pos + prefix.len()..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(secs) = num.parse::<f64>()
            && secs.is_finite()
            && secs >= 0.0
        {
            return u64::try_from(Duration::from_secs_f64(secs).as_millis()).ok();
        }
    }
    None
}

/// Map a provider fault into the private taxonomy.
pub fn classify(err: &ProviderError) -> AiServiceError {
    match err {
        ProviderError::AuthRequired(msg) => {
            AiServiceError::api_key_missing().with_details(json!({ "provider": msg }))
        }
        ProviderError::RateLimited { retry_after_ms } => rate_limited(*retry_after_ms),
        ProviderError::Http { status, body } => classify_status(*status, body),
        ProviderError::Network(e) => {
            if e.is_timeout() {
                AiServiceError::new(ErrorCode::Timeout, "Request to the provider timed out")
            } else if let Some(status) = e.status() {
                classify_status(status.as_u16(), &e.to_string())
            } else if e.is_decode() {
                AiServiceError::new(
                    ErrorCode::ResponseInvalidJson,
                    format!("Could not decode provider response: {e}"),
                )
            } else {
                AiServiceError::new(
                    ErrorCode::NetworkError,
                    format!("Could not reach the provider: {e}"),
                )
            }
        }
        ProviderError::Json(e) => AiServiceError::new(
            ErrorCode::ResponseInvalidJson,
            format!("Could not decode provider response: {e}"),
        ),
        ProviderError::Stream { kind, message } => classify_stream_error(kind, message),
        ProviderError::Truncated(msg) => AiServiceError::new(
            ErrorCode::NetworkError,
            format!("Provider stream ended early: {msg}"),
        ),
        ProviderError::Other(msg) => AiServiceError::new(ErrorCode::Unknown, msg.clone()),
    }
}

fn rate_limited(retry_after_ms: Option<u64>) -> AiServiceError {
    let err = AiServiceError::new(ErrorCode::RateLimited, "Provider rate limit reached");
    match retry_after_ms {
        Some(ms) => err.with_details(json!({ "retryAfterMs": ms })),
        None => err,
    }
}

fn classify_status(status: u16, raw_body: &str) -> AiServiceError {
    let body = sanitize::sanitize_api_error(raw_body);
    let details = json!({ "status": status, "body": body });
    let err = match status {
        401 | 403 => AiServiceError::new(
            ErrorCode::AuthenticationFailed,
            format!("Provider rejected the credentials (HTTP {status})"),
        ),
        429 => {
            return AiServiceError::new(ErrorCode::RateLimited, "Provider rate limit reached")
                .with_details(json!({
                    "status": status,
                    "body": body,
                    "retryAfterMs": parse_retry_after_ms(raw_body),
                }));
        }
        408 | 504 => AiServiceError::new(
            ErrorCode::Timeout,
            format!("Provider timed out (HTTP {status})"),
        ),
        400 if mentions_content_policy(raw_body) => AiServiceError::new(
            ErrorCode::ContentPolicy,
            "Provider refused the request on content-policy grounds",
        ),
        500..=599 => AiServiceError::new(
            ErrorCode::ServerError,
            format!("Provider server error (HTTP {status})"),
        ),
        400..=499 => AiServiceError::new(
            ErrorCode::InvalidRequest,
            format!("Provider rejected the request (HTTP {status})"),
        ),
        _ => AiServiceError::new(
            ErrorCode::Unknown,
            format!("Unexpected provider status {status}"),
        ),
    };
    err.with_details(details)
}

/// Errors reported as `error` events inside an SSE stream use the provider's
/// error type names rather than HTTP statuses.
fn classify_stream_error(kind: &str, raw_message: &str) -> AiServiceError {
    let message = sanitize::sanitize_api_error(raw_message);
    let code = match kind {
        "overloaded_error" | "api_error" => ErrorCode::ServerError,
        "rate_limit_error" => ErrorCode::RateLimited,
        "authentication_error" | "permission_error" => ErrorCode::AuthenticationFailed,
        "invalid_request_error" if mentions_content_policy(raw_message) => {
            ErrorCode::ContentPolicy
        }
        "invalid_request_error" | "not_found_error" | "request_too_large" => {
            ErrorCode::InvalidRequest
        }
        "timeout_error" => ErrorCode::Timeout,
        _ => ErrorCode::Unknown,
    };
    AiServiceError::new(code, message).with_details(json!({ "type": kind }))
}
