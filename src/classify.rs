//! Backend failure classification.
//!
//! Turns a status code and body (or a transport failure) into a typed [`BackendError`]
//! that says whether the call may be retried. Every message is sanitized on the way in,
//! so nothing downstream of classification can leak a credential.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::sanitize::sanitize_message;
use crate::transport::TransportError;

/// "retry after 7 seconds", "Retry-After: 7". Bare numbers elsewhere (error codes) never count.
static RETRY_IN_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry[- ]?after\D{0,12}?(\d+)").expect("static regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    #[error("Rate limited ({status}): {message}")]
    RateLimit {
        status: u16,
        message: String,
        retry_after: Option<u64>,
    },

    #[error("Authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("Transient backend failure ({status}): {message}")]
    Transient { status: u16, message: String },

    #[error("Backend configuration error ({status}): {message}")]
    Configuration { status: u16, message: String },

    #[error("Backend API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl BackendError {
    pub fn status(&self) -> u16 {
        match self {
            Self::RateLimit { status, .. }
            | Self::Authentication { status, .. }
            | Self::Transient { status, .. }
            | Self::Configuration { status, .. }
            | Self::Api { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimit { message, .. }
            | Self::Authentication { message, .. }
            | Self::Transient { message, .. }
            | Self::Configuration { message, .. }
            | Self::Api { message, .. } => message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit { .. } | Self::Transient { .. })
    }

    /// Server-requested delay in seconds, when the backend supplied one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimit { .. } => "rate_limit",
            Self::Authentication { .. } => "authentication",
            Self::Transient { .. } => "transient",
            Self::Configuration { .. } => "configuration",
            Self::Api { .. } => "api",
        }
    }

    /// Canonical `error.type` for the client-facing envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::RateLimit { .. } => "rate_limit_error",
            Self::Authentication { status: 403, .. } => "permission_error",
            Self::Authentication { .. } => "authentication_error",
            Self::Transient { status: 503, .. } => "overloaded_error",
            Self::Api { status: 400, .. } => "invalid_request_error",
            Self::Transient { .. } | Self::Configuration { .. } | Self::Api { .. } => "api_error",
        }
    }

    /// Short explanation suitable for end users.
    pub fn friendly_message(&self) -> String {
        let text = match self {
            Self::Authentication { .. } => {
                "Authentication issue with the backend. Please check your credentials and permissions."
                    .to_string()
            }
            Self::RateLimit {
                retry_after: Some(secs),
                ..
            } => format!("Rate limit exceeded. Try again in {secs} seconds."),
            Self::RateLimit { .. } => "Rate limit exceeded. Please wait before retrying.".to_string(),
            Self::Configuration { .. } => {
                "Configuration issue with the backend deployment. Please check your endpoint and model settings."
                    .to_string()
            }
            Self::Transient { .. } => {
                "Temporary backend service issue. Please try again shortly.".to_string()
            }
            Self::Api { message, .. } => format!("Backend API error: {message}"),
        };
        sanitize_message(&text)
    }
}

/// Classify an HTTP failure from a backend.
///
/// `retry_after_header` is the raw `Retry-After` header value, if any; it takes
/// precedence over a delay mentioned in the body.
pub fn classify(status: u16, body: &str, retry_after_header: Option<&str>) -> BackendError {
    let message = sanitize_message(&extract_message(status, body));

    match status {
        401 | 403 => BackendError::Authentication { status, message },
        404 => BackendError::Configuration { status, message },
        429 => {
            let retry_after = retry_after_header
                .and_then(parse_retry_after)
                .or_else(|| retry_after_from_body(body));
            BackendError::RateLimit {
                status,
                message,
                retry_after,
            }
        }
        500..=599 => BackendError::Transient { status, message },
        _ => BackendError::Api { status, message },
    }
}

/// Classify a failure that never produced a usable HTTP response.
pub fn classify_transport(err: &TransportError) -> BackendError {
    match err {
        TransportError::Status {
            status,
            body,
            retry_after,
        } => classify(*status, body, retry_after.as_deref()),
        TransportError::Timeout => BackendError::Transient {
            status: 408,
            message: "Request to backend timed out".to_string(),
        },
        TransportError::Network(detail) => BackendError::Transient {
            status: 503,
            message: sanitize_message(&format!("Could not reach backend: {detail}")),
        },
        TransportError::Unconfigured(detail) => BackendError::Configuration {
            status: 500,
            message: format!("Backend endpoint is not configured: {detail}"),
        },
    }
}

/// Pull the most specific message out of an error body.
fn extract_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }

    let Ok(parsed) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };

    let error = parsed.get("error").filter(|e| e.is_object());
    let inner = error.and_then(|e| e.get("innererror")).filter(|e| e.is_object());

    let layers = [inner, error, Some(&parsed)];
    let code = layers.iter().flatten().find_map(|l| str_field(l, "code"));
    let text = layers.iter().flatten().find_map(|l| str_field(l, "message"));

    match (text, code) {
        (Some(text), Some(code)) => format!("{text} ({code})"),
        (Some(text), None) => text.to_string(),
        (None, Some(code)) => code.to_string(),
        (None, None) => trimmed.to_string(),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `Retry-After` as delta-seconds. Fractional values round up.
fn parse_retry_after(raw: &str) -> Option<u64> {
    let secs: f64 = raw.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs.ceil() as u64)
    } else {
        None
    }
}

fn retry_after_from_body(body: &str) -> Option<u64> {
    RETRY_IN_BODY
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
