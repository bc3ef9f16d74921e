//! Error types for the gateway.

use thiserror::Error;

use crate::classify::BackendError;
use crate::sanitize::sanitize_message;

/// Failures of a client-side tool call, reported back through the conversation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ToolError {
    #[error("Tool '{tool_name}' failed: {message}")]
    Call { tool_name: String, message: String },

    #[error("Tool '{tool_name}' failed validation: {}", schema_errors.join("; "))]
    Validation {
        tool_name: String,
        schema_errors: Vec<String>,
    },

    #[error("Tool '{tool_name}' timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

impl ToolError {
    pub fn call(tool_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Call {
            tool_name: tool_name.into(),
            message: msg.into(),
        }
    }

    pub fn validation(tool_name: impl Into<String>, schema_errors: Vec<String>) -> Self {
        Self::Validation {
            tool_name: tool_name.into(),
            schema_errors,
        }
    }

    pub fn timeout(tool_name: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            tool_name: tool_name.into(),
            timeout_secs,
        }
    }

    pub fn tool_name(&self) -> &str {
        match self {
            Self::Call { tool_name, .. }
            | Self::Validation { tool_name, .. }
            | Self::Timeout { tool_name, .. } => tool_name,
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Translation error: {message}")]
    Translation { message: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Conversation error: {message}")]
    Conversation { message: String },

    #[error("Tool loop stopped: {message}")]
    ToolLoop { message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation {
            message: msg.into(),
        }
    }

    pub fn conversation(msg: impl Into<String>) -> Self {
        Self::Conversation {
            message: msg.into(),
        }
    }

    pub fn tool_loop(msg: impl Into<String>) -> Self {
        Self::ToolLoop {
            message: msg.into(),
        }
    }

    /// HTTP status used when this error is returned to a client.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } | Self::Tool(_) | Self::Conversation { .. } => 400,
            Self::ToolLoop { .. } => 409,
            Self::Backend(err) => err.status(),
            Self::Cancelled => 499,
            Self::Http(_) => 502,
            Self::Config { .. }
            | Self::Translation { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Toml(_) => 500,
        }
    }

    /// Canonical `error.type` string for the error envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. }
            | Self::Tool(_)
            | Self::Conversation { .. }
            | Self::ToolLoop { .. } => "invalid_request_error",
            Self::Backend(err) => err.error_type(),
            _ => "api_error",
        }
    }

    /// Message safe to hand to a client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Backend(err) => err.friendly_message(),
            other => sanitize_message(&other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
