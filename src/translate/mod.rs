//! API translation between the canonical Messages format and the backend formats.
//!
//! Each backend kind has exactly two pure conversion functions (request out, response
//! back). [`convert_request`] and [`convert_response`] pick the pair once per request so
//! the rest of the gateway never branches on backend shape.

pub mod canonical;
pub mod chat;
pub mod chat_types;
pub mod responses;
pub mod responses_types;
pub mod schema;
pub mod streaming;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use canonical::{
    MessagesRequest, MessagesResponse, ResponseContentBlock, StopReason, ToolChoiceAuto, ToolResultContent,
};

/// Which backend wire format a request is sent in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Azure Responses-style API
    Responses,
    /// Azure Chat-Completions-style API
    Chat,
    /// Unified multi-provider router (chat-completions shaped)
    Router,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Responses => "responses",
            BackendKind::Chat => "chat",
            BackendKind::Router => "router",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request knobs for outbound conversion, computed once from the target.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Model (or deployment) name placed in the outbound body.
    pub target_model: String,
    /// Clean tool schemas for providers with restricted JSON-Schema support.
    pub restricted_schema: bool,
    /// Upper bound applied to `max_tokens`.
    pub max_tokens_cap: Option<u64>,
}

impl ConvertOptions {
    pub fn new(target_model: impl Into<String>) -> Self {
        Self {
            target_model: target_model.into(),
            ..Self::default()
        }
    }

    pub(crate) fn max_tokens(&self, requested: u64) -> u64 {
        self.max_tokens_cap.map_or(requested, |cap| requested.min(cap))
    }

    pub(crate) fn parameters(&self, schema: &Value) -> Value {
        if self.restricted_schema {
            schema::clean_schema(schema)
        } else {
            schema.clone()
        }
    }
}

/// Convert a canonical request into the JSON body for `kind`.
pub fn convert_request(
    kind: BackendKind,
    req: &MessagesRequest,
    opts: &ConvertOptions,
) -> Result<Value> {
    let body = match kind {
        BackendKind::Responses => serde_json::to_value(responses::canonical_to_responses(req, opts))?,
        BackendKind::Chat | BackendKind::Router => {
            serde_json::to_value(chat::canonical_to_chat(req, opts))?
        }
    };
    Ok(body)
}

/// Convert a raw backend reply for `kind` back into a canonical response.
///
/// `original_model` is the model name the client asked for; it is echoed back.
pub fn convert_response(
    kind: BackendKind,
    raw: &Value,
    original_model: &str,
) -> Result<MessagesResponse> {
    if !raw.is_object() {
        return Err(GatewayError::translation(format!(
            "{kind} backend returned a non-object body"
        )));
    }
    match kind {
        BackendKind::Responses => {
            let parsed = serde_json::from_value(raw.clone()).map_err(|e| {
                GatewayError::translation(format!("Malformed responses body: {e}"))
            })?;
            Ok(responses::responses_to_canonical(&parsed, original_model))
        }
        BackendKind::Chat | BackendKind::Router => {
            let parsed = serde_json::from_value(raw.clone()).map_err(|e| {
                GatewayError::translation(format!("Malformed chat completion body: {e}"))
            })?;
            Ok(chat::chat_to_canonical(&parsed, original_model))
        }
    }
}

/// Map any backend terminal-reason code onto the canonical stop reasons.
///
/// Unknown codes map to `end_turn` rather than failing an otherwise good generation.
pub fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "max_tokens" | "max_output_tokens" | "length" | "incomplete" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        "tool_use" | "tool_calls" | "function_call" | "requires_action" => StopReason::ToolUse,
        "end_turn" | "stop" | "completed" | "content_filter" => StopReason::EndTurn,
        other => {
            tracing::debug!(reason = other, "Unrecognized stop reason, using end_turn");
            StopReason::EndTurn
        }
    }
}

/// Id for a tool invocation the backend did not name.
pub(crate) fn synthesize_tool_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}

/// Tool arguments arrive as JSON text or as a JSON value.
///
/// Text that does not parse is kept under `{"raw": ...}` instead of being dropped.
pub(crate) fn parse_tool_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::String(text) if text.trim().is_empty() => Value::Object(serde_json::Map::new()),
        Value::String(text) => serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::json!({ "raw": text })),
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    }
}

/// Apply the shared content rules: never empty, and tool blocks force `tool_use`.
pub(crate) fn finalize_content(
    mut content: Vec<ResponseContentBlock>,
    stop_reason: StopReason,
) -> (Vec<ResponseContentBlock>, StopReason) {
    let has_tool_use = content
        .iter()
        .any(|b| matches!(b, ResponseContentBlock::ToolUse { .. }));
    if content.is_empty() {
        content.push(ResponseContentBlock::Text {
            text: String::new(),
        });
    }
    let stop_reason = if has_tool_use {
        StopReason::ToolUse
    } else {
        stop_reason
    };
    (content, stop_reason)
}

/// Flatten a tool result for backends that only take text. Failures are prefixed.
pub(crate) fn tool_result_to_string(content: Option<&ToolResultContent>, is_error: Option<bool>) -> String {
    let prefix = if is_error == Some(true) { "ERROR: " } else { "" };
    match content {
        Some(content) => format!("{prefix}{}", content.as_text()),
        None => format!("{prefix}(no content)"),
    }
}

/// Backend name for a tool-choice mode. `any` is spelled `required` there.
pub(crate) fn tool_choice_name(tc: &ToolChoiceAuto) -> &'static str {
    match tc.choice_type.as_str() {
        "any" => "required",
        "none" => "none",
        _ => "auto",
    }
}

/// Canonical message id derived from a backend id, or a fresh one.
pub(crate) fn message_id(backend_id: Option<&str>) -> String {
    match backend_id.filter(|id| !id.is_empty()) {
        Some(id) if id.starts_with("msg_") => id.to_string(),
        Some(id) => format!(
            "msg_{}",
            id.trim_start_matches("chatcmpl-").trim_start_matches("resp_")
        ),
        None => format!("msg_{}", uuid::Uuid::new_v4().simple()),
    }
}
