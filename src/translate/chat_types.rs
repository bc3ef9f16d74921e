//! Chat Completions payloads, as accepted by Azure deployments and by the unified router.
//!
//! Outbound types are built through small constructors so translators never spell out
//! the fixed `"function"` discriminators. Inbound types use container-level defaults:
//! Azure content filters and some router providers drop fields freely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const FUNCTION: &str = "function";

fn function_kind() -> String {
    FUNCTION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ChatToolChoice>,
    #[serde(rename = "stop", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(rename = "user", skip_serializing_if = "Option::is_none")]
    pub end_user: Option<String>,
}

/// One entry of the chat transcript.
///
/// `content` is omitted only on assistant turns that carry nothing but tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// The `tool`-role message answering call `call_id`.
    pub fn tool_output(call_id: &str, output: String) -> Self {
        Self {
            tool_call_id: Some(call_id.to_string()),
            ..Self::text("tool", output)
        }
    }

    pub fn assistant(content: Option<String>, calls: Vec<ChatToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: (!calls.is_empty()).then_some(calls),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatFunction,
}

impl ChatTool {
    pub fn function(name: &str, description: Option<String>, parameters: Value) -> Self {
        Self {
            kind: function_kind(),
            function: ChatFunction {
                name: name.to_string(),
                description,
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// Either a mode keyword (`auto`, `required`, `none`) or a forced function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatToolChoice {
    Mode(String),
    Named(NamedToolChoice),
}

impl ChatToolChoice {
    pub fn named(name: &str) -> Self {
        Self::Named(NamedToolChoice {
            kind: function_kind(),
            function: FunctionName { name: name.to_string() },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedToolChoice {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionName {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: CalledFunction,
}

impl ChatToolCall {
    pub fn new(id: &str, name: &str, arguments: String) -> Self {
        Self {
            id: id.to_string(),
            kind: function_kind(),
            function: CalledFunction {
                name: name.to_string(),
                arguments,
            },
        }
    }
}

/// Arguments arrive as a JSON-encoded string, not an object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalledFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

impl ChatCompletionResponse {
    /// Only the first choice is ever requested.
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Choice {
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoiceMessage {
    pub content: Option<String>,
    /// Set instead of `content` when a content filter declines to answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChoiceMessage {
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.refusal.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}
