//! Conversion to and from the Azure Responses-style backend.
//!
//! Outbound, messages map one-to-one (the system prompt becomes a leading system
//! message). Inbound, both reply layouts are read: the `output[]` item list and the
//! flat top-level `content` list.

use serde_json::Value;

use super::canonical::{
    ContentBlock, Message, MessageContent, MessagesRequest, MessagesResponse, ResponseContentBlock,
    Role, ToolChoice, ToolChoiceSpecific, Usage,
};
use super::responses_types::{
    FunctionCall, InputPart, OutputItem, OutputPart, ResponsesContent, ResponsesFunction,
    ResponsesMessage, ResponsesRequest, ResponsesResponse, ResponsesTool,
};
use super::{
    finalize_content, map_stop_reason, message_id, parse_tool_arguments, synthesize_tool_id,
    tool_choice_name, tool_result_to_string, ConvertOptions,
};

/// Translate a canonical request into a Responses request. Pure.
pub fn canonical_to_responses(req: &MessagesRequest, opts: &ConvertOptions) -> ResponsesRequest {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);

    if let Some(ref system) = req.system {
        messages.push(ResponsesMessage {
            role: "system".to_string(),
            content: ResponsesContent::Text(system.as_text()),
        });
    }
    messages.extend(req.messages.iter().map(translate_message));

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| ResponsesTool {
                tool_type: "function".to_string(),
                function: ResponsesFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: opts.parameters(&t.input_schema),
                },
            })
            .collect()
    });

    ResponsesRequest {
        model: opts.target_model.clone(),
        messages,
        max_tokens: opts.max_tokens(req.max_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        tools,
        tool_choice: req.tool_choice.as_ref().map(translate_tool_choice),
        stop: req.stop_sequences.clone(),
    }
}

fn translate_message(msg: &Message) -> ResponsesMessage {
    let content = match &msg.content {
        MessageContent::Text(text) => ResponsesContent::Text(text.clone()),
        // Same rendering as the chat converter: an empty turn is an empty string
        MessageContent::Blocks(blocks) if blocks.is_empty() => ResponsesContent::Text(String::new()),
        MessageContent::Blocks(blocks) => {
            ResponsesContent::Parts(blocks.iter().map(|b| translate_block(msg.role, b)).collect())
        }
    };
    ResponsesMessage {
        role: msg.role.as_str().to_string(),
        content,
    }
}

fn translate_block(role: Role, block: &ContentBlock) -> InputPart {
    match block {
        ContentBlock::Text { text } if role == Role::Assistant => InputPart::OutputText { text: text.clone() },
        ContentBlock::Text { text } => InputPart::InputText { text: text.clone() },
        ContentBlock::ToolUse { id, name, input } => InputPart::ToolCall {
            id: id.clone(),
            function: FunctionCall {
                name: name.clone(),
                arguments: Value::String(input.to_string()),
            },
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => InputPart::ToolResult {
            tool_call_id: tool_use_id.clone(),
            output: tool_result_to_string(content.as_ref(), *is_error),
            is_error: is_error.unwrap_or(false),
        },
    }
}

fn translate_tool_choice(tc: &ToolChoice) -> Value {
    match tc {
        ToolChoice::Auto(auto) => Value::String(tool_choice_name(auto).to_string()),
        ToolChoice::Specific(ToolChoiceSpecific { name, .. }) => {
            serde_json::json!({"type": "function", "name": name})
        }
    }
}

/// Translate a Responses reply into a canonical Messages response.
/// Pure function: `original_model` is the model the client asked for.
pub fn responses_to_canonical(resp: &ResponsesResponse, original_model: &str) -> MessagesResponse {
    let mut content = Vec::new();

    for item in &resp.output {
        match item {
            OutputItem::Message { content: parts } => {
                content.extend(parts.iter().filter_map(translate_part));
            }
            OutputItem::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            } => content.push(ResponseContentBlock::ToolUse {
                id: call_id
                    .clone()
                    .or_else(|| id.clone())
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(synthesize_tool_id),
                name: name.clone(),
                input: parse_tool_arguments(arguments),
            }),
            OutputItem::Other => {}
        }
    }
    content.extend(resp.content.iter().filter_map(translate_part));

    let stop_reason = resp
        .stop_reason
        .as_deref()
        .or_else(|| resp.incomplete_details.as_ref().and_then(|d| d.reason.as_deref()))
        .or(resp.status.as_deref())
        .map(map_stop_reason)
        .unwrap_or_default();
    let (content, stop_reason) = finalize_content(content, stop_reason);

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
    });

    MessagesResponse {
        id: message_id(resp.id.as_deref()),
        response_type: "message".to_string(),
        role: Role::Assistant,
        content,
        model: original_model.to_string(),
        stop_reason,
        stop_sequence: None,
        usage,
    }
}

fn translate_part(part: &OutputPart) -> Option<ResponseContentBlock> {
    match part {
        OutputPart::OutputText { text } | OutputPart::Text { text } => {
            (!text.is_empty()).then(|| ResponseContentBlock::Text { text: text.clone() })
        }
        OutputPart::ToolCall { id, function } => {
            let (name, input) = function.as_ref().map_or_else(
                || (String::new(), Value::Object(serde_json::Map::new())),
                |f| (f.name.clone(), parse_tool_arguments(&f.arguments)),
            );
            Some(ResponseContentBlock::ToolUse {
                id: tool_id(id.as_deref()),
                name,
                input,
            })
        }
        OutputPart::ToolUse { id, name, input } => Some(ResponseContentBlock::ToolUse {
            id: tool_id(id.as_deref()),
            name: name.clone(),
            input: parse_tool_arguments(input),
        }),
        OutputPart::Other => None,
    }
}

fn tool_id(id: Option<&str>) -> String {
    id.filter(|id| !id.is_empty())
        .map_or_else(synthesize_tool_id, str::to_string)
}
