//! Conversion to and from the Chat-Completions shape shared by Azure chat deployments
//! and the unified router.
//!
//! Outbound, one canonical turn can fan out into several chat messages: every
//! `tool_result` block in a user turn becomes its own `tool`-role message, with any
//! surrounding text kept in order around it. Inbound, only the first choice is read.

use serde_json::Value;

use super::canonical::{
    ContentBlock, MessagesRequest, MessagesResponse, ResponseContentBlock, Role, ToolChoice,
    ToolChoiceSpecific, Usage,
};
use super::chat_types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatTool, ChatToolCall, ChatToolChoice,
};
use super::{
    finalize_content, map_stop_reason, message_id, parse_tool_arguments, synthesize_tool_id,
    tool_choice_name, tool_result_to_string, ConvertOptions,
};

/// Translate a canonical request into a Chat Completions request. Pure.
pub fn canonical_to_chat(req: &MessagesRequest, opts: &ConvertOptions) -> ChatCompletionRequest {
    let mut transcript = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = &req.system {
        transcript.push(ChatMessage::text("system", system.as_text()));
    }

    for msg in &req.messages {
        let blocks = msg.content.blocks();
        match msg.role {
            Role::User => push_user_turn(&mut transcript, &blocks),
            Role::Assistant => transcript.push(assistant_turn(&blocks)),
            Role::System => transcript.push(ChatMessage::text("system", texts(&blocks).join("\n"))),
        }
    }

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| ChatTool::function(&t.name, t.description.clone(), opts.parameters(&t.input_schema)))
            .collect()
    });

    let tool_choice = req.tool_choice.as_ref().map(|choice| match choice {
        ToolChoice::Auto(auto) => ChatToolChoice::Mode(tool_choice_name(auto).to_string()),
        ToolChoice::Specific(ToolChoiceSpecific { name, .. }) => ChatToolChoice::named(name),
    });

    ChatCompletionRequest {
        model: opts.target_model.clone(),
        messages: transcript,
        max_tokens: Some(opts.max_tokens(req.max_tokens)),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        tools,
        tool_choice,
        stop_sequences: req.stop_sequences.clone(),
        end_user: req.metadata.as_ref().and_then(|m| m.user_id.clone()),
    }
}

fn texts(blocks: &[ContentBlock]) -> Vec<&str> {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn push_user_turn(transcript: &mut Vec<ChatMessage>, blocks: &[ContentBlock]) {
    let start = transcript.len();
    let mut text: Vec<&str> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push(t),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                if !text.is_empty() {
                    transcript.push(ChatMessage::text("user", text.join("\n")));
                    text.clear();
                }
                let output = tool_result_to_string(content.as_ref(), *is_error);
                transcript.push(ChatMessage::tool_output(tool_use_id, output));
            }
            ContentBlock::ToolUse { .. } => {}
        }
    }

    // A turn always produces at least one message, even when empty
    if !text.is_empty() || transcript.len() == start {
        transcript.push(ChatMessage::text("user", text.join("\n")));
    }
}

fn assistant_turn(blocks: &[ContentBlock]) -> ChatMessage {
    let calls: Vec<ChatToolCall> = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some(ChatToolCall::new(id, name, input.to_string())),
            _ => None,
        })
        .collect();
    let text = texts(blocks);

    // Chat backends reject null content unless the turn carries tool calls
    let content = (!text.is_empty() || calls.is_empty()).then(|| text.concat());
    ChatMessage::assistant(content, calls)
}

/// Translate a Chat Completion reply into a canonical Messages response.
/// Pure function: `original_model` is the model the client asked for.
pub fn chat_to_canonical(resp: &ChatCompletionResponse, original_model: &str) -> MessagesResponse {
    let choice = resp.first_choice();
    let mut content = Vec::new();

    if let Some(choice) = choice {
        if let Some(text) = choice.message.text() {
            content.push(ResponseContentBlock::Text { text: text.to_string() });
        }
        content.extend(choice.message.tool_calls.iter().flatten().map(|call| {
            ResponseContentBlock::ToolUse {
                id: Some(call.id.clone())
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(synthesize_tool_id),
                name: call.function.name.clone(),
                input: parse_tool_arguments(&Value::String(call.function.arguments.clone())),
            }
        }));
    }

    let stop_reason = choice
        .and_then(|c| c.finish_reason.as_deref())
        .map(map_stop_reason)
        .unwrap_or_default();
    let (content, stop_reason) = finalize_content(content, stop_reason);

    let usage = resp.usage.as_ref().map_or_else(Usage::default, |u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    MessagesResponse {
        id: message_id(Some(resp.id.as_str())),
        response_type: "message".to_string(),
        role: Role::Assistant,
        content,
        model: original_model.to_string(),
        stop_reason,
        stop_sequence: None,
        usage,
    }
}
