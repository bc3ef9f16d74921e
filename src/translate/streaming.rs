//! Replay a completed response as the canonical SSE event sequence.
//!
//! Backends are always called without streaming. Clients that asked for `stream: true`
//! still get the event framing they expect (`message_start`, one start/delta/stop triple
//! per content block, `message_delta`, `message_stop`), built from the final response.

use super::canonical::{
    Delta, DeltaUsage, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent, Usage,
};

/// Build the full event sequence for `resp`.
pub fn replay_events(resp: &MessagesResponse) -> Vec<StreamEvent> {
    let mut events = Vec::with_capacity(resp.content.len() * 3 + 3);

    let start = MessagesResponse {
        content: Vec::new(),
        stop_sequence: None,
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: 0,
        },
        ..resp.clone()
    };
    events.push(StreamEvent::MessageStart { message: start });

    for (index, block) in resp.content.iter().enumerate() {
        let (opening, delta) = match block {
            ResponseContentBlock::Text { text } => (
                ResponseContentBlock::Text {
                    text: String::new(),
                },
                Delta::TextDelta { text: text.clone() },
            ),
            ResponseContentBlock::ToolUse { id, name, input } => (
                ResponseContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: serde_json::Value::Object(serde_json::Map::new()),
                },
                Delta::InputJsonDelta {
                    partial_json: input.to_string(),
                },
            ),
        };
        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: opening,
        });
        events.push(StreamEvent::ContentBlockDelta { index, delta });
        events.push(StreamEvent::ContentBlockStop { index });
    }

    events.push(StreamEvent::MessageDelta {
        delta: MessageDeltaBody {
            stop_reason: resp.stop_reason,
            stop_sequence: resp.stop_sequence.clone(),
        },
        usage: DeltaUsage {
            output_tokens: resp.usage.output_tokens,
        },
    });
    events.push(StreamEvent::MessageStop);
    events
}
