//! Per-conversation tool-call state and the runaway-tool-loop guard.
//!
//! A conversation moves between idle and awaiting a tool result. Alongside that it
//! counts tool calls and consecutive failures so a model stuck calling a broken tool
//! is stopped instead of looping forever.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{GatewayError, Result};
use crate::translate::canonical::{
    ContentBlock, Message, MessageContent, MessagesResponse, Role, StopReason, ToolResultContent,
};

/// Ceilings for the runaway-tool-loop guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLimits {
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Seconds a conversation may sit untouched before it is forgotten.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

fn default_max_tool_calls() -> u32 {
    50
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_idle_ttl_secs() -> u64 {
    3600
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_tool_calls: default_max_tool_calls(),
            max_consecutive_errors: default_max_consecutive_errors(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    pub has_tool_use: bool,
    pub has_tool_result: bool,
    pub last_tool_use_id: Option<String>,
    pub tool_call_count: u32,
    pub consecutive_errors: u32,
    /// Whether the most recent tool result was error-flagged.
    #[serde(skip)]
    last_result_failed: bool,
}

impl ConversationState {
    /// Nothing recorded yet; dropping this state loses nothing.
    pub fn is_untouched(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_awaiting_tool_result(&self) -> bool {
        self.has_tool_use && !self.has_tool_result
    }

    /// Record a tool invocation made by the model.
    pub fn record_tool_use(&mut self, tool_use_id: &str) {
        self.has_tool_use = true;
        self.has_tool_result = false;
        self.last_tool_use_id = Some(tool_use_id.to_string());
        self.tool_call_count += 1;
    }

    /// Note a tool result sent back by the client. Returns whether it answered the
    /// pending tool use.
    pub fn observe_tool_result(&mut self, tool_use_id: &str, is_error: bool) -> bool {
        let matches = self.is_awaiting_tool_result()
            && self.last_tool_use_id.as_deref() == Some(tool_use_id);
        if matches {
            self.has_tool_result = true;
            self.has_tool_use = false;
            self.last_result_failed = is_error;
            if is_error {
                self.consecutive_errors += 1;
            }
        }
        matches
    }

    /// Record a client-side tool failure reported directly to the gateway.
    pub fn record_tool_error(&mut self, tool_use_id: &str) {
        if !self.observe_tool_result(tool_use_id, true) {
            self.consecutive_errors += 1;
            self.last_result_failed = true;
        }
    }

    /// Record a classified backend failure. Only failures inside a tool exchange count.
    pub fn record_backend_error(&mut self) {
        if self.tool_call_count > 0 {
            self.consecutive_errors += 1;
        }
    }

    /// Record a successful backend response.
    pub fn record_response(&mut self, resp: &MessagesResponse) {
        if !self.last_result_failed {
            self.consecutive_errors = 0;
        }
        if resp.stop_reason == StopReason::ToolUse {
            if let Some(id) = resp.last_tool_use_id() {
                self.record_tool_use(id);
            }
        }
    }

    /// A conversation ends on a non-tool stop with nothing pending.
    pub fn is_terminal(&self, resp: &MessagesResponse) -> bool {
        resp.stop_reason != StopReason::ToolUse && !self.is_awaiting_tool_result()
    }

    /// Refuse to continue once either ceiling is crossed.
    pub fn check_limits(&self, limits: &ToolLimits) -> Result<()> {
        if self.tool_call_count > limits.max_tool_calls {
            return Err(GatewayError::tool_loop(format!(
                "{} tool calls exceed the limit of {}",
                self.tool_call_count, limits.max_tool_calls
            )));
        }
        if self.consecutive_errors >= limits.max_consecutive_errors {
            return Err(GatewayError::tool_loop(format!(
                "{} consecutive tool errors (limit {})",
                self.consecutive_errors, limits.max_consecutive_errors
            )));
        }
        Ok(())
    }

    /// Refuse a request that does not answer the pending tool use.
    pub fn check_pending(&self) -> Result<()> {
        if self.is_awaiting_tool_result() {
            let id = self.last_tool_use_id.as_deref().unwrap_or("unknown");
            return Err(GatewayError::conversation(format!(
                "waiting for a tool_result for tool_use '{id}'"
            )));
        }
        Ok(())
    }
}

/// Rebuild tool state from a full message history, for requests without a
/// conversation id.
pub fn analyze_messages(messages: &[Message]) -> ConversationState {
    let mut state = ConversationState::default();

    for message in messages {
        let MessageContent::Blocks(blocks) = &message.content else {
            continue;
        };
        match message.role {
            Role::Assistant => {
                let last_id = blocks.iter().rev().find_map(|b| match b {
                    ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                });
                if let Some(id) = last_id {
                    state.record_tool_use(id);
                }
            }
            Role::User => {
                for block in blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        is_error,
                        ..
                    } = block
                    {
                        let failed = is_error.unwrap_or(false);
                        if state.observe_tool_result(tool_use_id, failed) && !failed {
                            state.consecutive_errors = 0;
                        }
                    }
                }
            }
            Role::System => {}
        }
    }
    state
}

/// Concurrent map of conversation id to state.
///
/// Each conversation has its own async lock; requests for different conversations
/// never wait on each other. Conversations untouched for longer than the idle TTL
/// are swept out on later accesses.
#[derive(Debug)]
pub struct ConversationStore {
    states: DashMap<String, Slot>,
    idle_ttl: Duration,
    last_sweep: std::sync::Mutex<Instant>,
}

#[derive(Debug)]
struct Slot {
    state: Arc<Mutex<ConversationState>>,
    touched: Instant,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::with_idle_ttl(Duration::from_secs(default_idle_ttl_secs()))
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            states: DashMap::new(),
            idle_ttl,
            last_sweep: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Handle for `id`, created empty on first use.
    pub fn entry(&self, id: &str) -> Arc<Mutex<ConversationState>> {
        self.sweep_if_due();
        let now = Instant::now();
        let mut slot = self.states.entry(id.to_string()).or_insert_with(|| Slot {
            state: Arc::default(),
            touched: now,
        });
        slot.touched = now;
        Arc::clone(&slot.state)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<ConversationState>>> {
        self.states.get(id).map(|slot| Arc::clone(&slot.state))
    }

    pub fn remove(&self, id: &str) -> bool {
        self.states.remove(id).is_some()
    }

    /// Forget `id` if `handle` is still its state and no other request holds it.
    pub fn release(&self, id: &str, handle: &Arc<Mutex<ConversationState>>) -> bool {
        self.states
            .remove_if(id, |_, slot| Arc::ptr_eq(&slot.state, handle) && Arc::strong_count(handle) == 2)
            .is_some()
    }

    /// Drop conversations idle past the TTL that no request is using. Returns how
    /// many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.states.len();
        self.states.retain(|_, slot| {
            now.duration_since(slot.touched) < self.idle_ttl || Arc::strong_count(&slot.state) > 1
        });
        before.saturating_sub(self.states.len())
    }

    fn sweep_if_due(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last) < self.idle_ttl / 8 {
                return;
            }
            *last = now;
        }
        let evicted = self.evict_idle();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle conversations");
        }
    }

    pub fn clear(&self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Error-flagged tool result block fed back to the model after a tool failure.
pub fn error_tool_result(tool_use_id: &str, message: String) -> ContentBlock {
    ContentBlock::ToolResult {
        tool_use_id: tool_use_id.to_string(),
        content: Some(ToolResultContent::Text(message)),
        is_error: Some(true),
    }
}
