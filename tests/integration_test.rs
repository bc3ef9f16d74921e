use async_trait::async_trait;
use claude_gateway::config::GatewayConfig;
use claude_gateway::router::{RouterCell, RouterSettings, RouterStatus};
use claude_gateway::translate::canonical::*;
use claude_gateway::translate::streaming::replay_events;
use claude_gateway::{
    build_router, AppState, BackendError, BackendKind, BackendTarget, Gateway, GatewayError,
    SharedLogger, ToolError, Transport, TransportError,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RESPONSES_URL: &str =
    "https://res.cognitiveservices.azure.com/openai/responses?api-version=2025-03-01-preview";
const CHAT_URL: &str = "https://res.openai.azure.com";

type Reply = Result<Value, TransportError>;

/// Replays canned replies in order and records every call.
#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    /// Reply used once the script runs out.
    fallback: Option<Reply>,
    calls: Mutex<Vec<(BackendTarget, Value)>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    fn always(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            fallback: Some(reply),
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<(BackendTarget, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, target: &BackendTarget, body: &Value) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push((target.clone(), body.clone()));
        let next = self.replies.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
    }
}

fn direct_config(base_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.backend.base_url = Some(base_url.to_string());
    config.router.enabled = false;
    config.retry.jitter_factor = 0.0;
    config
}

fn gateway(config: GatewayConfig, transport: Arc<ScriptedTransport>) -> Gateway {
    Gateway::new(config, transport, SharedLogger::in_memory())
}

fn router_gateway(transport: Arc<ScriptedTransport>) -> Gateway {
    let config = direct_config(CHAT_URL);
    let cell = RouterCell::new(RouterSettings {
        enabled: true,
        base_url: Some(CHAT_URL.to_string()),
        credentials_present: true,
        api_version: "2025-01-01-preview".into(),
        big_model: "gpt-5".into(),
        small_model: "gpt-5-mini".into(),
    });
    Gateway::with_router(config, cell, transport, SharedLogger::in_memory())
}

fn hello() -> MessagesRequest {
    MessagesRequest::new("claude-sonnet-4.5", 1024, vec![Message::user("Hello")])
}

fn chat_text(text: &str) -> Value {
    json!({
        "id": "chatcmpl-42",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3}
    })
}

fn chat_tool_call(id: &str) -> Value {
    json!({
        "id": format!("chatcmpl-{id}"),
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{"id": id, "type": "function", "function": {"name": "ls", "arguments": "{\"dir\":\".\"}"}}]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

fn unavailable() -> Reply {
    Err(TransportError::Status {
        status: 503,
        body: r#"{"error":{"message":"busy"}}"#.into(),
        retry_after: None,
    })
}

/// Request continuing a tool exchange with a result for `tool_use_id`.
fn tool_result_turn(tool_use_id: &str, is_error: bool) -> MessagesRequest {
    let mut req = MessagesRequest::new("claude-sonnet-4.5", 1024, vec![Message::user("list files")]);
    req.messages.push(Message {
        role: Role::Assistant,
        content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: tool_use_id.into(),
            name: "ls".into(),
            input: json!({"dir": "."}),
        }]),
    });
    req.messages.push(Message {
        role: Role::User,
        content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(ToolResultContent::Text(if is_error { "permission denied" } else { "a.txt" }.into())),
            is_error: Some(is_error),
        }]),
    });
    req
}

// ---------------------------------------------------------------------------
// Backend round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_responses_backend_round_trip() {
    let transport = ScriptedTransport::new(vec![Ok(json!({
        "content": [{"type": "text", "text": "Hi!"}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 5}
    }))]);
    let gw = gateway(direct_config(RESPONSES_URL), Arc::clone(&transport));

    let resp = gw.handle(&hello(), None, &CancellationToken::new()).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    let (target, body) = &calls[0];
    assert_eq!(target.kind, BackendKind::Responses);
    assert_eq!(target.model, "gpt-5-codex");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["max_tokens"], 1024);

    assert_eq!(resp.content.len(), 1);
    assert!(matches!(&resp.content[0], ResponseContentBlock::Text { text } if text == "Hi!"));
    assert_eq!(resp.stop_reason, StopReason::EndTurn);
    assert_eq!(resp.usage.input_tokens, 10);
    assert_eq!(resp.model, "claude-sonnet-4.5");
}

#[tokio::test]
async fn test_chat_backend_round_trip() {
    let transport = ScriptedTransport::new(vec![Ok(chat_text("Hello there"))]);
    let mut config = direct_config(CHAT_URL);
    config.models.insert("claude-sonnet-4.5".into(), "gpt-4o".into());
    let gw = gateway(config, Arc::clone(&transport));

    let mut req = hello();
    req.system = Some(SystemContent::Text("Be brief.".into()));
    req.stream = true;
    let resp = gw.handle(&req, None, &CancellationToken::new()).await.unwrap();

    let (target, body) = &transport.calls()[0];
    assert_eq!(target.kind, BackendKind::Chat);
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["stream"], false);

    assert_eq!(resp.id, "msg_42");
    assert_eq!(resp.usage.output_tokens, 3);
    assert_eq!(resp.stop_reason, StopReason::EndTurn);
}

#[tokio::test]
async fn test_router_round_trip_uses_deployment() {
    let transport = ScriptedTransport::new(vec![Ok(chat_text("ok")), Ok(chat_text("ok"))]);
    let gw = router_gateway(Arc::clone(&transport));
    assert_eq!(gw.router_status(), RouterStatus::Pending);

    gw.handle(&hello(), None, &CancellationToken::new()).await.unwrap();
    let haiku = MessagesRequest::new("claude-3-5-haiku-20241022", 256, vec![Message::user("hi")]);
    gw.handle(&haiku, None, &CancellationToken::new()).await.unwrap();

    let calls = transport.calls();
    let (target, body) = &calls[0];
    assert_eq!(target.kind, BackendKind::Router);
    assert_eq!(body["model"], "azure/gpt-5");
    let deployment = target.deployment.as_ref().unwrap();
    assert_eq!(deployment.api_base, "https://res.openai.azure.com/openai/deployments/gpt-5");
    assert_eq!(calls[1].1["model"], "azure/gpt-5-mini");

    assert!(matches!(gw.router_status(), RouterStatus::Ready { .. }));
    gw.invalidate_router();
    assert_eq!(gw.router_status(), RouterStatus::Pending);
}

#[tokio::test]
async fn test_router_rejects_high_temperature() {
    let transport = ScriptedTransport::new(vec![]);
    let gw = router_gateway(Arc::clone(&transport));

    let mut req = hello();
    req.temperature = Some(1.5);
    let err = gw.handle(&req, None, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    assert!(transport.calls().is_empty());

    // The same value is fine for a direct backend
    let transport = ScriptedTransport::new(vec![Ok(chat_text("warm"))]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));
    assert!(gw.handle(&req, None, &CancellationToken::new()).await.is_ok());
}

#[tokio::test]
async fn test_invalid_requests_never_reach_backend() {
    let transport = ScriptedTransport::new(vec![]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));
    let cancel = CancellationToken::new();

    let empty = MessagesRequest::new("claude-sonnet-4.5", 1024, vec![]);
    assert_eq!(gw.handle(&empty, None, &cancel).await.unwrap_err().status_code(), 400);

    let zero = MessagesRequest::new("claude-sonnet-4.5", 0, vec![Message::user("x")]);
    assert_eq!(gw.handle(&zero, None, &cancel).await.unwrap_err().status_code(), 400);

    let mut bad_tool = hello();
    bad_tool.tools = Some(vec![Tool {
        name: String::new(),
        description: None,
        input_schema: json!({"type": "object"}),
    }]);
    let err = gw.handle(&bad_tool, None, &cancel).await.unwrap_err();
    assert!(matches!(err, GatewayError::Tool(ToolError::Validation { .. })));

    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_backend_body_is_translation_error() {
    let transport = ScriptedTransport::new(vec![Ok(Value::String("<html>oops</html>".into()))]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));

    let err = gw.handle(&hello(), None, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Translation { .. }));
    assert_eq!(transport.calls().len(), 1);
}

// ---------------------------------------------------------------------------
// Errors, retry, and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_retried() {
    let transport = ScriptedTransport::new(vec![unavailable(), unavailable(), Ok(chat_text("finally"))]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));

    let resp = gw.handle(&hello(), None, &CancellationToken::new()).await.unwrap();
    assert_eq!(transport.calls().len(), 3);
    assert!(matches!(&resp.content[0], ResponseContentBlock::Text { text } if text == "finally"));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_waits_for_server_delay() {
    let transport = ScriptedTransport::new(vec![
        Err(TransportError::Status {
            status: 429,
            body: r#"{"error":{"message":"slow down"}}"#.into(),
            retry_after: Some("30".into()),
        }),
        Ok(chat_text("ok")),
    ]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));

    let started = tokio::time::Instant::now();
    gw.handle(&hello(), None, &CancellationToken::new()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_surface_classified_error() {
    let transport = ScriptedTransport::always(unavailable());
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));

    let err = gw.handle(&hello(), None, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Backend(BackendError::Transient { status: 503, .. })));
    assert_eq!(err.error_type(), "overloaded_error");
    assert_eq!(transport.calls().len(), 4);
}

#[tokio::test]
async fn test_authentication_failure_is_not_retried() {
    let transport = ScriptedTransport::always(Err(TransportError::Status {
        status: 401,
        body: r#"{"error":{"code":"401","message":"Access denied due to invalid subscription key sk-abcdefghijklmnopqrstuvwx"}}"#.into(),
        retry_after: None,
    }));
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));

    let err = gw.handle(&hello(), None, &CancellationToken::new()).await.unwrap_err();
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(err.status_code(), 401);
    assert!(!err.client_message().contains("sk-abc"));
}

#[tokio::test]
async fn test_failed_first_turns_leave_no_conversation_state() {
    let transport = ScriptedTransport::always(Err(TransportError::Status {
        status: 401,
        body: r#"{"error":{"message":"Access denied"}}"#.into(),
        retry_after: None,
    }));
    let gw = gateway(direct_config(CHAT_URL), transport);
    let cancel = CancellationToken::new();

    for i in 0..100 {
        let id = format!("conv-{i}");
        assert!(gw.handle(&hello(), Some(&id), &cancel).await.is_err());
    }
    assert!(gw.conversations().is_empty());
}

#[tokio::test]
async fn test_failure_mid_exchange_keeps_conversation_state() {
    let transport = ScriptedTransport::new(vec![
        Ok(chat_tool_call("call_1")),
        Err(TransportError::Status {
            status: 400,
            body: r#"{"error":{"message":"bad input"}}"#.into(),
            retry_after: None,
        }),
    ]);
    let gw = gateway(direct_config(CHAT_URL), transport);
    let cancel = CancellationToken::new();

    gw.handle(&hello(), Some("conv-kept"), &cancel).await.unwrap();
    assert!(gw.handle(&tool_result_turn("call_1", false), Some("conv-kept"), &cancel).await.is_err());
    let state = gw.conversations().get("conv-kept").unwrap();
    assert_eq!(state.lock().await.tool_call_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_pending_retry() {
    let transport = ScriptedTransport::always(unavailable());
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = gw.handle(&hello(), None, &cancel).await.unwrap_err();
    assert!(matches!(err, GatewayError::Cancelled));
    assert_eq!(err.status_code(), 499);
    assert_eq!(transport.calls().len(), 1);

    // Nothing fires later either
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.calls().len(), 1);
}

// ---------------------------------------------------------------------------
// Conversation tracking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tool_exchange_lifecycle() {
    let transport = ScriptedTransport::new(vec![Ok(chat_tool_call("call_1")), Ok(chat_text("a.txt is there"))]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));
    let cancel = CancellationToken::new();

    let first = gw.handle(&hello(), Some("conv-1"), &cancel).await.unwrap();
    assert_eq!(first.stop_reason, StopReason::ToolUse);
    assert!(
        matches!(&first.content[0], ResponseContentBlock::ToolUse { id, input, .. } if id == "call_1" && input["dir"] == ".")
    );
    assert_eq!(gw.conversations().len(), 1);

    // A new user turn that ignores the pending tool call is refused
    let err = gw.handle(&hello(), Some("conv-1"), &cancel).await.unwrap_err();
    assert!(matches!(err, GatewayError::Conversation { .. }));

    let done = gw.handle(&tool_result_turn("call_1", false), Some("conv-1"), &cancel).await.unwrap();
    assert_eq!(done.stop_reason, StopReason::EndTurn);
    assert!(gw.conversations().is_empty());

    let (_, body) = &transport.calls()[1];
    let messages = body["messages"].as_array().unwrap();
    let tool_message = messages.iter().find(|m| m["role"] == "tool").unwrap();
    assert_eq!(tool_message["tool_call_id"], "call_1");
}

#[tokio::test]
async fn test_consecutive_tool_errors_trip_guard() {
    let transport = ScriptedTransport::new(vec![
        Ok(chat_tool_call("call_1")),
        Ok(chat_tool_call("call_2")),
        Ok(chat_tool_call("call_3")),
    ]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));
    let cancel = CancellationToken::new();

    gw.handle(&hello(), Some("conv-2"), &cancel).await.unwrap();
    gw.handle(&tool_result_turn("call_1", true), Some("conv-2"), &cancel).await.unwrap();
    gw.handle(&tool_result_turn("call_2", true), Some("conv-2"), &cancel).await.unwrap();

    let err = gw
        .handle(&tool_result_turn("call_3", true), Some("conv-2"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::ToolLoop { .. }));
    assert_eq!(err.status_code(), 409);
    assert_eq!(transport.calls().len(), 3);

    // Other conversations are unaffected
    let transport = ScriptedTransport::new(vec![Ok(chat_text("fine"))]);
    let gw2 = gateway(direct_config(CHAT_URL), transport);
    assert!(gw2.handle(&hello(), Some("conv-3"), &cancel).await.is_ok());
}

#[tokio::test]
async fn test_reported_tool_errors() {
    let gw = gateway(direct_config(CHAT_URL), ScriptedTransport::new(vec![]));

    let block = gw
        .report_tool_error("conv-4", "call_1", ToolError::timeout("ls", 30))
        .await
        .unwrap();
    match block {
        ContentBlock::ToolResult {
            tool_use_id,
            is_error,
            content: Some(ToolResultContent::Text(text)),
        } => {
            assert_eq!(tool_use_id, "call_1");
            assert_eq!(is_error, Some(true));
            assert!(text.contains("30"));
        }
        other => panic!("unexpected block {other:?}"),
    }

    gw.report_tool_error("conv-4", "call_2", ToolError::call("ls", "token sk-abcdefghijklmnopqrstuvwx rejected"))
        .await
        .unwrap();
    let err = gw
        .report_tool_error("conv-4", "call_3", ToolError::validation("ls", vec!["missing dir".into()]))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::ToolLoop { .. }));
}

#[tokio::test]
async fn test_stateless_requests_check_history() {
    let transport = ScriptedTransport::new(vec![Ok(chat_text("ok"))]);
    let gw = gateway(direct_config(CHAT_URL), Arc::clone(&transport));

    let mut req = tool_result_turn("call_1", false);
    req.messages.push(Message {
        role: Role::Assistant,
        content: MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: "call_2".into(),
            name: "ls".into(),
            input: json!({}),
        }]),
    });
    let err = gw.handle(&req, None, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Conversation { .. }));

    req.messages.pop();
    assert!(gw.handle(&req, None, &CancellationToken::new()).await.is_ok());
}

// ---------------------------------------------------------------------------
// Replay stream and HTTP surface
// ---------------------------------------------------------------------------

#[test]
fn test_replay_frames() {
    let resp = MessagesResponse {
        id: "msg_1".into(),
        response_type: "message".into(),
        role: Role::Assistant,
        content: vec![ResponseContentBlock::Text { text: "Hi!".into() }],
        model: "claude-sonnet-4.5".into(),
        stop_reason: StopReason::EndTurn,
        stop_sequence: None,
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
    };
    let events = replay_events(&resp);
    let names: Vec<&str> = events.iter().map(StreamEvent::event_name).collect();
    assert_eq!(names.first(), Some(&"message_start"));
    assert_eq!(names.last(), Some(&"message_stop"));
    let data: Vec<Value> = events.iter().map(|e| serde_json::to_value(e).unwrap()).collect();
    assert!(data.iter().any(|d| d["delta"]["text"] == "Hi!"));
    assert_eq!(data.last().unwrap(), &json!({"type": "message_stop"}));
}

async fn serve(gateway: Gateway) -> String {
    let state = Arc::new(AppState {
        gateway: Arc::new(gateway),
        logger: SharedLogger::in_memory(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_http_surface() {
    let transport = ScriptedTransport::new(vec![Ok(chat_text("Hi!")), Ok(chat_text("Hi again"))]);
    let base = serve(gateway(direct_config(CHAT_URL), transport)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&json!({"model": "claude-sonnet-4.5", "max_tokens": 64, "messages": [{"role": "user", "content": "Hello"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["content"][0]["text"], "Hi!");
    assert_eq!(body["stop_reason"], "end_turn");

    let resp = client
        .post(format!("{base}/v1/messages"))
        .header("x-conversation-id", "http-1")
        .json(&json!({"model": "claude-sonnet-4.5", "max_tokens": 64, "stream": true, "messages": [{"role": "user", "content": "Hello"}]}))
        .send()
        .await
        .unwrap();
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));
    let text = resp.text().await.unwrap();
    assert!(text.contains("event: message_start"));
    assert!(text.contains("Hi again"));
    assert!(text.contains("event: message_stop"));

    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&json!({"model": "claude-sonnet-4.5", "max_tokens": 64, "messages": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let resp = client
        .post(format!("{base}/v1/conversations/http-2/tool_errors"))
        .json(&json!({"kind": "timeout", "tool_use_id": "call_9", "tool_name": "ls", "timeout_secs": 5}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "tool_result");
    assert_eq!(body["is_error"], true);

    let status: Value = client.get(format!("{base}/router/status")).send().await.unwrap().json().await.unwrap();
    // Built (as disabled) by the first request
    assert_eq!(status["state"], "disabled");
    let health: Value = client.get(format!("{base}/health")).send().await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["router"]["state"], "disabled");

    let audit: Value = client.get(format!("{base}/audit?limit=2")).send().await.unwrap().json().await.unwrap();
    let entries = audit.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0]["message"].as_str().unwrap().contains("messages=0"));
    assert_eq!(entries[1]["level"], "info");
}

#[tokio::test]
async fn test_unparseable_bodies_are_rejected_cleanly() {
    let transport = ScriptedTransport::new(vec![]);
    let base = serve(gateway(direct_config(CHAT_URL), Arc::clone(&transport))).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&json!({
            "model": "claude-sonnet-4.5",
            "max_tokens": "sk-abcdefghijklmnopqrstuvwxyz012345",
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let text = resp.text().await.unwrap();
    assert!(!text.contains("sk-abc"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let resp = client
        .post(format!("{base}/v1/messages"))
        .json(&json!({
            "model": "claude-sonnet-4.5",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "Hello"}],
            "tools": [{"name": 3, "input_schema": {}}, {"name": "", "input_schema": {"type": "tuple"}}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("tools[0]"));
    assert!(message.contains("tools[1] '': Tool name must be a non-empty string"));
    assert!(message.contains("unsupported type"));

    assert!(transport.calls().is_empty());
}
