use crate::error::{GatewayError, ToolError};
use crate::gateway::Gateway;
use crate::logging::{AuditEntry, SharedLogger};
use crate::translate::canonical::{ErrorResponse, MessagesRequest, MessagesResponse};
use crate::translate::streaming::replay_events;
use crate::validate::check_raw_tools;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Header that ties requests to one multi-turn tool exchange.
pub const CONVERSATION_HEADER: &str = "x-conversation-id";

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/v1/conversations/:id/tool_errors", post(handle_tool_error))
        .route("/health", get(handle_health))
        .route("/router/status", get(handle_router_status))
        .route("/router/invalidate", post(handle_router_invalidate))
        .route("/audit", get(handle_audit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = ErrorResponse::new(err.error_type(), err.client_message());
    (status, Json(body)).into_response()
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let err = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|raw| check_raw_tools(&raw).err())
                .unwrap_or_else(|| GatewayError::invalid_request(format!("Invalid request body: {e}")));
            state.logger.warn("server", format!("Rejected request body: {err}"));
            return error_response(&err);
        }
    };

    let conversation_id = headers
        .get(CONVERSATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={} conversation={}",
            req.model,
            req.stream,
            req.messages.len(),
            conversation_id.unwrap_or("-")
        ),
    );

    // Dropping this future (client went away) cancels any pending retry
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.gateway.handle(&req, conversation_id, &cancel).await {
        Ok(resp) if req.stream => replay_stream(&resp),
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(&e),
    }
}

fn replay_stream(resp: &MessagesResponse) -> Response {
    let events: Vec<Result<Event, Infallible>> = replay_events(resp)
        .into_iter()
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok(Event::default().event(event.event_name()).data(data))
        })
        .collect();

    Sse::new(futures::stream::iter(events)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ToolErrorReport {
    Call {
        tool_use_id: String,
        tool_name: String,
        message: String,
    },
    Validation {
        tool_use_id: String,
        tool_name: String,
        #[serde(default)]
        schema_errors: Vec<String>,
    },
    Timeout {
        tool_use_id: String,
        tool_name: String,
        timeout_secs: u64,
    },
}

impl ToolErrorReport {
    fn into_parts(self) -> (String, ToolError) {
        match self {
            Self::Call {
                tool_use_id,
                tool_name,
                message,
            } => (tool_use_id, ToolError::call(tool_name, message)),
            Self::Validation {
                tool_use_id,
                tool_name,
                schema_errors,
            } => (tool_use_id, ToolError::validation(tool_name, schema_errors)),
            Self::Timeout {
                tool_use_id,
                tool_name,
                timeout_secs,
            } => (tool_use_id, ToolError::timeout(tool_name, timeout_secs)),
        }
    }
}

async fn handle_tool_error(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Json(report): Json<ToolErrorReport>,
) -> Response {
    let (tool_use_id, error) = report.into_parts();
    match state
        .gateway
        .report_tool_error(&conversation_id, &tool_use_id, error)
        .await
    {
        Ok(block) => Json(block).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "router": state.gateway.router_status(),
        "conversations": state.gateway.conversations().len(),
    }))
}

async fn handle_router_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.gateway.router_status()))
}

async fn handle_router_invalidate(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.gateway.invalidate_router();
    state.logger.info("server", "Router cache invalidated by operator");
    Json(serde_json::json!(state.gateway.router_status()))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

/// Recent audit entries, newest first. Entries are already redacted.
async fn handle_audit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEntry>> {
    let limit = query.limit.unwrap_or(100).min(crate::logging::RETAINED_ENTRIES);
    Json(state.logger.recent(limit))
}
