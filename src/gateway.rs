//! The orchestrator: validate, select a backend, translate, send with retry, translate
//! back, and keep per-conversation tool state in step.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::classify_transport;
use crate::config::GatewayConfig;
use crate::conversation::{analyze_messages, error_tool_result, ConversationState, ConversationStore};
use crate::error::{GatewayError, Result, ToolError};
use crate::logging::{LogLevel, SharedLogger};
use crate::profiles;
use crate::retry::execute_with_retry;
use crate::router::{RouterCell, RouterSettings, RouterStatus, UnifiedRouter};
use crate::sanitize::sanitize_message;
use crate::selector::select_backend;
use crate::transport::{BackendTarget, Transport};
use crate::translate::canonical::{ContentBlock, MessagesRequest, MessagesResponse};
use crate::translate::{convert_request, convert_response, BackendKind, ConvertOptions};
use crate::validate::{check_tools, validate_request, validate_temperature};

const COMPONENT: &str = "gateway";

pub struct Gateway {
    config: GatewayConfig,
    transport: Arc<dyn Transport>,
    router: RouterCell,
    conversations: ConversationStore,
    logger: SharedLogger,
}

impl Gateway {
    pub fn new(config: GatewayConfig, transport: Arc<dyn Transport>, logger: SharedLogger) -> Self {
        let router = RouterCell::new(RouterSettings::from_config(&config));
        Self::with_router(config, router, transport, logger)
    }

    /// Build with an explicit router cell instead of one derived from `config`.
    pub fn with_router(
        config: GatewayConfig,
        router: RouterCell,
        transport: Arc<dyn Transport>,
        logger: SharedLogger,
    ) -> Self {
        let conversations = ConversationStore::with_idle_ttl(Duration::from_secs(config.tools.idle_ttl_secs));
        Self {
            config,
            transport,
            router,
            conversations,
            logger,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn router_status(&self) -> RouterStatus {
        self.router.status()
    }

    pub fn invalidate_router(&self) {
        self.router.invalidate();
    }

    /// Serve one canonical request.
    ///
    /// With a `conversation_id` the stored tool state for that conversation is locked
    /// for the whole call; without one, state is rebuilt from the message history.
    pub async fn handle(
        &self,
        req: &MessagesRequest,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<MessagesResponse> {
        let result = self.handle_inner(req, conversation_id, cancel).await;
        if let Err(e) = &result {
            self.logger.log_with_context(
                LogLevel::Warn,
                COMPONENT,
                format!("Request failed: {e}"),
                json!({
                    "model": req.model,
                    "conversation_id": conversation_id,
                    "status": e.status_code(),
                    "error_type": e.error_type(),
                }),
            );
        }
        result
    }

    async fn handle_inner(
        &self,
        req: &MessagesRequest,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<MessagesResponse> {
        validate_request(req)?;
        check_tools(req)?;

        let router = self.router.get();
        let kind = select_backend(self.config.backend.base_url.as_deref(), &req.model, router.is_some());
        validate_temperature(req, kind)?;

        let target = self.resolve_target(kind, &req.model, router.as_deref())?;
        let opts = convert_options(req, &target);

        let Some(id) = conversation_id else {
            let state = analyze_messages(&req.messages);
            self.check_guards(&state)?;
            return self.dispatch(req, &target, &opts, cancel).await;
        };

        let handle = self.conversations.entry(id);
        let mut state = handle.lock().await;
        for (tool_use_id, is_error) in req.trailing_tool_results() {
            if !state.observe_tool_result(tool_use_id, is_error) {
                debug!(conversation_id = id, tool_use_id, "Tool result does not answer the pending call");
            }
        }
        self.check_guards(&state)?;

        match self.dispatch(req, &target, &opts, cancel).await {
            Ok(resp) => {
                state.record_response(&resp);
                if state.is_terminal(&resp) {
                    drop(state);
                    self.conversations.remove(id);
                    debug!(conversation_id = id, "Conversation finished");
                }
                Ok(resp)
            }
            Err(e) => {
                if matches!(e, GatewayError::Backend(_)) {
                    state.record_backend_error();
                }
                if state.is_untouched() {
                    drop(state);
                    self.conversations.release(id, &handle);
                }
                Err(e)
            }
        }
    }

    /// Record a tool failure the client hit while executing a tool call.
    ///
    /// Returns the error-flagged tool result to send back to the model, or
    /// [`GatewayError::ToolLoop`] once the conversation has failed too often.
    pub async fn report_tool_error(
        &self,
        conversation_id: &str,
        tool_use_id: &str,
        error: ToolError,
    ) -> Result<ContentBlock> {
        let message = sanitize_message(&error.to_string());
        let handle = self.conversations.entry(conversation_id);
        let mut state = handle.lock().await;
        state.record_tool_error(tool_use_id);

        self.logger.log_with_context(
            LogLevel::Warn,
            COMPONENT,
            format!("Tool error reported: {message}"),
            json!({
                "conversation_id": conversation_id,
                "tool_use_id": tool_use_id,
                "tool_name": error.tool_name(),
                "consecutive_errors": state.consecutive_errors,
            }),
        );

        state.check_limits(&self.config.tools)?;
        Ok(error_tool_result(tool_use_id, message))
    }

    fn check_guards(&self, state: &ConversationState) -> Result<()> {
        state.check_pending()?;
        state.check_limits(&self.config.tools)
    }

    fn resolve_target(
        &self,
        kind: BackendKind,
        model: &str,
        router: Option<&UnifiedRouter>,
    ) -> Result<BackendTarget> {
        match (kind, router) {
            (BackendKind::Router, Some(router)) => {
                let deployment = router.resolve(model);
                Ok(BackendTarget {
                    kind,
                    model: deployment.model_name.clone(),
                    deployment: Some(deployment),
                })
            }
            (BackendKind::Router, None) => Err(GatewayError::config("unified router is not available")),
            _ => Ok(BackendTarget {
                kind,
                model: self.config.resolve_model(model),
                deployment: None,
            }),
        }
    }

    async fn dispatch(
        &self,
        req: &MessagesRequest,
        target: &BackendTarget,
        opts: &ConvertOptions,
        cancel: &CancellationToken,
    ) -> Result<MessagesResponse> {
        let mut body = convert_request(target.kind, req, opts)?;
        // Streaming clients get a replay of the finished response
        if let Some(fields) = body.as_object_mut() {
            fields.insert("stream".to_string(), Value::Bool(false));
        }

        info!(
            backend = %target.kind,
            model = %req.model,
            target = %target.model,
            messages = req.messages.len(),
            "Dispatching request"
        );

        let transport = &self.transport;
        let body = &body;
        let raw = execute_with_retry(&self.config.retry, cancel, |attempt| async move {
            debug!(attempt, "Backend attempt");
            transport.send(target, body).await.map_err(|e| {
                let classified = classify_transport(&e);
                warn!(kind = classified.kind(), status = classified.status(), "Backend call failed");
                GatewayError::Backend(classified)
            })
        })
        .await?;

        let resp = convert_response(target.kind, &raw, &req.model)?;
        self.logger.log_with_context(
            LogLevel::Info,
            COMPONENT,
            format!("{} response stop_reason={}", target.kind, resp.stop_reason.as_str()),
            json!({
                "model": req.model,
                "target": target.model,
                "input_tokens": resp.usage.input_tokens,
                "output_tokens": resp.usage.output_tokens,
            }),
        );
        Ok(resp)
    }
}

fn convert_options(req: &MessagesRequest, target: &BackendTarget) -> ConvertOptions {
    let mut opts = ConvertOptions::new(target.model.clone());
    opts.restricted_schema =
        profiles::requires_restricted_schema(&req.model) || profiles::requires_restricted_schema(&target.model);
    if target.kind == BackendKind::Router {
        opts.max_tokens_cap =
            profiles::router_token_cap(&target.model).or_else(|| profiles::router_token_cap(&req.model));
    }
    opts
}
