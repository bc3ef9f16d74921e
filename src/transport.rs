//! The seam between the gateway core and the network.
//!
//! The core hands a [`Transport`] a resolved [`BackendTarget`] and a JSON body and gets
//! back either a JSON body or a [`TransportError`]. [`HttpTransport`] is the production
//! implementation; tests substitute scripted ones.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::router::{Deployment, RESPONSES_API_VERSION};
use crate::translate::BackendKind;

/// Failure to obtain a successful response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP {status}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<String>,
    },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// Nothing to send to: no endpoint is configured for the target.
    #[error("no endpoint configured: {0}")]
    Unconfigured(String),
}

/// Everything a transport needs to know about where a body goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub kind: BackendKind,
    /// Backend model name as written into the body.
    pub model: String,
    /// Present for router dispatch.
    pub deployment: Option<Deployment>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: &BackendTarget, body: &Value) -> std::result::Result<Value, TransportError>;
}

/// Azure OpenAI over HTTPS, authenticated with the `api-key` header.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<String>,
    api_version: String,
    api_key: String,
}

impl HttpTransport {
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backend.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.backend.base_url.clone(),
            api_version: config.backend.api_version.clone(),
            api_key: config.resolve_api_key()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, target: &BackendTarget, body: &Value) -> std::result::Result<Value, TransportError> {
        let (url, api_version) = endpoint(self.base_url.as_deref(), &self.api_version, target)?;

        // The router's provider prefix is meaningless to Azure itself
        let mut body = body.clone();
        if let (Some(deployment), Some(fields)) = (&target.deployment, body.as_object_mut()) {
            fields.insert("model".to_string(), Value::String(deployment.deployment.clone()));
        }

        let mut request = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(version) = api_version {
            request = request.query(&[("api-version", version)]);
        }

        debug!(backend = %target.kind, url = %url, model = %target.model, "Sending backend request");
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(transport_error)?;
        debug!(status, body_len = text.len(), "Backend responded");

        if status >= 400 {
            return Err(TransportError::Status {
                status,
                body: text,
                retry_after,
            });
        }
        // A non-JSON success body is left for the converter to reject
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

/// URL for `target` plus the api-version query value, when the URL lacks one.
pub fn endpoint(
    base_url: Option<&str>,
    api_version: &str,
    target: &BackendTarget,
) -> std::result::Result<(String, Option<String>), TransportError> {
    if let Some(deployment) = &target.deployment {
        let api_base = deployment.api_base.trim_end_matches('/');
        let suffix = format!("/openai/deployments/{}", deployment.deployment);
        let url = if api_base.ends_with(&suffix) {
            format!("{api_base}/chat/completions")
        } else {
            format!("{api_base}{suffix}/chat/completions")
        };
        return Ok((url, Some(deployment.api_version.clone())));
    }

    let base = base_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| TransportError::Unconfigured("set backend.base_url or GATEWAY_BASE_URL".to_string()))?;
    let (url, default_version) = match target.kind {
        BackendKind::Responses => (base.to_string(), RESPONSES_API_VERSION),
        _ if base.contains("/chat/completions") => (base.to_string(), api_version),
        _ => (
            format!(
                "{}/openai/deployments/{}/chat/completions",
                base.trim_end_matches('/'),
                target.model
            ),
            api_version,
        ),
    };
    let version = (!url.contains("api-version=")).then(|| default_version.to_string());
    Ok((url, version))
}
