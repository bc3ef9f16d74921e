//! Unified router lifecycle.
//!
//! The router handle is built lazily on first use, validated, and cached for the life
//! of the process. A failed build is cached too, so a misconfiguration is reported once
//! rather than on every request. [`RouterCell::invalidate`] drops the cached outcome so
//! the next caller rebuilds it.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{deployment_for, GatewayConfig};
use crate::profiles;

/// API version Azure requires for deployments behind a Responses endpoint.
pub const RESPONSES_API_VERSION: &str = "2025-03-01-preview";

const AZURE_HOST_SUFFIXES: &[&str] = &[".cognitiveservices.azure.com", ".openai.azure.com"];

/// Inputs for building the router, captured from configuration.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub credentials_present: bool,
    pub api_version: String,
    pub big_model: String,
    pub small_model: String,
}

impl RouterSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            enabled: config.router.enabled,
            base_url: config.backend.base_url.clone(),
            credentials_present: config.has_credentials(),
            api_version: config.backend.api_version.clone(),
            big_model: config.router.big_model.clone(),
            small_model: config.router.small_model.clone(),
        }
    }
}

/// Endpoint details for one deployment reachable through the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    /// Router model name, e.g. `azure/gpt-5-codex`.
    pub model_name: String,
    pub deployment: String,
    pub api_base: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct UnifiedRouter {
    base: String,
    responses_endpoint: bool,
    api_version: String,
    big_model: String,
    small_model: String,
}

impl UnifiedRouter {
    /// Validate `settings` and build the router, or report every problem found.
    pub fn build(settings: &RouterSettings) -> Result<Self, Vec<String>> {
        let problems = validate(settings);
        if !problems.is_empty() {
            return Err(problems);
        }
        let raw = settings.base_url.as_deref().unwrap_or_default();
        let responses_endpoint = raw.contains("/openai/responses");
        // Query string (api-version) is carried separately
        let without_query = raw.split('?').next().unwrap_or(raw);
        let base = without_query
            .replace("/openai/responses", "")
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            base,
            responses_endpoint,
            api_version: settings.api_version.clone(),
            big_model: settings.big_model.clone(),
            small_model: settings.small_model.clone(),
        })
    }

    /// Map a canonical model name onto a configured deployment.
    ///
    /// Opus and sonnet go to the big deployment, haiku to the small one, configured
    /// deployment names pass through, and anything else falls back to big.
    pub fn resolve(&self, model: &str) -> Deployment {
        let bare = profiles::bare_model_name(model);
        let deployment = if bare == self.big_model || bare == self.small_model {
            bare
        } else {
            deployment_for(bare, &self.big_model, &self.small_model).unwrap_or(self.big_model.as_str())
        };

        let (api_base, api_version) = if self.responses_endpoint {
            (self.base.clone(), RESPONSES_API_VERSION.to_string())
        } else {
            (
                format!("{}/openai/deployments/{deployment}", self.base),
                self.api_version.clone(),
            )
        };

        Deployment {
            model_name: format!("azure/{deployment}"),
            deployment: deployment.to_string(),
            api_base,
            api_version,
        }
    }

    pub fn deployments(&self) -> Vec<&str> {
        let mut names = vec![self.big_model.as_str()];
        if self.small_model != self.big_model {
            names.push(self.small_model.as_str());
        }
        names
    }
}

fn validate(settings: &RouterSettings) -> Vec<String> {
    let mut problems = Vec::new();

    match settings.base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        None => problems.push("base URL is not configured".to_string()),
        Some(raw) => match reqwest::Url::parse(raw) {
            Err(e) => problems.push(format!("base URL is not a valid URL: {e}")),
            Ok(url) => {
                if url.scheme() != "https" {
                    problems.push("base URL must use https".to_string());
                }
                let host = url.host_str().unwrap_or_default();
                if !AZURE_HOST_SUFFIXES.iter().any(|s| host.ends_with(s)) {
                    problems.push(format!("base URL host '{host}' is not an Azure OpenAI endpoint"));
                }
            }
        },
    }
    if settings.big_model.trim().is_empty() {
        problems.push("big_model deployment name is empty".to_string());
    }
    if settings.small_model.trim().is_empty() {
        problems.push("small_model deployment name is empty".to_string());
    }
    problems
}

#[derive(Debug, Clone)]
enum Slot {
    Unbuilt,
    Ready(Arc<UnifiedRouter>),
    Disabled,
    Unavailable(Vec<String>),
}

/// Reported state of the router cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RouterStatus {
    Pending,
    Ready { deployments: Vec<String> },
    Disabled,
    Unavailable { reasons: Vec<String> },
}

/// Write-once, read-many holder for the router handle.
#[derive(Debug)]
pub struct RouterCell {
    settings: RouterSettings,
    slot: RwLock<Slot>,
}

impl RouterCell {
    pub fn new(settings: RouterSettings) -> Self {
        Self {
            settings,
            slot: RwLock::new(Slot::Unbuilt),
        }
    }

    /// The router, building it on first call. `None` when disabled or unusable.
    pub fn get(&self) -> Option<Arc<UnifiedRouter>> {
        {
            let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            match &*slot {
                Slot::Ready(router) => return Some(Arc::clone(router)),
                Slot::Disabled | Slot::Unavailable(_) => return None,
                Slot::Unbuilt => {}
            }
        }

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have built it while we waited for the write lock
        if matches!(*slot, Slot::Unbuilt) {
            *slot = self.build();
        }
        match &*slot {
            Slot::Ready(router) => Some(Arc::clone(router)),
            _ => None,
        }
    }

    /// Forget the cached outcome; the next [`get`](Self::get) rebuilds.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Slot::Unbuilt;
        info!("Router cache invalidated");
    }

    pub fn status(&self) -> RouterStatus {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Slot::Unbuilt => RouterStatus::Pending,
            Slot::Ready(router) => RouterStatus::Ready {
                deployments: router.deployments().into_iter().map(String::from).collect(),
            },
            Slot::Disabled => RouterStatus::Disabled,
            Slot::Unavailable(reasons) => RouterStatus::Unavailable {
                reasons: reasons.clone(),
            },
        }
    }

    fn build(&self) -> Slot {
        if !self.settings.enabled {
            info!("Unified router disabled by configuration");
            return Slot::Disabled;
        }
        if !self.settings.credentials_present {
            warn!("Unified router unavailable: missing credentials");
            return Slot::Unavailable(vec!["credentials are not configured".to_string()]);
        }
        match UnifiedRouter::build(&self.settings) {
            Ok(router) => {
                info!(
                    big = %router.big_model,
                    small = %router.small_model,
                    responses = router.responses_endpoint,
                    "Unified router ready"
                );
                Slot::Ready(Arc::new(router))
            }
            Err(problems) => {
                warn!(problems = ?problems, "Unified router configuration rejected");
                Slot::Unavailable(problems)
            }
        }
    }
}
