use crate::conversation::ToolLimits;
use crate::error::{GatewayError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Env var that turns the unified router off regardless of the file.
pub const DISABLE_ROUTER_ENV: &str = "GATEWAY_DISABLE_ROUTER";
/// Env var that replaces `backend.base_url`.
pub const BASE_URL_ENV: &str = "GATEWAY_BASE_URL";

/// Gateway settings. Every section and field is optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub port: u16,
    pub backend: BackendConfig,
    pub router: RouterConfig,
    /// Exact canonical model name -> backend model/deployment name.
    pub models: HashMap<String, String>,
    pub retry: RetryPolicy,
    pub tools: ToolLimits,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8082,
            backend: BackendConfig::default(),
            router: RouterConfig::default(),
            models: HashMap::new(),
            retry: RetryPolicy::default(),
            tools: ToolLimits::default(),
        }
    }
}

/// The Azure endpoint used when the router is off or unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the env var holding the key; the key itself never lives in the file.
    pub api_key_env: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "AZURE_OPENAI_API_KEY".to_string(),
            api_version: "2025-01-01-preview".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub enabled: bool,
    /// Deployment serving opus/sonnet-class requests.
    pub big_model: String,
    /// Deployment serving haiku-class requests.
    pub small_model: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            big_model: DEFAULT_DEPLOYMENT.to_string(),
            small_model: DEFAULT_DEPLOYMENT.to_string(),
        }
    }
}

const DEFAULT_DEPLOYMENT: &str = "gpt-5-codex";

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::config(format!("cannot read {}: {e}", path.display())))?;
        Ok(toml::from_str(&text)?)
    }

    /// Load the explicit file, else the first file on the search path, else defaults;
    /// then apply environment overrides.
    ///
    /// An explicit path that cannot be read is an error. With no file anywhere the
    /// gateway can still be driven entirely from the environment.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load(path)?,
            None => match config_search_paths().into_iter().find(|p| p.is_file()) {
                Some(found) => {
                    tracing::info!(path = %found.display(), "Loading config");
                    Self::load(&found)?
                }
                None => {
                    tracing::warn!("No config file found, using defaults and environment");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment outside tests).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if lookup(DISABLE_ROUTER_ENV).is_some_and(|v| is_truthy(&v)) {
            self.router.enabled = false;
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.backend.base_url = Some(url);
        }
    }

    /// The configured API key. The value is only ever forwarded, never inspected.
    pub fn resolve_api_key(&self) -> Result<String> {
        let var = &self.backend.api_key_env;
        std::env::var(var).map_err(|_| GatewayError::config(format!("API key variable {var} is not set")))
    }

    pub fn has_credentials(&self) -> bool {
        std::env::var(&self.backend.api_key_env).is_ok_and(|k| !k.is_empty())
    }

    /// Backend model for a canonical model name on the direct (non-router) backends.
    pub fn resolve_model(&self, model: &str) -> String {
        if let Some(mapped) = self.models.get(model) {
            return mapped.clone();
        }
        deployment_for(model, &self.router.big_model, &self.router.small_model)
            .unwrap_or(model)
            .to_string()
    }
}

/// Deployment for a Claude-family model name, if it is one.
pub(crate) fn deployment_for<'a>(model: &str, big: &'a str, small: &'a str) -> Option<&'a str> {
    let lower = model.to_lowercase();
    if lower.contains("haiku") {
        Some(small)
    } else if lower.contains("sonnet") || lower.contains("opus") {
        Some(big)
    } else {
        None
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Candidate config files, highest priority first.
pub fn config_search_paths() -> Vec<PathBuf> {
    const FILE: &str = "claude-gateway.toml";
    let home = std::env::var_os("HOME").map(PathBuf::from);

    let mut paths = vec![PathBuf::from(FILE)];
    paths.extend(
        platform_config_dirs(home.as_deref())
            .into_iter()
            .map(|dir| dir.join("claude-gateway").join("config.toml")),
    );
    paths.extend(home.map(|h| h.join(format!(".{FILE}"))));
    paths
}

fn platform_config_dirs(home: Option<&Path>) -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        return home.map(|h| h.join("Library/Application Support")).into_iter().collect();
    }
    let xdg = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
    xdg.into_iter().chain(home.map(|h| h.join(".config"))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[backend]
base_url = "https://res.cognitiveservices.azure.com/openai/responses?api-version=2025-03-01-preview"
api_key_env = "MY_AZURE_KEY"

[router]
enabled = false
big_model = "gpt-5"

[models]
"claude-sonnet-4.5" = "gpt-5-codex"

[retry]
max_retries = 5

[tools]
max_consecutive_errors = 2
"#
        )
        .unwrap();

        let config = GatewayConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.backend.api_key_env, "MY_AZURE_KEY");
        assert_eq!(config.backend.api_version, "2025-01-01-preview");
        assert!(!config.router.enabled);
        assert_eq!(config.router.big_model, "gpt-5");
        assert_eq!(config.router.small_model, "gpt-5-codex");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.tools.max_consecutive_errors, 2);
        assert_eq!(config.tools.max_tool_calls, 50);
        assert_eq!(config.tools.idle_ttl_secs, 3600);
        assert_eq!(config.resolve_model("claude-sonnet-4.5"), "gpt-5-codex");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let f = NamedTempFile::new().unwrap();
        let config = GatewayConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 8082);
        assert!(config.router.enabled);
        assert!(config.backend.base_url.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            GatewayConfig::find_and_load(Some(missing.as_path())),
            Err(GatewayError::Config { .. })
        ));
    }

    #[test]
    fn test_search_paths_start_in_cwd() {
        let paths = config_search_paths();
        assert_eq!(paths[0], PathBuf::from("claude-gateway.toml"));
        if std::env::var_os("HOME").is_some() {
            assert!(paths.last().unwrap().ends_with(".claude-gateway.toml"));
        }
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "port = \"not a number\"").unwrap();
        assert!(matches!(GatewayConfig::load(f.path()), Err(GatewayError::Toml(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        config.apply_env_overrides(|key| match key {
            DISABLE_ROUTER_ENV => Some("1".to_string()),
            BASE_URL_ENV => Some("https://x.openai.azure.com".to_string()),
            _ => None,
        });
        assert!(!config.router.enabled);
        assert_eq!(config.backend.base_url.as_deref(), Some("https://x.openai.azure.com"));

        let mut config = GatewayConfig::default();
        config.apply_env_overrides(|key| (key == DISABLE_ROUTER_ENV).then(|| "false".to_string()));
        assert!(config.router.enabled);
    }

    #[test]
    fn test_resolve_model_families() {
        let mut config = GatewayConfig::default();
        config.router.big_model = "big".into();
        config.router.small_model = "small".into();

        assert_eq!(config.resolve_model("claude-3-5-haiku-20241022"), "small");
        assert_eq!(config.resolve_model("claude-opus-4"), "big");
        assert_eq!(config.resolve_model("gpt-4o"), "gpt-4o");
    }
}
