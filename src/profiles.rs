//! Built-in model family profiles.
//!
//! Each profile says what a model family needs from the gateway: whether it is served
//! by the Responses API, whether its tool schemas must be cleaned, and whether the
//! router caps its output tokens. Lookups go through this table only, so routing by
//! model name is explicit and covered by tests.

/// How a profile's pattern is compared against a model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    Exact,
    Prefix,
}

#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub pattern: &'static str,
    pub matching: Match,
    pub prefers_responses: bool,
    pub restricted_schema: bool,
    pub max_output_tokens: Option<u64>,
}

const fn profile(
    pattern: &'static str,
    matching: Match,
    prefers_responses: bool,
    restricted_schema: bool,
    max_output_tokens: Option<u64>,
) -> ModelProfile {
    ModelProfile {
        pattern,
        matching,
        prefers_responses,
        restricted_schema,
        max_output_tokens,
    }
}

/// Token cap the router applies to OpenAI- and Gemini-family models.
pub const ROUTER_TOKEN_CAP: u64 = 16_384;

// Exact entries come first so e.g. `gpt-5-chat` is not swallowed by a `gpt-5` prefix.
const PROFILES: &[ModelProfile] = &[
    profile("gpt-5", Match::Exact, true, false, None),
    profile("gpt-5-chat", Match::Prefix, false, false, None),
    profile("gpt-5-code", Match::Prefix, true, false, None),
    profile("o1", Match::Exact, true, false, None),
    profile("o1-mini", Match::Exact, true, false, None),
    profile("o1-pro", Match::Exact, true, false, None),
    profile("o3", Match::Exact, true, false, None),
    profile("o3-", Match::Prefix, true, false, None),
    profile("o4-", Match::Prefix, true, false, None),
    profile("gpt-4", Match::Prefix, false, false, None),
    profile("gemini", Match::Prefix, false, true, None),
];

impl ModelProfile {
    fn matches(&self, model: &str) -> bool {
        match self.matching {
            Match::Exact => model == self.pattern,
            Match::Prefix => model.starts_with(self.pattern),
        }
    }

    /// Look up the profile for a model name, ignoring any provider prefix.
    #[must_use]
    pub fn lookup(model: &str) -> Option<&'static ModelProfile> {
        let name = bare_model_name(model).to_lowercase();
        PROFILES.iter().find(|p| p.matches(&name))
    }
}

/// Strip a provider prefix such as `openai/` or `azure/`.
pub fn bare_model_name(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

/// Whether the model family is known to require (or benefit from) the Responses API.
pub fn prefers_responses_api(model: &str) -> bool {
    ModelProfile::lookup(model).is_some_and(|p| p.prefers_responses)
}

/// Whether tool schemas sent for this model must be cleaned.
pub fn requires_restricted_schema(model: &str) -> bool {
    model.starts_with("gemini/") || ModelProfile::lookup(model).is_some_and(|p| p.restricted_schema)
}

/// Output-token cap the router enforces for provider-prefixed OpenAI/Gemini models.
pub fn router_token_cap(model: &str) -> Option<u64> {
    if model.starts_with("openai/") || model.starts_with("gemini/") {
        return Some(ROUTER_TOKEN_CAP);
    }
    ModelProfile::lookup(model).and_then(|p| p.max_output_tokens)
}
