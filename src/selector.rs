//! Decide which backend a request goes to.

use crate::profiles;
use crate::translate::BackendKind;

/// True when the URL's path points at a Responses-style endpoint. The query string
/// and fragment are ignored.
pub fn is_responses_url(base_url: &str) -> bool {
    match reqwest::Url::parse(base_url.trim()) {
        Ok(url) => url.path().contains("/responses"),
        Err(_) => base_url
            .split(['?', '#'])
            .next()
            .is_some_and(|path| path.contains("/responses")),
    }
}

/// True when a base URL is configured and it is not a Responses endpoint.
pub fn is_chat_url(base_url: Option<&str>) -> bool {
    base_url.is_some_and(|url| !url.trim().is_empty() && !is_responses_url(url))
}

pub use profiles::prefers_responses_api;

/// Pick the backend for one request.
///
/// An available router always wins. Otherwise a configured URL decides, even when the
/// model family would prefer the other API; with no URL the model family decides.
pub fn select_backend(base_url: Option<&str>, model: &str, router_available: bool) -> BackendKind {
    if router_available {
        return BackendKind::Router;
    }

    let prefers_responses = prefers_responses_api(model);
    match base_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            let kind = if is_responses_url(url) {
                BackendKind::Responses
            } else {
                BackendKind::Chat
            };
            if prefers_responses != (kind == BackendKind::Responses) {
                tracing::debug!(
                    model,
                    backend = %kind,
                    "Configured endpoint overrides the model's preferred API"
                );
            }
            kind
        }
        None if prefers_responses => BackendKind::Responses,
        None => BackendKind::Chat,
    }
}
