//! Token discovery: pure extraction of credentials from storage or a URL.
//! Expected absence is `None`, never an error.

use url::Url;

use crate::state::DashboardContext;
use crate::storage::{StorageArea, TokenEnvelope};

/// Fragment parameter carrying a host-delivered token (dashboard iframe).
const TOKEN_PARAM: &str = "token";
/// Fragment parameter carrying a one-time exchange code.
const SID_PARAM: &str = "withSid";
/// Query parameter carrying dashboard context metadata.
const CONTEXT_PARAM: &str = "_context";

/// Read and decode the persisted `{"token"}` envelope. Absent or malformed
/// content is treated as "no token".
pub fn token_from_storage(area: &dyn StorageArea, key: &str) -> Option<String> {
    let raw = area.get_item(key)?;
    match serde_json::from_str::<TokenEnvelope>(&raw) {
        Ok(envelope) if !envelope.token.is_empty() => Some(envelope.token),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(key, error = %e, "ignoring malformed token envelope");
            None
        }
    }
}

fn fragment_pairs(url: &Url) -> Vec<(String, String)> {
    let fragment = url.fragment().unwrap_or("");
    url::form_urlencoded::parse(fragment.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn fragment_param(href: &str, name: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    fragment_pairs(&url)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

/// Extract a token delivered directly in the URL fragment.
pub fn token_from_location(href: &str) -> Option<String> {
    fragment_param(href, TOKEN_PARAM)
}

/// Extract the one-time exchange code, but only when the location matches
/// the configured callback path. With no callback configured, any location
/// is eligible.
pub fn auth_code_from_callback(callback_url: Option<&str>, href: &str) -> Option<String> {
    if let Some(callback) = callback_url {
        let href_url = Url::parse(href).ok()?;
        let callback_url = Url::parse(callback).ok()?;
        if href_url.host_str() != callback_url.host_str()
            || href_url.path() != callback_url.path()
        {
            return None;
        }
    }
    fragment_param(href, SID_PARAM)
}

/// The same location with the exchange code and ephemeral fragment
/// parameters removed, suitable for history replacement by the caller.
pub fn cleaned_url(href: &str) -> String {
    let Ok(mut url) = Url::parse(href) else {
        return href.to_string();
    };
    let remaining: Vec<(String, String)> = fragment_pairs(&url)
        .into_iter()
        .filter(|(k, _)| k != TOKEN_PARAM && k != SID_PARAM)
        .collect();
    if remaining.is_empty() {
        url.set_fragment(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &remaining {
            serializer.append_pair(k, v);
        }
        let fragment = serializer.finish();
        url.set_fragment(Some(&fragment));
    }
    url.to_string()
}

/// Parse dashboard context metadata from the `_context` query parameter.
/// The target shape has no session-id field, so any `sid` the host included
/// is dropped here.
pub fn dashboard_context_from_location(href: &str) -> Option<DashboardContext> {
    let url = Url::parse(href).ok()?;
    let raw = url
        .query_pairs()
        .find(|(k, _)| k == CONTEXT_PARAM)
        .map(|(_, v)| v.into_owned())?;
    match serde_json::from_str::<DashboardContext>(&raw) {
        Ok(context) => Some(context),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed dashboard context");
            None
        }
    }
}
