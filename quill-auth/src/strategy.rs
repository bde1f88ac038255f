use tokio::sync::watch;

use crate::discovery;
use crate::options::AuthOptions;
use crate::state::{AuthState, AuthStoreState};
use crate::storage::studio_storage_key;

/// Push-based token stream supplied by a CMS host that owns the token
/// lifecycle. The receiver's current value counts as the first emission.
#[derive(Clone)]
pub struct TokenSource {
    pub tokens: watch::Receiver<Option<String>>,
    /// Host flag: the workspace authenticates via credentialed cookies even
    /// when no token is emitted.
    pub workspace_authenticated: bool,
}

/// Hosting context, selected once at instance construction. Each variant
/// resolves an initial state synchronously; the auth store wires the
/// subscriptions appropriate to the variant.
pub enum AuthStrategy {
    /// Standalone browser/native app. May read persisted storage.
    Standalone,
    /// App embedded in a host dashboard iframe. The dashboard is the token
    /// authority; storage is never read and refreshes take no lock.
    Dashboard,
    /// CMS authoring host. With a reactive token source the host owns the
    /// lifecycle entirely; without one this falls back to standalone
    /// behavior plus a cookie-auth probe.
    Studio { token_source: Option<TokenSource> },
}

impl AuthStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AuthStrategy::Standalone => "standalone",
            AuthStrategy::Dashboard => "dashboard",
            AuthStrategy::Studio { .. } => "studio",
        }
    }

    pub fn is_dashboard(&self) -> bool {
        matches!(self, AuthStrategy::Dashboard)
    }

    /// The storage key this strategy persists under. Studio fallback mode
    /// scopes the key per project.
    pub fn storage_key(&self, options: &AuthOptions, project_id: &str) -> String {
        match self {
            AuthStrategy::Studio { token_source: None } => studio_storage_key(project_id),
            _ => options.storage_key.clone(),
        }
    }

    /// Compute the initial store state synchronously. Resolution order per
    /// variant is deterministic; a provided token always wins.
    pub fn resolve_initial_state(&self, options: &AuthOptions, storage_key: &str) -> AuthStoreState {
        let location = options.location.as_deref();
        let auth_state = match self {
            AuthStrategy::Standalone => self
                .provided_token_state(options)
                .or_else(|| location_state(options, location))
                .or_else(|| storage_state(options, storage_key))
                .unwrap_or_else(AuthState::logged_out),

            AuthStrategy::Dashboard => self
                .provided_token_state(options)
                .or_else(|| location_state(options, location))
                .unwrap_or_else(AuthState::logged_out),

            AuthStrategy::Studio {
                token_source: Some(_),
            } => AuthState::LoggingIn {
                is_exchanging_token: false,
            },

            AuthStrategy::Studio { token_source: None } => self
                .provided_token_state(options)
                .or_else(|| storage_state(options, storage_key))
                .unwrap_or_else(AuthState::logged_out),
        };

        let mut state = AuthStoreState::new(auth_state);
        state.auth_method = options.auth_method;
        if self.is_dashboard() {
            state.dashboard_context =
                location.and_then(discovery::dashboard_context_from_location);
        }
        state
    }

    fn provided_token_state(&self, options: &AuthOptions) -> Option<AuthState> {
        options
            .provided_token
            .as_ref()
            .map(|token| AuthState::logged_in(token.clone()))
    }
}

fn location_state(options: &AuthOptions, location: Option<&str>) -> Option<AuthState> {
    let href = location?;
    if let Some(token) = discovery::token_from_location(href) {
        return Some(AuthState::logged_in(token));
    }
    discovery::auth_code_from_callback(options.callback_url.as_deref(), href).map(|_| {
        AuthState::LoggingIn {
            is_exchanging_token: false,
        }
    })
}

fn storage_state(options: &AuthOptions, storage_key: &str) -> Option<AuthState> {
    let area = options.storage.as_ref()?;
    discovery::token_from_storage(area.as_ref(), storage_key).map(AuthState::logged_in)
}
