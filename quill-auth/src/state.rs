use crate::error::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Marker substring identifying a "stamped" token. Stamped tokens are
/// re-issued periodically by the refresh coordinator. This is a legacy
/// string convention kept verbatim for wire compatibility.
pub const STAMP_MARKER: &str = "-st";

/// Whether a token carries the stamp marker.
pub fn is_stamped_token(token: &str) -> bool {
    token.contains(STAMP_MARKER)
}

/// The identity base of a token: everything before the first stamp marker.
/// Two tokens sharing a base are treated as the same identity.
pub fn token_base(token: &str) -> &str {
    match token.find(STAMP_MARKER) {
        Some(idx) => &token[..idx],
        None => token,
    }
}

/// Resolved current-user profile attached to a logged-in state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "profileImage")]
    pub profile_image: Option<String>,
    pub provider: Option<String>,
}

/// A login provider advertised by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginProvider {
    pub name: String,
    pub title: String,
    pub url: String,
}

/// How the current credentials were discovered. Cookie mode sends
/// credentialed requests instead of a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    LocalStorage,
    Cookie,
}

/// Metadata delivered by a host dashboard through the `_context` query
/// parameter. Any session-id field is stripped at parse time by simply not
/// being part of this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DashboardContext {
    pub mode: Option<String>,
    pub env: Option<String>,
    #[serde(rename = "orgId")]
    pub org_id: Option<String>,
}

/// The canonical auth lifecycle value. Exactly one variant is active at any
/// time; transitions never skip an intermediate (e.g. logout always passes
/// through `LoggedOut { is_destroying_session: true }` first).
#[derive(Debug, Clone)]
pub enum AuthState {
    LoggedIn {
        token: String,
        current_user: Option<UserProfile>,
        last_token_refresh: Option<DateTime<Utc>>,
    },
    LoggedOut {
        is_destroying_session: bool,
    },
    LoggingIn {
        is_exchanging_token: bool,
    },
    Error {
        error: Arc<AuthError>,
    },
}

impl AuthState {
    pub fn logged_in(token: impl Into<String>) -> Self {
        AuthState::LoggedIn {
            token: token.into(),
            current_user: None,
            last_token_refresh: None,
        }
    }

    pub fn logged_out() -> Self {
        AuthState::LoggedOut {
            is_destroying_session: false,
        }
    }

    pub fn error(error: AuthError) -> Self {
        AuthState::Error {
            error: Arc::new(error),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthState::LoggedIn { .. })
    }

    /// The active token, if any. Empty-token cookie sessions return `None`.
    pub fn token(&self) -> Option<&str> {
        match self {
            AuthState::LoggedIn { token, .. } if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    pub fn current_user(&self) -> Option<&UserProfile> {
        match self {
            AuthState::LoggedIn { current_user, .. } => current_user.as_ref(),
            _ => None,
        }
    }
}

/// The full unit held in the reactive store. Immutable configuration lives
/// on the auth store itself; this carries only what transitions may touch.
#[derive(Debug, Clone)]
pub struct AuthStoreState {
    pub auth_state: AuthState,
    pub auth_method: Option<AuthMethod>,
    pub providers: Option<Vec<LoginProvider>>,
    pub dashboard_context: Option<DashboardContext>,
}

impl AuthStoreState {
    pub fn new(auth_state: AuthState) -> Self {
        Self {
            auth_state,
            auth_method: None,
            providers: None,
            dashboard_context: None,
        }
    }

    pub fn with_auth_state(&self, auth_state: AuthState) -> Self {
        Self {
            auth_state,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamped_token_detection() {
        assert!(is_stamped_token("abc-st1"));
        assert!(!is_stamped_token("abc"));
        assert!(!is_stamped_token(""));
    }

    #[test]
    fn token_base_splits_on_first_marker() {
        assert_eq!(token_base("abc-st1"), "abc");
        assert_eq!(token_base("abc-st1-st2"), "abc");
        assert_eq!(token_base("xyz"), "xyz");
    }

    #[test]
    fn empty_cookie_token_is_not_a_bearer_token() {
        let state = AuthState::logged_in("");
        assert!(state.is_logged_in());
        assert_eq!(state.token(), None);
    }
}
