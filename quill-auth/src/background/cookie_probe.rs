//! Cookie-auth probe: one advisory, credentialed "who am I" request fired
//! when startup found no token. Failure is a silent no-op, never an error
//! transition.

use std::sync::Arc;

use crate::api::RequestAuth;
use crate::state::{AuthMethod, AuthState};
use crate::store::AuthInner;

pub(crate) async fn run(inner: Arc<AuthInner>) {
    match inner.options.api.current_user(RequestAuth::Cookie).await {
        Ok(user) if !user.id.is_empty() => {
            tracing::debug!(user_id = %user.id, "cookie auth probe succeeded");
            inner.state.set("cookieAuth/probed", move |prev| {
                match &prev.auth_state {
                    // Only upgrade an idle logged-out state; anything else
                    // means a real transition happened meanwhile.
                    AuthState::LoggedOut {
                        is_destroying_session: false,
                    } => {
                        let mut next = prev.with_auth_state(AuthState::LoggedIn {
                            token: String::new(),
                            current_user: Some(user.clone()),
                            last_token_refresh: None,
                        });
                        next.auth_method = Some(AuthMethod::Cookie);
                        next
                    }
                    _ => prev.clone(),
                }
            });
        }
        Ok(_) => {
            tracing::debug!("cookie auth probe returned no user id");
        }
        Err(e) => {
            tracing::debug!(error = %e, "cookie auth probe failed");
        }
    }
}
