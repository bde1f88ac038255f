//! Studio reactive-source subscription: the CMS host pushes tokens; this is
//! the only subscription running in that mode.

use std::sync::Arc;

use crate::state::{AuthMethod, AuthState};
use crate::store::AuthInner;
use crate::strategy::TokenSource;

pub(crate) async fn run(inner: Arc<AuthInner>, mut source: TokenSource) {
    loop {
        let emitted = source.tokens.borrow_and_update().clone();
        apply(&inner, emitted, source.workspace_authenticated);
        if source.tokens.changed().await.is_err() {
            break;
        }
    }
}

fn apply(inner: &Arc<AuthInner>, emitted: Option<String>, workspace_authenticated: bool) {
    inner.state.set("studioSource/emission", move |prev| {
        let current_user = prev.auth_state.current_user().cloned();
        match &emitted {
            Some(token) => prev.with_auth_state(AuthState::LoggedIn {
                token: token.clone(),
                current_user,
                last_token_refresh: None,
            }),
            // Null with an authenticated workspace means cookie credentials
            // carry the session from here on.
            None if workspace_authenticated => {
                let mut next = prev.with_auth_state(AuthState::LoggedIn {
                    token: String::new(),
                    current_user,
                    last_token_refresh: None,
                });
                next.auth_method = Some(AuthMethod::Cookie);
                next
            }
            None => prev.with_auth_state(AuthState::logged_out()),
        }
    });
}
