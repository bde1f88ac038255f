//! Current-user sync: whenever state is logged in without a resolved user,
//! fetch the profile and attach it to the state that is still current.

use std::sync::Arc;

use crate::api::RequestAuth;
use crate::state::{AuthMethod, AuthState};
use crate::store::AuthInner;

pub(crate) async fn run(inner: Arc<AuthInner>) {
    let mut rx = inner.state.observe();
    // Dedup key: repeated identical states must not re-fetch.
    let mut last_fetched: Option<(String, Option<AuthMethod>)> = None;

    loop {
        let snapshot = rx.borrow_and_update().clone();
        match &snapshot.auth_state {
            AuthState::LoggedIn {
                token,
                current_user: None,
                ..
            } => {
                let key = (token.clone(), snapshot.auth_method);
                if last_fetched.as_ref() != Some(&key) {
                    last_fetched = Some(key.clone());
                    fetch_and_attach(&inner, &key.0, snapshot.auth_method).await;
                    // The fetch mutated state; re-evaluate before waiting.
                    continue;
                }
            }
            AuthState::LoggedIn { .. } => {}
            // Leaving LoggedIn resets the dedup key, so re-entering the
            // same session fetches again.
            _ => last_fetched = None,
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn fetch_and_attach(inner: &Arc<AuthInner>, token: &str, method: Option<AuthMethod>) {
    let auth = RequestAuth::for_session(token, method);
    match inner.options.api.current_user(auth).await {
        Ok(user) => {
            tracing::debug!(user_id = %user.id, "resolved current user");
            let expected_token = token.to_string();
            inner.state.set("currentUser/fetched", move |prev| {
                match &prev.auth_state {
                    // Only attach if the same session is still current.
                    AuthState::LoggedIn {
                        token,
                        current_user: None,
                        last_token_refresh,
                    } if *token == expected_token => prev.with_auth_state(AuthState::LoggedIn {
                        token: token.clone(),
                        current_user: Some(user.clone()),
                        last_token_refresh: *last_token_refresh,
                    }),
                    _ => prev.clone(),
                }
            });
        }
        Err(e) => {
            tracing::warn!(error = %e, "current user fetch failed");
            let error_state = AuthState::error(e);
            inner.state.set("currentUser/error", move |prev| {
                prev.with_auth_state(error_state.clone())
            });
        }
    }
}
