//! Storage event bridge: folds token changes written by other tabs/windows
//! into local state.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::discovery;
use crate::state::{is_stamped_token, token_base, AuthState, UserProfile};
use crate::storage::StorageEventHub;
use crate::store::AuthInner;

pub(crate) async fn run(inner: Arc<AuthInner>, hub: StorageEventHub) {
    let Some(area) = inner.options.storage.clone() else {
        return;
    };
    let mut rx = hub.subscribe();

    loop {
        match rx.recv().await {
            Ok(event) => {
                if event.area_id != area.area_id() || event.key != inner.storage_key {
                    continue;
                }
                // Re-read rather than trusting the event payload; storage is
                // last-write-wins across contexts.
                let token = discovery::token_from_storage(area.as_ref(), &inner.storage_key);
                tracing::debug!(present = token.is_some(), "external token change");
                inner.state.set("storageEvent", move |prev| match &token {
                    Some(new_token) => {
                        let current_user = preserved_user(&prev.auth_state, new_token);
                        prev.with_auth_state(AuthState::LoggedIn {
                            token: new_token.clone(),
                            current_user,
                            last_token_refresh: None,
                        })
                    }
                    None => prev.with_auth_state(AuthState::logged_out()),
                });
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "storage event stream lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Keep the previous user only when the new token is stamped or shares the
/// old token's unstamped base (same identity).
fn preserved_user(prev: &AuthState, new_token: &str) -> Option<UserProfile> {
    match prev {
        AuthState::LoggedIn {
            token: old_token,
            current_user,
            ..
        } if is_stamped_token(new_token) || token_base(new_token) == token_base(old_token) => {
            current_user.clone()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_user;

    fn logged_in_with_user(token: &str) -> AuthState {
        AuthState::LoggedIn {
            token: token.to_string(),
            current_user: Some(test_user("u1")),
            last_token_refresh: None,
        }
    }

    #[test]
    fn same_base_stamped_token_preserves_user() {
        let prev = logged_in_with_user("abc-st1");
        assert!(preserved_user(&prev, "abc-st2").is_some());
    }

    #[test]
    fn different_base_unstamped_token_resets_user() {
        let prev = logged_in_with_user("abc-st1");
        assert!(preserved_user(&prev, "xyz").is_none());
    }

    #[test]
    fn different_base_stamped_token_preserves_user() {
        let prev = logged_in_with_user("abc-st1");
        assert!(preserved_user(&prev, "xyz-st1").is_some());
    }

    #[test]
    fn non_logged_in_state_has_no_user_to_preserve() {
        assert!(preserved_user(&AuthState::logged_out(), "abc-st1").is_none());
    }
}
