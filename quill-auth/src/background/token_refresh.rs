//! Token refresh coordinator: re-issues stamped tokens on a fixed interval,
//! using a named advisory lock so at most one context refreshes at a time.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::state::{is_stamped_token, AuthState, AuthStoreState};
use crate::store::AuthInner;

pub(crate) const REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

fn active(state: &AuthStoreState) -> bool {
    matches!(
        &state.auth_state,
        AuthState::LoggedIn { token, .. } if is_stamped_token(token)
    )
}

/// `use_lock` is false only in dashboard contexts, where the host already
/// serializes refreshes across its own tabs.
pub(crate) async fn run(inner: Arc<AuthInner>, use_lock: bool) {
    let mut rx = inner.state.observe();

    loop {
        // Suspend until a stamped logged-in token is present.
        if rx.wait_for(active).await.is_err() {
            return;
        }
        tracing::debug!("starting token refresh interval");

        let mut interval = tokio::time::interval(REFRESH_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so refreshes
        // start one full interval after entering the stamped state.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !tick(&inner, use_lock).await {
                        break;
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    // Self-cancel as soon as the precondition stops holding;
                    // re-entering restarts the interval from scratch.
                    if !active(&rx.borrow_and_update()) {
                        tracing::debug!("leaving refresh interval");
                        break;
                    }
                }
            }
        }
    }
}

/// One interval tick. Returns false when the precondition no longer holds.
async fn tick(inner: &Arc<AuthInner>, use_lock: bool) -> bool {
    let snapshot = inner.state.get();
    let AuthState::LoggedIn { token, .. } = &snapshot.auth_state else {
        return false;
    };
    if !is_stamped_token(token) {
        return false;
    }

    if use_lock {
        let lock_name = format!("{}:refresh", inner.storage_key);
        match inner.options.lock.try_acquire(&lock_name) {
            Some(_guard) => refresh_once(inner, token).await,
            None => {
                // Another tab is refreshing; wait for the next tick.
                tracing::debug!("refresh lock held elsewhere, skipping tick");
            }
        }
    } else {
        refresh_once(inner, token).await;
    }
    true
}

async fn refresh_once(inner: &Arc<AuthInner>, token: &str) {
    match inner.options.api.refresh_token(token).await {
        Ok(new_token) => {
            tracing::debug!("token refreshed");
            inner.persist_token(&new_token);
            let refreshed_at = Utc::now();
            inner.state.set("tokenRefresh/refreshed", move |prev| {
                match &prev.auth_state {
                    // Discard the result if the user logged out mid-refresh.
                    AuthState::LoggedIn { current_user, .. } => {
                        prev.with_auth_state(AuthState::LoggedIn {
                            token: new_token.clone(),
                            current_user: current_user.clone(),
                            last_token_refresh: Some(refreshed_at),
                        })
                    }
                    _ => prev.clone(),
                }
            });
        }
        Err(e) => {
            tracing::warn!(error = %e, "token refresh failed");
            let error_state = AuthState::error(e);
            inner.state.set("tokenRefresh/error", move |prev| {
                prev.with_auth_state(error_state.clone())
            });
        }
    }
}
