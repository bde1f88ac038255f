use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use quill_store::{Disposer, SdkInstance, Store, StoreObserver};

use crate::api::RequestAuth;
use crate::background;
use crate::discovery;
use crate::error::AuthError;
use crate::options::{AuthOptions, ProvidersConfig};
use crate::state::{AuthState, AuthStoreState, LoginProvider};
use crate::storage::TokenEnvelope;
use crate::strategy::AuthStrategy;

pub(crate) struct AuthInner {
    pub(crate) state: Store<AuthStoreState>,
    pub(crate) options: AuthOptions,
    pub(crate) instance: Arc<SdkInstance>,
    /// Resolved at construction; Studio fallback scopes it per project.
    pub(crate) storage_key: String,
    refresh_started: AtomicBool,
}

impl AuthInner {
    pub(crate) fn persist_token(&self, token: &str) {
        let Some(area) = &self.options.storage else {
            return;
        };
        match serde_json::to_string(&TokenEnvelope {
            token: token.to_string(),
        }) {
            Ok(envelope) => area.set_item(&self.storage_key, &envelope),
            Err(e) => tracing::warn!(error = %e, "failed to encode token envelope"),
        }
    }

    pub(crate) fn remove_persisted_token(&self) {
        if let Some(area) = &self.options.storage {
            area.remove_item(&self.storage_key);
        }
    }
}

/// The auth lifecycle manager. Computes the initial state synchronously at
/// construction, starts the standing subscriptions its strategy calls for,
/// and exposes the on-demand callback-exchange and logout operations.
pub struct AuthStore {
    inner: Arc<AuthInner>,
}

impl AuthStore {
    pub fn new(instance: Arc<SdkInstance>, options: AuthOptions, strategy: AuthStrategy) -> Self {
        let storage_key = strategy.storage_key(&options, &instance.project_id);
        let initial = strategy.resolve_initial_state(&options, &storage_key);
        tracing::info!(
            strategy = strategy.name(),
            project_id = %instance.project_id,
            "auth store initialized"
        );

        let state = Store::new(initial);
        {
            // No writes may land after disposal.
            let state = state.clone();
            instance.defer(Disposer::new(move || state.close()));
        }

        let inner = Arc::new(AuthInner {
            state,
            options,
            instance,
            storage_key,
            refresh_started: AtomicBool::new(false),
        });
        let store = Self { inner };
        store.initialize_subscriptions(strategy);
        store
    }

    fn initialize_subscriptions(&self, strategy: AuthStrategy) {
        match strategy {
            AuthStrategy::Standalone => {
                self.spawn_current_user_sync();
                self.spawn_storage_bridge();
                self.spawn_token_refresh(true);
            }
            AuthStrategy::Dashboard => {
                // The host dashboard is the token authority: no storage
                // bridge, and refreshes are already serialized by the host.
                self.spawn_current_user_sync();
                self.spawn_token_refresh(false);
            }
            AuthStrategy::Studio {
                token_source: Some(source),
            } => {
                // The host owns the token lifecycle entirely.
                self.defer_task(tokio::spawn(background::studio_source::run(
                    self.inner.clone(),
                    source,
                )));
            }
            AuthStrategy::Studio { token_source: None } => {
                self.spawn_current_user_sync();
                self.spawn_storage_bridge();
                self.spawn_token_refresh(true);
                if matches!(
                    self.inner.state.get().auth_state,
                    AuthState::LoggedOut { .. }
                ) {
                    self.defer_task(tokio::spawn(background::cookie_probe::run(
                        self.inner.clone(),
                    )));
                }
            }
        }
    }

    fn spawn_current_user_sync(&self) {
        self.defer_task(tokio::spawn(background::current_user::run(
            self.inner.clone(),
        )));
    }

    fn spawn_storage_bridge(&self) {
        if self.inner.options.storage.is_none() {
            return;
        }
        let Some(hub) = self.inner.options.storage_events.clone() else {
            return;
        };
        self.defer_task(tokio::spawn(background::storage_events::run(
            self.inner.clone(),
            hub,
        )));
    }

    fn spawn_token_refresh(&self, use_lock: bool) {
        // At most one refresh coordinator per instance, even when strategies
        // are composed.
        if self.inner.refresh_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.defer_task(tokio::spawn(background::token_refresh::run(
            self.inner.clone(),
            use_lock,
        )));
    }

    fn defer_task(&self, handle: JoinHandle<()>) {
        let abort = handle.abort_handle();
        self.inner
            .instance
            .defer(Disposer::new(move || abort.abort()));
    }

    /// Snapshot of the current store state.
    pub fn state(&self) -> AuthStoreState {
        self.inner.state.get()
    }

    /// Push-based observation of state changes.
    pub fn observe(&self) -> StoreObserver<AuthStoreState> {
        self.inner.state.observe()
    }

    pub fn instance(&self) -> &Arc<SdkInstance> {
        &self.inner.instance
    }

    /// Where a host should send the consumer to start a login flow.
    pub fn login_url(&self) -> &str {
        &self.inner.options.login_url
    }

    /// Tear down all standing subscriptions and reject further writes.
    pub fn dispose(&self) {
        self.inner.instance.dispose();
    }

    /// Handle an auth callback at `href`. Returns the cleaned URL for
    /// history replacement when the callback was handled, `None` when there
    /// was nothing to do. Network failure surfaces as `AuthState::Error`
    /// while still returning the cleaned URL, so the caller can strip the
    /// one-time code from history.
    pub async fn handle_callback(&self, href: &str) -> Option<String> {
        let options = &self.inner.options;
        if options.provided_token.is_some() {
            return None;
        }
        if matches!(
            self.inner.state.get().auth_state,
            AuthState::LoggingIn {
                is_exchanging_token: true
            }
        ) {
            tracing::debug!("token exchange already in flight, ignoring callback");
            return None;
        }

        // Direct token delivery: no network call needed.
        if let Some(token) = discovery::token_from_location(href) {
            self.inner.state.set("handleCallback/urlToken", |prev| {
                prev.with_auth_state(AuthState::logged_in(token.clone()))
            });
            return Some(discovery::cleaned_url(href));
        }

        let code = discovery::auth_code_from_callback(options.callback_url.as_deref(), href)?;
        let context = discovery::dashboard_context_from_location(href);

        // Exactly one caller may flip is_exchanging_token; the claim happens
        // inside the atomic update so concurrent callbacks cannot race it.
        let mut claimed = false;
        self.inner.state.set("handleCallback/exchanging", |prev| {
            if matches!(
                prev.auth_state,
                AuthState::LoggingIn {
                    is_exchanging_token: true
                }
            ) {
                return prev.clone();
            }
            claimed = true;
            let mut next = prev.with_auth_state(AuthState::LoggingIn {
                is_exchanging_token: true,
            });
            if context.is_some() {
                next.dashboard_context = context.clone();
            }
            next
        });
        if !claimed {
            return None;
        }

        match options.api.exchange_sid(&code).await {
            Ok(token) => {
                self.inner.persist_token(&token);
                self.inner.state.set("handleCallback/loggedIn", |prev| {
                    prev.with_auth_state(AuthState::logged_in(token.clone()))
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "token exchange failed");
                let error_state = AuthState::error(e);
                self.inner.state.set("handleCallback/error", |prev| {
                    prev.with_auth_state(error_state.clone())
                });
            }
        }
        Some(discovery::cleaned_url(href))
    }

    /// Revoke the server session best-effort and clear local state. The
    /// local cleanup always runs, regardless of network outcome.
    pub async fn logout(&self) {
        if self.inner.options.provided_token.is_some() {
            return;
        }

        let mut claimed = false;
        let mut token: Option<String> = None;
        self.inner.state.set("logout/destroying", |prev| {
            if matches!(
                prev.auth_state,
                AuthState::LoggedOut {
                    is_destroying_session: true
                }
            ) {
                return prev.clone();
            }
            claimed = true;
            token = prev.auth_state.token().map(str::to_string);
            prev.with_auth_state(AuthState::LoggedOut {
                is_destroying_session: true,
            })
        });
        if !claimed {
            return;
        }

        if let Some(token) = &token {
            let auth = RequestAuth::for_session(token, self.inner.state.get().auth_method);
            if let Err(e) = self.inner.options.api.logout(auth).await {
                tracing::warn!(error = %e, "session revoke failed, clearing local state anyway");
            }
        }

        self.inner.state.set("logout/done", |prev| {
            prev.with_auth_state(AuthState::logged_out())
        });
        self.inner.remove_persisted_token();
    }

    /// Resolve the advertised provider list and cache it in the store.
    /// A static host-supplied list skips the fetch entirely.
    pub async fn load_providers(&self) -> Result<Vec<LoginProvider>, AuthError> {
        let providers = match &self.inner.options.providers {
            Some(ProvidersConfig::Static(list)) => list.clone(),
            Some(ProvidersConfig::Transform(transform)) => {
                transform(self.inner.options.api.providers().await?)
            }
            None => self.inner.options.api.providers().await?,
        };
        let cached = providers.clone();
        self.inner.state.set("providers/loaded", move |prev| {
            let mut next = prev.clone();
            next.providers = Some(cached.clone());
            next
        });
        Ok(providers)
    }
}
