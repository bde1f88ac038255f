//! End-to-end lifecycle scenarios: construction, callback exchange, logout,
//! refresh coordination, storage events, and studio token sources.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use quill_auth::testing::{test_user, MockApi};
use quill_auth::{
    AuthOptions, AuthState, AuthStore, AuthStrategy, LockGuard, MemoryStorage, ProcessLock,
    RefreshLock, StorageArea, StorageEvent, StorageEventHub, TokenSource, DEFAULT_STORAGE_KEY,
};
use quill_store::SdkInstance;

/// Lock that always reports "held by another context".
struct DenyLock;

impl RefreshLock for DenyLock {
    fn try_acquire(&self, _name: &str) -> Option<LockGuard> {
        None
    }
}

fn instance() -> Arc<SdkInstance> {
    Arc::new(SdkInstance::new("p1", "production"))
}

fn storage_with_token(token: &str) -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.set_item(DEFAULT_STORAGE_KEY, &format!(r#"{{"token":"{token}"}}"#));
    storage
}

/// Let spawned subscriptions run to idle (time is paused in these tests).
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn assert_token(store: &AuthStore, expected: &str) {
    match store.state().auth_state {
        AuthState::LoggedIn { ref token, .. } => assert_eq!(token, expected),
        ref other => panic!("expected LoggedIn, got {other:?}"),
    }
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test(start_paused = true)]
async fn storage_token_logs_in_at_startup() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(Arc::new(storage_with_token("t1")));

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    assert_token(&store, "t1");

    // Current-user sync attaches the profile.
    settle().await;
    assert_eq!(
        store.state().auth_state.current_user().map(|u| u.id.as_str()),
        Some("u1")
    );
    assert_eq!(api.call_count("current_user"), 1);
}

#[tokio::test(start_paused = true)]
async fn standalone_without_credentials_stays_logged_out() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let store = AuthStore::new(
        instance(),
        AuthOptions::new(api.clone()),
        AuthStrategy::Standalone,
    );
    settle().await;
    assert!(matches!(
        store.state().auth_state,
        AuthState::LoggedOut {
            is_destroying_session: false
        }
    ));
    // No cookie probe outside studio fallback mode.
    assert_eq!(api.call_count("current_user"), 0);
}

#[tokio::test(start_paused = true)]
async fn current_user_fetch_failure_becomes_error_state() {
    let api = Arc::new(MockApi::new()); // current_user fails
    let mut options = AuthOptions::new(api);
    options.storage = Some(Arc::new(storage_with_token("t1")));

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;
    assert!(matches!(store.state().auth_state, AuthState::Error { .. }));
}

// ============================================================================
// Callback exchange
// ============================================================================

#[tokio::test(start_paused = true)]
async fn callback_exchanges_code_for_token() {
    let api = Arc::new(MockApi::with_exchange_token("new-token"));
    *api.current_user_response.lock().unwrap() = Some(test_user("u1"));
    let storage = Arc::new(MemoryStorage::new());
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(storage.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    let cleaned = store
        .handle_callback("https://app.example.com/studio#withSid=auth-code")
        .await;

    assert_eq!(cleaned.as_deref(), Some("https://app.example.com/studio"));
    assert_eq!(api.calls(), vec!["exchange_sid:auth-code".to_string()]);
    assert_token(&store, "new-token");
    assert!(store.state().auth_state.current_user().is_none());
    // Token persisted before handle_callback resolved.
    assert_eq!(
        storage.get_item(DEFAULT_STORAGE_KEY).as_deref(),
        Some(r#"{"token":"new-token"}"#)
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_callbacks_exchange_once() {
    let api = Arc::new(MockApi::with_exchange_token("new-token"));
    *api.call_delay.lock().unwrap() = Some(Duration::from_millis(50));
    let store = AuthStore::new(
        instance(),
        AuthOptions::new(api.clone()),
        AuthStrategy::Standalone,
    );

    let href = "https://app.example.com/studio#withSid=CODE";
    let (first, second) = tokio::join!(store.handle_callback(href), store.handle_callback(href));

    assert_eq!(first.as_deref(), Some("https://app.example.com/studio"));
    assert_eq!(second, None);
    assert_eq!(api.call_count("exchange_sid"), 1);
}

#[tokio::test(start_paused = true)]
async fn callback_is_noop_with_provided_token() {
    let api = Arc::new(MockApi::with_exchange_token("new-token"));
    *api.current_user_response.lock().unwrap() = Some(test_user("u1"));
    let mut options = AuthOptions::new(api.clone());
    options.provided_token = Some("host-token".to_string());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    let result = store
        .handle_callback("https://app.example.com/studio#withSid=CODE")
        .await;

    assert_eq!(result, None);
    assert_eq!(api.call_count("exchange_sid"), 0);
    assert_token(&store, "host-token");
}

#[tokio::test(start_paused = true)]
async fn url_token_logs_in_without_network() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let store = AuthStore::new(
        instance(),
        AuthOptions::new(api.clone()),
        AuthStrategy::Dashboard,
    );

    let cleaned = store
        .handle_callback("https://app.example.com/#token=delivered&tab=docs")
        .await;

    assert_eq!(
        cleaned.as_deref(),
        Some("https://app.example.com/#tab=docs")
    );
    assert_token(&store, "delivered");
    assert_eq!(api.call_count("exchange_sid"), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_exchange_still_returns_cleaned_url() {
    let api = Arc::new(MockApi::new()); // exchange fails
    let store = AuthStore::new(
        instance(),
        AuthOptions::new(api.clone()),
        AuthStrategy::Standalone,
    );

    let cleaned = store
        .handle_callback("https://app.example.com/studio#withSid=CODE")
        .await;

    assert_eq!(cleaned.as_deref(), Some("https://app.example.com/studio"));
    assert!(matches!(store.state().auth_state, AuthState::Error { .. }));
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn logout_revokes_and_clears_storage() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let storage = Arc::new(storage_with_token("t1"));
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(storage.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;
    store.logout().await;

    assert_eq!(api.call_count("logout"), 1);
    assert!(matches!(
        store.state().auth_state,
        AuthState::LoggedOut {
            is_destroying_session: false
        }
    ));
    assert_eq!(storage.get_item(DEFAULT_STORAGE_KEY), None);
}

#[tokio::test(start_paused = true)]
async fn concurrent_logout_revokes_once() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    *api.call_delay.lock().unwrap() = Some(Duration::from_millis(50));
    let storage = Arc::new(storage_with_token("t1"));
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(storage.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;
    tokio::join!(store.logout(), store.logout());

    assert_eq!(api.call_count("logout"), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_is_noop_with_provided_token() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let mut options = AuthOptions::new(api.clone());
    options.provided_token = Some("host-token".to_string());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    store.logout().await;

    assert_eq!(api.call_count("logout"), 0);
    assert_token(&store, "host-token");
}

#[tokio::test(start_paused = true)]
async fn failed_revoke_still_clears_local_state() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    *api.logout_fails.lock().unwrap() = true;
    let storage = Arc::new(storage_with_token("t1"));
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(storage.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;
    store.logout().await;

    assert!(matches!(
        store.state().auth_state,
        AuthState::LoggedOut {
            is_destroying_session: false
        }
    ));
    assert_eq!(storage.get_item(DEFAULT_STORAGE_KEY), None);
}

// ============================================================================
// Token refresh
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stamped_token_refreshes_on_interval() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    *api.refresh_response.lock().unwrap() = Some("abc-st2".to_string());
    let storage = Arc::new(storage_with_token("abc-st1"));
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(storage.clone());
    // Private lock registry so parallel tests cannot contend.
    options.lock = Arc::new(ProcessLock::new());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(api.call_count("refresh_token"), 1);
    assert_token(&store, "abc-st2");
    assert_eq!(
        storage.get_item(DEFAULT_STORAGE_KEY).as_deref(),
        Some(r#"{"token":"abc-st2"}"#)
    );
    // User survives the refresh; the session identity did not change.
    assert!(store.state().auth_state.current_user().is_some());
    match store.state().auth_state {
        AuthState::LoggedIn {
            last_token_refresh, ..
        } => assert!(last_token_refresh.is_some()),
        ref other => panic!("expected LoggedIn, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unstamped_token_never_refreshes() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    *api.refresh_response.lock().unwrap() = Some("ignored".to_string());
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(Arc::new(storage_with_token("plain-token")));

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;

    tokio::time::sleep(Duration::from_secs(1800)).await;
    assert_eq!(api.call_count("refresh_token"), 0);
    assert_token(&store, "plain-token");
}

#[tokio::test(start_paused = true)]
async fn refused_lock_skips_tick_silently() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    *api.refresh_response.lock().unwrap() = Some("abc-st2".to_string());
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(Arc::new(storage_with_token("abc-st1")));
    options.lock = Arc::new(DenyLock);

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(api.call_count("refresh_token"), 0);
    assert_token(&store, "abc-st1");
}

#[tokio::test(start_paused = true)]
async fn dashboard_refreshes_without_lock() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    *api.refresh_response.lock().unwrap() = Some("abc-st2".to_string());
    let mut options = AuthOptions::new(api.clone());
    options.provided_token = Some("abc-st1".to_string());
    options.lock = Arc::new(DenyLock);

    let store = AuthStore::new(instance(), options, AuthStrategy::Dashboard);
    settle().await;

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(api.call_count("refresh_token"), 1);
    assert_token(&store, "abc-st2");
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_becomes_error_state() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    // refresh_response stays None: the call fails.
    let mut options = AuthOptions::new(api.clone());
    options.storage = Some(Arc::new(storage_with_token("abc-st1")));
    options.lock = Arc::new(ProcessLock::new());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert!(matches!(store.state().auth_state, AuthState::Error { .. }));
    // The coordinator self-cancelled; no retry storm on later ticks.
    tokio::time::sleep(Duration::from_secs(1800)).await;
    assert_eq!(api.call_count("refresh_token"), 1);
}

// ============================================================================
// Storage event bridge
// ============================================================================

#[tokio::test(start_paused = true)]
async fn external_token_change_with_same_base_preserves_user() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let storage = Arc::new(storage_with_token("abc-st1"));
    let hub = StorageEventHub::new();
    let mut options = AuthOptions::new(api);
    options.storage = Some(storage.clone());
    options.storage_events = Some(hub.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;
    assert!(store.state().auth_state.current_user().is_some());

    // Another tab refreshed the token.
    storage.set_item(DEFAULT_STORAGE_KEY, r#"{"token":"abc-st2"}"#);
    hub.emit(StorageEvent {
        area_id: storage.area_id(),
        key: DEFAULT_STORAGE_KEY.to_string(),
    });
    settle().await;

    assert_token(&store, "abc-st2");
    assert!(store.state().auth_state.current_user().is_some());
}

#[tokio::test(start_paused = true)]
async fn external_logout_in_other_tab_logs_out() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let storage = Arc::new(storage_with_token("t1"));
    let hub = StorageEventHub::new();
    let mut options = AuthOptions::new(api);
    options.storage = Some(storage.clone());
    options.storage_events = Some(hub.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;

    storage.remove_item(DEFAULT_STORAGE_KEY);
    hub.emit(StorageEvent {
        area_id: storage.area_id(),
        key: DEFAULT_STORAGE_KEY.to_string(),
    });
    settle().await;

    assert!(matches!(
        store.state().auth_state,
        AuthState::LoggedOut {
            is_destroying_session: false
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn events_for_other_keys_are_ignored() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let storage = Arc::new(storage_with_token("t1"));
    let hub = StorageEventHub::new();
    let mut options = AuthOptions::new(api);
    options.storage = Some(storage.clone());
    options.storage_events = Some(hub.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;

    hub.emit(StorageEvent {
        area_id: storage.area_id(),
        key: "unrelated".to_string(),
    });
    settle().await;
    assert_token(&store, "t1");
}

// ============================================================================
// Studio strategy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn studio_source_drives_state() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let (tx, rx) = watch::channel(None::<String>);
    let strategy = AuthStrategy::Studio {
        token_source: Some(TokenSource {
            tokens: rx,
            workspace_authenticated: false,
        }),
    };

    let store = AuthStore::new(instance(), AuthOptions::new(api), strategy);
    settle().await;
    // First emission was null and the workspace is not authenticated.
    assert!(matches!(
        store.state().auth_state,
        AuthState::LoggedOut { .. }
    ));

    tx.send(Some("studio-token".to_string())).unwrap();
    settle().await;
    assert_token(&store, "studio-token");

    tx.send(None).unwrap();
    settle().await;
    assert!(matches!(
        store.state().auth_state,
        AuthState::LoggedOut { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn authenticated_workspace_falls_back_to_cookie_session() {
    use quill_auth::AuthMethod;

    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let (_tx, rx) = watch::channel(None::<String>);
    let strategy = AuthStrategy::Studio {
        token_source: Some(TokenSource {
            tokens: rx,
            workspace_authenticated: true,
        }),
    };

    let store = AuthStore::new(instance(), AuthOptions::new(api), strategy);
    settle().await;

    let state = store.state();
    assert!(state.auth_state.is_logged_in());
    assert_eq!(state.auth_state.token(), None);
    assert_eq!(state.auth_method, Some(AuthMethod::Cookie));
}

#[tokio::test(start_paused = true)]
async fn studio_fallback_probes_cookie_auth() {
    use quill_auth::AuthMethod;

    let api = Arc::new(MockApi::with_current_user(test_user("u7")));
    let store = AuthStore::new(
        instance(),
        AuthOptions::new(api.clone()),
        AuthStrategy::Studio { token_source: None },
    );
    settle().await;

    let state = store.state();
    assert!(state.auth_state.is_logged_in());
    assert_eq!(state.auth_method, Some(AuthMethod::Cookie));
    assert_eq!(
        state.auth_state.current_user().map(|u| u.id.as_str()),
        Some("u7")
    );
    assert_eq!(api.call_count("current_user:cookie"), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_cookie_probe_leaves_state_untouched() {
    let api = Arc::new(MockApi::new()); // current_user fails
    let store = AuthStore::new(
        instance(),
        AuthOptions::new(api),
        AuthStrategy::Studio { token_source: None },
    );
    settle().await;

    assert!(matches!(
        store.state().auth_state,
        AuthState::LoggedOut {
            is_destroying_session: false
        }
    ));
}

// ============================================================================
// Disposal
// ============================================================================

#[tokio::test(start_paused = true)]
async fn disposed_store_accepts_no_further_writes() {
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let storage = Arc::new(storage_with_token("t1"));
    let hub = StorageEventHub::new();
    let mut options = AuthOptions::new(api);
    options.storage = Some(storage.clone());
    options.storage_events = Some(hub.clone());

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    settle().await;
    store.dispose();

    storage.remove_item(DEFAULT_STORAGE_KEY);
    hub.emit(StorageEvent {
        area_id: storage.area_id(),
        key: DEFAULT_STORAGE_KEY.to_string(),
    });
    settle().await;

    assert_token(&store, "t1");
}

// ============================================================================
// Providers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn providers_are_fetched_and_cached() {
    use quill_auth::LoginProvider;

    let api = Arc::new(MockApi::new());
    *api.providers_response.lock().unwrap() = vec![LoginProvider {
        name: "github".to_string(),
        title: "GitHub".to_string(),
        url: "https://api.quill.build/auth/login/github".to_string(),
    }];

    let store = AuthStore::new(
        instance(),
        AuthOptions::new(api.clone()),
        AuthStrategy::Standalone,
    );
    let providers = store.load_providers().await.unwrap();

    assert_eq!(providers.len(), 1);
    assert_eq!(store.state().providers.unwrap()[0].name, "github");
    assert_eq!(api.call_count("providers"), 1);
}

#[tokio::test(start_paused = true)]
async fn static_provider_list_skips_fetch() {
    use quill_auth::{LoginProvider, ProvidersConfig};

    let api = Arc::new(MockApi::new());
    let mut options = AuthOptions::new(api.clone());
    options.providers = Some(ProvidersConfig::Static(vec![LoginProvider {
        name: "sso".to_string(),
        title: "Acme SSO".to_string(),
        url: "https://sso.acme.example/login".to_string(),
    }]));

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    let providers = store.load_providers().await.unwrap();

    assert_eq!(providers[0].name, "sso");
    assert_eq!(api.call_count("providers"), 0);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn settings_flow_through_to_the_store() {
    use quill_auth::Settings;

    let settings = Settings {
        api_host: "https://api.acme.example".to_string(),
        login_url: "https://api.acme.example/auth/login".to_string(),
        storage_key: "__acme_auth_token".to_string(),
        callback_url: None,
    };
    let api = Arc::new(MockApi::with_current_user(test_user("u1")));
    let mut options = AuthOptions::from_settings(&settings, api);
    let storage = MemoryStorage::new();
    storage.set_item("__acme_auth_token", r#"{"token":"t1"}"#);
    options.storage = Some(Arc::new(storage));

    let store = AuthStore::new(instance(), options, AuthStrategy::Standalone);
    assert_eq!(store.login_url(), "https://api.acme.example/auth/login");
    // The configured storage key, not the default, was read.
    assert_token(&store, "t1");
}
