use std::sync::Arc;

use crate::api::AuthApi;
use crate::config::Settings;
use crate::lock::{ProcessLock, RefreshLock};
use crate::state::{AuthMethod, LoginProvider};
use crate::storage::{StorageArea, StorageEventHub, DEFAULT_STORAGE_KEY};

/// Host control over the advertised provider list: either a fixed list
/// (no fetch) or a transform applied to the fetched list.
#[derive(Clone)]
pub enum ProvidersConfig {
    Static(Vec<LoginProvider>),
    Transform(Arc<dyn Fn(Vec<LoginProvider>) -> Vec<LoginProvider> + Send + Sync>),
}

/// Immutable auth configuration, set once at instance construction.
#[derive(Clone)]
pub struct AuthOptions {
    /// Host-supplied token. When present, callback handling and logout are
    /// no-ops; the host owns the credential.
    pub provided_token: Option<String>,
    pub providers: Option<ProvidersConfig>,
    pub storage: Option<Arc<dyn StorageArea>>,
    /// Cross-context storage change notifications, when the host has them.
    pub storage_events: Option<StorageEventHub>,
    pub storage_key: String,
    pub api: Arc<dyn AuthApi>,
    pub lock: Arc<dyn RefreshLock>,
    pub callback_url: Option<String>,
    /// Where hosts send a consumer to start a login flow.
    pub login_url: String,
    /// Resolved discovery method, when known up front.
    pub auth_method: Option<AuthMethod>,
    /// The location (href) the app started at, when the host has one.
    pub location: Option<String>,
}

impl AuthOptions {
    pub fn new(api: Arc<dyn AuthApi>) -> Self {
        Self {
            provided_token: None,
            providers: None,
            storage: None,
            storage_events: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            api,
            lock: ProcessLock::global(),
            callback_url: None,
            login_url: "https://api.quill.build/auth/login".to_string(),
            auth_method: None,
            location: None,
        }
    }

    pub fn from_settings(settings: &Settings, api: Arc<dyn AuthApi>) -> Self {
        Self {
            storage_key: settings.storage_key.clone(),
            callback_url: settings.callback_url.clone(),
            login_url: settings.login_url.clone(),
            ..Self::new(api)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;

    #[test]
    fn from_settings_carries_endpoints() {
        let settings = Settings {
            api_host: "https://api.acme.example".to_string(),
            login_url: "https://api.acme.example/auth/login".to_string(),
            storage_key: "__acme_auth_token".to_string(),
            callback_url: Some("https://app.acme.example/callback".to_string()),
        };
        let options = AuthOptions::from_settings(&settings, Arc::new(MockApi::new()));
        assert_eq!(options.storage_key, "__acme_auth_token");
        assert_eq!(options.login_url, "https://api.acme.example/auth/login");
        assert_eq!(
            options.callback_url.as_deref(),
            Some("https://app.acme.example/callback")
        );
    }
}
