//! Test support: a recording [`AuthApi`] mock with scriptable responses.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{AuthApi, RequestAuth};
use crate::error::AuthError;
use crate::state::{LoginProvider, UserProfile};

pub fn test_user(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: Some(format!("User {id}")),
        email: Some(format!("{id}@example.com")),
        profile_image: None,
        provider: None,
    }
}

/// Scriptable in-memory [`AuthApi`]. Every call is recorded as
/// `"name"` or `"name:arg"` so tests can assert on exact traffic.
pub struct MockApi {
    calls: Mutex<Vec<String>>,
    pub providers_response: Mutex<Vec<LoginProvider>>,
    /// Token returned by `exchange_sid`; `None` makes the call fail.
    pub exchange_response: Mutex<Option<String>>,
    /// Token returned by `refresh_token`; `None` makes the call fail.
    pub refresh_response: Mutex<Option<String>>,
    /// User returned by `current_user`; `None` makes the call fail.
    pub current_user_response: Mutex<Option<UserProfile>>,
    pub logout_fails: Mutex<bool>,
    /// Artificial latency applied to `exchange_sid` and `logout`, so tests
    /// can observe in-flight operations.
    pub call_delay: Mutex<Option<Duration>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            providers_response: Mutex::new(Vec::new()),
            exchange_response: Mutex::new(None),
            refresh_response: Mutex::new(None),
            current_user_response: Mutex::new(None),
            logout_fails: Mutex::new(false),
            call_delay: Mutex::new(None),
        }
    }

    pub fn with_exchange_token(token: &str) -> Self {
        let api = Self::new();
        *api.exchange_response.lock().unwrap() = Some(token.to_string());
        api
    }

    pub fn with_current_user(user: UserProfile) -> Self {
        let api = Self::new();
        *api.current_user_response.lock().unwrap() = Some(user);
        api
    }

    fn record(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    async fn delay(&self) {
        let delay = *self.call_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == name || c.starts_with(&format!("{name}:")))
            .count()
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthApi for MockApi {
    async fn providers(&self) -> Result<Vec<LoginProvider>, AuthError> {
        self.record("providers".to_string());
        Ok(self.providers_response.lock().unwrap().clone())
    }

    async fn exchange_sid(&self, sid: &str) -> Result<String, AuthError> {
        self.record(format!("exchange_sid:{sid}"));
        self.delay().await;
        self.exchange_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::Server("exchange failed".to_string()))
    }

    async fn refresh_token(&self, token: &str) -> Result<String, AuthError> {
        self.record(format!("refresh_token:{token}"));
        self.refresh_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::Server("refresh failed".to_string()))
    }

    async fn logout(&self, _auth: RequestAuth) -> Result<(), AuthError> {
        self.record("logout".to_string());
        self.delay().await;
        if *self.logout_fails.lock().unwrap() {
            return Err(AuthError::Server("revoke failed".to_string()));
        }
        Ok(())
    }

    async fn current_user(&self, auth: RequestAuth) -> Result<UserProfile, AuthError> {
        let mode = match auth {
            RequestAuth::Bearer(_) => "bearer",
            RequestAuth::Cookie => "cookie",
            RequestAuth::None => "none",
        };
        self.record(format!("current_user:{mode}"));
        self.current_user_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AuthError::Server("not authenticated".to_string()))
    }
}
