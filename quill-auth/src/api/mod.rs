mod models;

use async_trait::async_trait;
use models::*;
use reqwest::Client;
use std::time::Duration;

use crate::config::Settings;
use crate::error::AuthError;
use crate::state::{AuthMethod, LoginProvider, UserProfile};

/// How a request authenticates: bearer token, credentialed cookies, or
/// neither (pre-login endpoints).
#[derive(Debug, Clone)]
pub enum RequestAuth {
    Bearer(String),
    Cookie,
    None,
}

impl RequestAuth {
    /// Derive request auth from a token and the resolved discovery method.
    pub fn for_session(token: &str, method: Option<AuthMethod>) -> Self {
        match method {
            Some(AuthMethod::Cookie) => RequestAuth::Cookie,
            _ if !token.is_empty() => RequestAuth::Bearer(token.to_string()),
            _ => RequestAuth::None,
        }
    }
}

/// The platform auth endpoints, behind a trait so tests can substitute a
/// recording mock for the network.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// GET /auth/providers
    async fn providers(&self) -> Result<Vec<LoginProvider>, AuthError>;

    /// GET /auth/fetch?sid={code}, trading a one-time code for a token.
    async fn exchange_sid(&self, sid: &str) -> Result<String, AuthError>;

    /// POST /auth/refresh-token, re-issuing a stamped token.
    async fn refresh_token(&self, token: &str) -> Result<String, AuthError>;

    /// POST /auth/logout, revoking the server-side session.
    async fn logout(&self, auth: RequestAuth) -> Result<(), AuthError>;

    /// GET /users/me, resolving the current user profile.
    async fn current_user(&self, auth: RequestAuth) -> Result<UserProfile, AuthError>;
}

/// reqwest-backed [`AuthApi`] implementation.
pub struct HttpAuthApi {
    http_client: Client,
    api_host: String,
}

impl HttpAuthApi {
    pub fn new(api_host: impl Into<String>) -> Result<Self, AuthError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .cookie_store(true)
            .build()?;
        Ok(Self {
            http_client,
            api_host: api_host.into(),
        })
    }

    /// Client pointed at the configured API host.
    pub fn from_settings(settings: &Settings) -> Result<Self, AuthError> {
        settings.validate().map_err(AuthError::Configuration)?;
        Self::new(settings.api_host.clone())
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder, auth: &RequestAuth) -> reqwest::RequestBuilder {
        match auth {
            RequestAuth::Bearer(token) => req.bearer_auth(token),
            // Cookie mode relies on the client's cookie store; no header.
            RequestAuth::Cookie | RequestAuth::None => req,
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn providers(&self) -> Result<Vec<LoginProvider>, AuthError> {
        let url = format!("{}/auth/providers", self.api_host);
        let resp = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<ProvidersResponse>()
            .await?;
        Ok(resp.providers)
    }

    async fn exchange_sid(&self, sid: &str) -> Result<String, AuthError> {
        let url = format!("{}/auth/fetch", self.api_host);
        let resp = self
            .http_client
            .get(&url)
            .query(&[("sid", sid)])
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?;
        Ok(resp.token)
    }

    async fn refresh_token(&self, token: &str) -> Result<String, AuthError> {
        let url = format!("{}/auth/refresh-token", self.api_host);
        let req = RefreshRequest {
            token: token.to_string(),
        };
        let resp = self
            .http_client
            .post(&url)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?;
        Ok(resp.token)
    }

    async fn logout(&self, auth: RequestAuth) -> Result<(), AuthError> {
        let url = format!("{}/auth/logout", self.api_host);
        let req = self.apply_auth(self.http_client.post(&url), &auth);
        req.send().await?.error_for_status()?;
        Ok(())
    }

    async fn current_user(&self, auth: RequestAuth) -> Result<UserProfile, AuthError> {
        let url = format!("{}/users/me", self.api_host);
        let req = self.apply_auth(self.http_client.get(&url), &auth);
        let user = req
            .send()
            .await?
            .error_for_status()?
            .json::<UserProfile>()
            .await?;
        Ok(user)
    }
}
