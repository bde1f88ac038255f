//! Auth lifecycle manager for the quill client SDK.
//!
//! Determines at startup whether a consumer is logged in, logging in,
//! logged out, or in error; keeps that state current as tokens are
//! discovered, exchanged, refreshed, or revoked; and does so across three
//! hosting contexts (standalone app, dashboard iframe, studio host).

pub mod api;
mod background;
mod config;
pub mod discovery;
mod error;
mod lock;
mod options;
mod state;
mod storage;
mod store;
mod strategy;
pub mod testing;

pub use api::{AuthApi, HttpAuthApi, RequestAuth};
pub use config::Settings;
pub use error::AuthError;
pub use lock::{LockGuard, ProcessLock, RefreshLock};
pub use options::{AuthOptions, ProvidersConfig};
pub use state::{
    is_stamped_token, token_base, AuthMethod, AuthState, AuthStoreState, DashboardContext,
    LoginProvider, UserProfile,
};
pub use storage::{
    studio_storage_key, FileStorage, MemoryStorage, StorageArea, StorageEvent, StorageEventHub,
    TokenEnvelope, DEFAULT_STORAGE_KEY,
};
pub use store::AuthStore;
pub use strategy::{AuthStrategy, TokenSource};
