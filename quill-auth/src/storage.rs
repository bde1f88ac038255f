use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::AuthError;

/// Default key for the persisted token envelope.
pub const DEFAULT_STORAGE_KEY: &str = "__sanity_auth_token";

/// Storage key used by Studio fallback mode, scoped per project.
pub fn studio_storage_key(project_id: &str) -> String {
    format!("__studio_auth_token_{project_id}")
}

/// The single persisted JSON shape: `{"token": string}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEnvelope {
    pub token: String,
}

static NEXT_AREA_ID: AtomicU64 = AtomicU64::new(1);

fn next_area_id() -> u64 {
    NEXT_AREA_ID.fetch_add(1, Ordering::Relaxed)
}

/// A key-value storage area shared across execution contexts of the same
/// origin. Writes are last-write-wins by design; no reader assumes
/// exclusive access.
pub trait StorageArea: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
    /// Identity used to match change notifications to this area.
    fn area_id(&self) -> u64;
}

/// A change written by *another* execution context (tab/window/process).
#[derive(Debug, Clone)]
pub struct StorageEvent {
    pub area_id: u64,
    pub key: String,
}

/// Fan-out point for cross-context storage change notifications. The host
/// environment emits events here; the storage event bridge subscribes.
#[derive(Clone)]
pub struct StorageEventHub {
    tx: broadcast::Sender<StorageEvent>,
}

impl StorageEventHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self { tx }
    }

    pub fn emit(&self, event: StorageEvent) {
        // No subscribers is fine; the bridge may not be running.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

impl Default for StorageEventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory storage area. The backing map can be shared between two
/// instances to model two tabs of the same origin.
pub struct MemoryStorage {
    items: Arc<DashMap<String, String>>,
    id: u64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            items: Arc::new(DashMap::new()),
            id: next_area_id(),
        }
    }

    /// Another view over the same backing map, with the same area identity.
    pub fn sibling(&self) -> Self {
        Self {
            items: self.items.clone(),
            id: self.id,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageArea for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.clone())
    }

    fn set_item(&self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&self, key: &str) {
        self.items.remove(key);
    }

    fn area_id(&self) -> u64 {
        self.id
    }
}

/// File-backed storage area for native hosts. Each key maps to one file
/// under the given directory; files are written with 0600 permissions.
pub struct FileStorage {
    dir: PathBuf,
    id: u64,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Result<Self, AuthError> {
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            id: next_area_id(),
        })
    }

    /// Storage rooted in the platform cache directory, e.g.
    /// `~/.cache/quill/auth`.
    pub fn in_cache_dir() -> Result<Self, AuthError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find cache directory".to_string()))?
            .join("quill")
            .join("auth");
        Self::new(cache_dir)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are well-known constants; guard against path separators anyway.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(safe)
    }
}

impl StorageArea for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set_item(&self, key: &str, value: &str) {
        let path = self.path_for(key);
        if let Err(e) = fs::write(&path, value) {
            tracing::warn!(key, error = %e, "failed to persist storage item");
            return;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = fs::metadata(&path) {
                let mut perms = metadata.permissions();
                perms.set_mode(0o600);
                let _ = fs::set_permissions(&path, perms);
            }
        }
    }

    fn remove_item(&self, key: &str) {
        let path = self.path_for(key);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(key, error = %e, "failed to remove storage item");
            }
        }
    }

    fn area_id(&self) -> u64 {
        self.id
    }
}
