use dashmap::DashMap;
use std::sync::{Arc, OnceLock};

/// Named, non-blocking mutual-exclusion lock shared across execution
/// contexts of the same origin. Its only job is to keep concurrent contexts
/// from issuing duplicate refresh network calls; it does not protect
/// storage consistency.
pub trait RefreshLock: Send + Sync {
    /// Try to take the named lock. `None` means another context holds it;
    /// the caller skips its work silently. The lock is released when the
    /// returned guard drops.
    fn try_acquire(&self, name: &str) -> Option<LockGuard>;
}

/// Releases the named lock on drop.
pub struct LockGuard {
    name: String,
    held: Arc<DashMap<String, ()>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.held.remove(&self.name);
        tracing::debug!(name = %self.name, "released refresh lock");
    }
}

/// In-process lock registry. All SDK instances in the same process share
/// one registry, which is what "same origin" means for a native host.
pub struct ProcessLock {
    held: Arc<DashMap<String, ()>>,
}

impl ProcessLock {
    pub fn new() -> Self {
        Self {
            held: Arc::new(DashMap::new()),
        }
    }

    /// The process-wide shared registry.
    pub fn global() -> Arc<ProcessLock> {
        static GLOBAL: OnceLock<Arc<ProcessLock>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ProcessLock::new())).clone()
    }
}

impl Default for ProcessLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshLock for ProcessLock {
    fn try_acquire(&self, name: &str) -> Option<LockGuard> {
        match self.held.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                tracing::debug!(name, "acquired refresh lock");
                Some(LockGuard {
                    name: name.to_string(),
                    held: self.held.clone(),
                })
            }
        }
    }
}
