use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Push-based view over a [`Store`]. Wraps a watch receiver so subscribers
/// can await changes without holding the store itself.
pub type StoreObserver<T> = watch::Receiver<T>;

/// Single-writer reactive key-value cell.
///
/// All subsystems read the current value through [`Store::get`] and mutate it
/// only through labelled [`Store::set`] calls. Updates are applied atomically
/// inside the watch channel, so transitions land in the order they were
/// issued and observers never see a torn value.
pub struct Store<T> {
    tx: watch::Sender<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Apply an update atomically. The label is used only for diagnostics.
    ///
    /// Writes after [`Store::close`] are dropped; a disposed instance must
    /// not mutate shared state.
    pub fn set(&self, label: &str, update: impl FnOnce(&T) -> T) {
        if self.closed.load(Ordering::Acquire) {
            tracing::warn!(label, "store is closed, dropping write");
            return;
        }
        self.tx.send_modify(|current| {
            *current = update(current);
        });
        tracing::debug!(label, "store updated");
    }

    /// Subscribe to value changes. The receiver yields the current value
    /// immediately via `borrow` and resolves `changed()` on every `set`.
    pub fn observe(&self) -> StoreObserver<T> {
        self.tx.subscribe()
    }

    /// Reject all further writes. Called once at instance disposal.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
