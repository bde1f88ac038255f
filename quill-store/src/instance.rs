use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A cancellation hook returned by every standing subscription.
///
/// Runs its action exactly once, either when invoked explicitly or when the
/// owning [`SdkInstance`] is disposed.
pub struct Disposer {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposer {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

/// Read-only SDK instance identity plus the disposal registry.
///
/// Subscriptions register their disposers here; `dispose` invokes all of
/// them exactly once, in no particular order. Registering on an already
/// disposed instance runs the disposer immediately.
pub struct SdkInstance {
    pub project_id: String,
    pub dataset: String,
    disposers: Mutex<Vec<Disposer>>,
    disposed: AtomicBool,
}

impl SdkInstance {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            disposers: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Register a disposer to run at instance teardown.
    pub fn defer(&self, disposer: Disposer) {
        if self.disposed.load(Ordering::Acquire) {
            disposer.dispose();
            return;
        }
        let mut disposers = self.disposers.lock().unwrap_or_else(|e| e.into_inner());
        disposers.push(disposer);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Tear down the instance: every registered disposer runs exactly once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let disposers = {
            let mut guard = self.disposers.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        let count = disposers.len();
        for disposer in disposers {
            disposer.dispose();
        }
        tracing::debug!(
            project_id = %self.project_id,
            dataset = %self.dataset,
            count,
            "instance disposed"
        );
    }
}
