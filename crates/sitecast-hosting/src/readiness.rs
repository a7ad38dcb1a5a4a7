//! Process-wide readiness latch for the hosting engine.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

/// Records whether the hosting engine has been verified or installed.
///
/// Shared by every driver in the process. `init` serialises the first
/// provisioning attempt so concurrent callers do not install twice.
#[derive(Debug, Default)]
pub struct EngineReadiness {
    ready: AtomicBool,
    init: Mutex<()>,
}

impl EngineReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Forget readiness so the next check probes the engine again.
    pub fn reset(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub(crate) async fn lock_init(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.init.lock().await
    }
}
