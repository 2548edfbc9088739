//! Finish-after-next flag shared between scenarios and the watch worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Once set, the loop exits right after the next sidecar file it processes.
/// Setting it again changes nothing; there is no way to clear it.
#[derive(Debug, Clone, Default)]
pub struct WatcherState {
    terminate_after_next: Arc<AtomicBool>,
}

impl WatcherState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish_after_next(&self) {
        self.terminate_after_next.store(true, Ordering::SeqCst);
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate_after_next.load(Ordering::SeqCst)
    }
}
