use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SplitError;

/// Shared cancellation flag for one run. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Checkpoint helper: `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<(), SplitError> {
        if self.is_cancelled() {
            Err(SplitError::Cancelled)
        } else {
            Ok(())
        }
    }
}
