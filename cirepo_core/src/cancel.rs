//! Cooperative cancellation for long-running jobs.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A shared flag a job polls between objects.
///
/// Clones observe the same flag, so the token can be handed to another thread
/// (or a signal handler) that requests cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested.
    pub fn check(&self, processed: usize) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::cancelled(processed));
        }
        Ok(())
    }
}
