//! Cooperative cancellation.
//!
//! The caller owns a [`CancelToken`] and may flip it from another thread; the
//! pipeline polls it at stage boundaries and inside its long loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Halt, StageResult};

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Yield point: returns `Err(Halt::Cancelled)` once cancellation was requested.
    pub fn checkpoint(&self) -> StageResult<()> {
        if self.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }
}
