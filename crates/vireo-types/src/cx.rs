//! Cooperative cancellation context.
//!
//! Every store operation accepts a `&Cx`. Long-running callers (iteration,
//! batched loads) call [`Cx::checkpoint`] at their yield points and unwind
//! with [`Interrupted`] once cancellation has been requested. The commit
//! critical section never checkpoints: it is bounded by the size of the
//! committing transaction, and aborting halfway through publication would be
//! worse than finishing it.
//!
//! Cloned contexts share the same cancellation flag, so a `Cx` can be handed
//! to a worker thread and cancelled from the outside.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation was requested and observed at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation interrupted")
    }
}

impl std::error::Error for Interrupted {}

#[derive(Debug, Default)]
struct CxInner {
    cancel_requested: AtomicBool,
}

/// Shared cancellation token threaded through all store operations.
#[derive(Debug, Clone, Default)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    /// A fresh, uncancelled context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; never blocks.
    pub fn cancel(&self) {
        self.inner.cancel_requested.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::Acquire)
    }

    /// Observe cancellation: `Err(Interrupted)` once [`cancel`](Self::cancel)
    /// has been called, `Ok(())` before that.
    #[inline]
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        if self.inner.cancel_requested.load(Ordering::Acquire) {
            return Err(Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_passes_checkpoints() {
        let cx = Cx::new();
        assert!(!cx.is_cancelled());
        assert!(cx.checkpoint().is_ok());
    }

    #[test]
    fn cancel_is_shared_across_clones() {
        let cx = Cx::new();
        let clone = cx.clone();
        clone.cancel();
        assert!(cx.is_cancelled());
        assert_eq!(cx.checkpoint(), Err(Interrupted));
        // A second cancel is a no-op.
        cx.cancel();
        assert!(clone.checkpoint().is_err());
    }
}
