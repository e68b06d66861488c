//! Cooperative cancellation for pool submissions
//!
//! A caller that has moved on (page switch, new search) cancels the token;
//! the pool skips the task if it has not started, and the caller simply
//! stops waiting for the result. In-flight work is never forcibly killed.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation flag
///
/// Clones observe the same underlying state, so one token can be kept by
/// the caller and another handed to the pool.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether `cancel()` has been called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
