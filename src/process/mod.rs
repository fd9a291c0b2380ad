//! Child process supervision primitives.

pub mod supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use supervisor::{run, LineListener, ProgressFn, RunOptions};

/// Exit code reported when the executable could not be launched at all.
///
/// Chosen outside the exit code range real tools use, so "tool missing" and
/// "tool failed" flow through the same path.
pub const EXIT_LAUNCH_FAILED: i32 = 254;

/// Exit code reported when the supervisor killed the child itself
/// (timeout, cancellation, or engine stop).
pub const EXIT_SUPERVISED_KILL: i32 = -1;

/// Cooperative cancellation handle shared between a job and its worker.
///
/// Cloning yields another handle to the same flag. Cancelling twice is a
/// no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clears the flag so the token can be reused after a retry.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());

        let clone = token.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn reset_clears_the_flag() {
        let token = CancelToken::new();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
    }
}
