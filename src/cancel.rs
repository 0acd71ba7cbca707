//! Cooperative cancellation for long-running scans.
//!
//! A [`CancelToken`] wraps an `AtomicBool` shared by every clone. The
//! duplicate scan checks it before starting work on each asset; once it is
//! set, remaining assets are skipped and the scan reports
//! [`GroupError::Cancelled`](crate::duplicates::GroupError::Cancelled).
//!
//! # Usage
//!
//! ```
//! use phototriage::cancel::CancelToken;
//!
//! let token = CancelToken::new();
//! let worker_view = token.clone();
//!
//! // e.g. the user navigated away from the duplicate screen
//! token.cancel();
//! assert!(worker_view.is_cancelled());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// `CancelToken` is `Send` and `Sync`; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one set by a signal handler.
    #[must_use]
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear the flag so the token can be reused for another scan.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// The underlying flag, for code that polls an `AtomicBool` directly.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}
