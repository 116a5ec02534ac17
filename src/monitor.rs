//! Progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Receives progress from deep operations and answers cancellation polls.
pub trait ProgressMonitor: Send + Sync {
    fn begin_task(&self, _name: &str, _total_work: usize) {}

    fn worked(&self, _units: usize) {}

    fn subtask(&self, _name: &str) {}

    fn done(&self) {}

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Monitor that ignores progress and is never canceled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl ProgressMonitor for NullMonitor {}

/// Shared cancellation flag.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Monitor backed by a [`CancellationToken`] that counts work units.
#[derive(Debug, Default)]
pub struct TokenMonitor {
    token: CancellationToken,
    worked: AtomicUsize,
    /// Cancel automatically once this many units were reported.
    cancel_after: Option<usize>,
}

impl TokenMonitor {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            worked: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    /// Monitor that cancels itself after `units` of work.
    pub fn cancel_after(units: usize) -> Self {
        Self {
            token: CancellationToken::new(),
            worked: AtomicUsize::new(0),
            cancel_after: Some(units),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn total_worked(&self) -> usize {
        self.worked.load(Ordering::SeqCst)
    }
}

impl ProgressMonitor for TokenMonitor {
    fn begin_task(&self, name: &str, total_work: usize) {
        trace!(task = name, total_work, "Task started");
    }

    fn worked(&self, units: usize) {
        let total = self.worked.fetch_add(units, Ordering::SeqCst) + units;
        if let Some(limit) = self.cancel_after {
            if total >= limit {
                self.token.cancel();
            }
        }
    }

    fn is_canceled(&self) -> bool {
        self.token.is_canceled()
    }
}
