//! Run context shared with providers and callers
//!
//! These types let the engine report progress and honour cancellation
//! without depending on a particular terminal UI or signal handler.

use crate::report::NodeReport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CancelState {
    cancelled: AtomicBool,
    deadline: Mutex<Option<Instant>>,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared cancellation flag for a run
///
/// Cloning yields a handle to the same flag. A token with a deadline
/// ([`CancelToken::with_timeout`], [`CancelToken::arm_timeout`]) reports
/// itself cancelled once the deadline passes, so timeouts and user aborts
/// look the same to providers.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A token that cancels itself after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                deadline: Mutex::new(deadline),
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Start counting `timeout` from now, keeping any earlier deadline
    pub fn arm_timeout(&self, timeout: Duration) {
        let Some(until) = Instant::now().checked_add(timeout) else {
            return;
        };
        let mut deadline = self.state.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        *deadline = Some(deadline.map_or(until, |d| d.min(until)));
    }

    fn deadline(&self) -> Option<Instant> {
        *self.state.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether the deadline has passed
    pub fn timed_out(&self) -> bool {
        self.deadline().is_some_and(|d| Instant::now() >= d)
    }

    /// Request cancellation and wake every sleeper
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("Cancellation requested");
        }
        let _guard = self.state.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.state.wake.notify_all();
    }

    /// Check whether the run was cancelled or timed out
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst) || self.timed_out()
    }

    /// Sleep for `duration`, waking early on cancellation
    ///
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let Some(until) = Instant::now().checked_add(duration) else {
            return !self.is_cancelled();
        };
        let until = self.deadline().map_or(until, |d| until.min(d));

        let mut guard = self.state.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return !self.is_cancelled();
            }
            guard = self
                .state
                .wake
                .wait_timeout(guard, until - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress callback for reconciliation runs
///
/// Implement this trait to receive progress updates. Nodes of a batch run
/// concurrently; their completions are reported once the batch is done.
pub trait ProgressCallback: Send {
    /// Called when starting a batch
    ///
    /// # Arguments
    /// * `index` - Position of the batch in the plan, deletions included
    /// * `names` - Resources in the batch
    /// * `deleting` - Whether this is a deletion batch
    fn on_batch_start(&mut self, index: usize, names: &[String], deleting: bool);

    /// Called for every resource of a finished batch
    fn on_resource_complete(&mut self, report: &NodeReport);

    /// Called when a batch completes
    fn on_batch_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _index: usize, _names: &[String], _deleting: bool) {}
    fn on_resource_complete(&mut self, _report: &NodeReport) {}
    fn on_batch_complete(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_timeout_cancels() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        assert!(!token.sleep(Duration::from_secs(5)));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_arm_timeout() {
        let token = CancelToken::new();
        assert!(!token.timed_out());
        token.arm_timeout(Duration::ZERO);
        assert!(token.timed_out());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_completes_without_cancel() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let handle = thread::spawn(move || {
            let started = Instant::now();
            let finished = sleeper.sleep(Duration::from_secs(30));
            (finished, started.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let (finished, elapsed) = handle.join().unwrap();
        assert!(!finished);
        assert!(elapsed < Duration::from_secs(10));
    }
}
