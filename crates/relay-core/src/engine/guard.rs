//! Per-workflow lock and cancellation token shared by the two cycles.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Coordination state for one running workflow.
///
/// Exactly one instance exists per running workflow; both cycles hold an
/// `Arc` to it. The mutex serializes read-modify-write sequences on the
/// workflow record and is never held across a handler call.
#[derive(Debug)]
pub struct WorkflowGuard {
    lock: Mutex<()>,
    cancel: CancellationToken,
    exited: CancellationToken,
    live_cycles: AtomicUsize,
}

impl WorkflowGuard {
    pub(crate) fn new(cycles: usize) -> Self {
        Self {
            lock: Mutex::new(()),
            cancel: CancellationToken::new(),
            exited: CancellationToken::new(),
            live_cycles: AtomicUsize::new(cycles),
        }
    }

    /// Acquire the record lock.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Ask both cycles to stop at their next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the workflow has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// A guard that cancels the workflow when dropped, including on panic.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancel.clone().drop_guard()
    }

    /// Record that one cycle exited. Returns `true` for the last one, which
    /// also wakes every [`exited`](Self::exited) waiter.
    pub(crate) fn release(&self) -> bool {
        let last = self.live_cycles.fetch_sub(1, Ordering::AcqRel) == 1;
        if last {
            self.exited.cancel();
        }
        last
    }

    /// Resolves once both cycles have exited.
    pub(crate) async fn exited(&self) {
        self.exited.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn drop_guard_cancels() {
        let guard = WorkflowGuard::new(2);
        {
            let _on_exit = guard.cancel_on_drop();
            assert!(!guard.is_cancelled());
        }
        assert!(guard.is_cancelled());
    }

    #[test]
    fn last_release_reports_true() {
        let guard = WorkflowGuard::new(2);
        assert!(!guard.release());
        assert!(guard.release());
    }

    #[tokio::test]
    async fn exited_resolves_after_last_release() {
        let guard = WorkflowGuard::new(2);
        guard.release();
        let pending = tokio::time::timeout(Duration::from_millis(20), guard.exited()).await;
        assert!(pending.is_err());

        guard.release();
        tokio::time::timeout(Duration::from_millis(20), guard.exited())
            .await
            .expect("exited after last release");
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let guard = WorkflowGuard::new(2);
        let held = guard.lock().await;
        assert!(guard.lock.try_lock().is_err());
        drop(held);
        assert!(guard.lock.try_lock().is_ok());
    }
}
