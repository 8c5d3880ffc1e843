//! Reporter lifecycle state shared by producers, the flush task and `close()`.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Lifecycle of an [`AsyncReporter`](crate::AsyncReporter). Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ReporterState {
    /// Accepting reports
    Running = 0,
    /// Rejecting reports, draining what is buffered
    Closing = 1,
    /// Terminal
    Closed = 2,
}

impl ReporterState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReporterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// Atomic state plus a count of reports currently past the admission check.
///
/// `enter` and `begin_close` form a store-then-load handshake on two
/// variables, so both sides use `SeqCst`: either the report sees `Closing` and
/// backs out, or `close` sees it in flight and waits for it to finish.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    active_reports: AtomicUsize,
    /// Signaled whenever `active_reports` drops to zero
    idle: Notify,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ReporterState::Running as u8),
            active_reports: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> ReporterState {
        ReporterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Registers a report; `None` once closing has begun.
    pub(crate) fn enter(&self) -> Option<ReportGuard<'_>> {
        self.active_reports.fetch_add(1, Ordering::SeqCst);
        if self.state() != ReporterState::Running {
            self.leave();
            return None;
        }
        Some(ReportGuard { lifecycle: self })
    }

    /// Running → Closing. Returns `false` if another caller already began closing.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                ReporterState::Running as u8,
                ReporterState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub(crate) fn finish_close(&self) {
        self.state.store(ReporterState::Closed as u8, Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.active_reports.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Waits until no report is between admission and enqueue.
    pub(crate) async fn wait_idle(&self) {
        loop {
            // Registered before the check so a wakeup in between is not missed
            let idle = self.idle.notified();
            if self.active_reports() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Reports admitted before closing began and not yet enqueued.
    #[inline]
    pub(crate) fn active_reports(&self) -> usize {
        self.active_reports.load(Ordering::SeqCst)
    }
}

/// Keeps a report counted as active until dropped
pub(crate) struct ReportGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for ReportGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transitions_only_move_forward() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ReporterState::Running);

        assert!(lifecycle.begin_close());
        assert!(!lifecycle.begin_close());
        assert_eq!(lifecycle.state(), ReporterState::Closing);

        lifecycle.finish_close();
        assert!(!lifecycle.begin_close());
        assert_eq!(lifecycle.state(), ReporterState::Closed);
    }

    #[test]
    fn test_guard_tracks_active_reports() {
        let lifecycle = Lifecycle::new();
        {
            let _guard = lifecycle.enter().unwrap();
            assert_eq!(lifecycle.active_reports(), 1);
        }
        assert_eq!(lifecycle.active_reports(), 0);

        lifecycle.begin_close();
        assert!(lifecycle.enter().is_none());
        assert_eq!(lifecycle.active_reports(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_when_last_report_leaves() {
        let lifecycle = Lifecycle::new();
        lifecycle.wait_idle().await;

        let first = lifecycle.enter().unwrap();
        let second = lifecycle.enter().unwrap();
        lifecycle.begin_close();

        let release = async {
            tokio::task::yield_now().await;
            drop(first);
            tokio::task::yield_now().await;
            drop(second);
        };
        let (waited, ()) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(1), lifecycle.wait_idle()),
            release
        );
        assert!(waited.is_ok());
        assert_eq!(lifecycle.active_reports(), 0);
    }
}
