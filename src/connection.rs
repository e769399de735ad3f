//! Client connection bookkeeping for egressgate.
//!
//! - [`ConnectionLimiter`] caps simultaneous client connections.
//! - [`ConnectionTracker`] counts live connections, including CONNECT tunnels
//!   that outlive their HTTP exchange, so shutdown can wait for them to drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct TrackerState {
    active: AtomicUsize,
    drained: Notify,
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    state: Arc<TrackerState>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        self.state.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            state: self.state.clone(),
        }
    }

    /// Get current active connection count.
    pub fn count(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Waits until every tracked connection is gone.
    /// Returns false if `timeout` elapsed first.
    pub async fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.state.drained.notified();
                if self.count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Keeps one connection counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    state: Arc<TrackerState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.state.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.drained.notify_waiters();
        }
    }
}

/// Outcome of asking the limiter for a slot.
#[derive(Debug)]
pub enum Admission {
    /// No limit configured.
    Unlimited,
    /// Slot held until the permit is dropped.
    Granted(OwnedSemaphorePermit),
    /// At capacity.
    Rejected,
}

impl Admission {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Caps simultaneous client connections. A limit of 0 disables the cap.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    semaphore: Option<Arc<Semaphore>>,
    max_connections: usize,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize) -> Self {
        Self {
            semaphore: (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections))),
            max_connections,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.semaphore.is_some()
    }

    /// Get the maximum number of connections (0 means unlimited).
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Takes a slot without waiting.
    pub fn admit(&self) -> Admission {
        match &self.semaphore {
            None => Admission::Unlimited,
            Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Admission::Granted(permit),
                Err(_) => Admission::Rejected,
            },
        }
    }

    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|semaphore| semaphore.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // ConnectionTracker tests
    // ===========================================

    #[test]
    fn test_connection_tracker_guard_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.count(), 0);

        let first = tracker.track();
        let second = tracker.clone().track();
        assert_eq!(tracker.count(), 2);

        drop(first);
        assert_eq!(tracker.count(), 1);
        drop(second);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_connection_tracker_wait_for_shutdown_immediate() {
        let tracker = ConnectionTracker::new();
        assert!(tracker.wait_for_shutdown(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn test_connection_tracker_wait_for_shutdown_drains() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(tracker.wait_for_shutdown(Duration::from_secs(2)).await);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_connection_tracker_wait_for_shutdown_timeout() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.track();

        assert!(!tracker.wait_for_shutdown(Duration::from_millis(50)).await);
        assert_eq!(tracker.count(), 1);
    }

    // ===========================================
    // ConnectionLimiter tests
    // ===========================================

    #[test]
    fn test_connection_limiter_unlimited() {
        let limiter = ConnectionLimiter::new(0);
        assert!(!limiter.is_enabled());
        assert_eq!(limiter.available(), None);
        assert!(matches!(limiter.admit(), Admission::Unlimited));
    }

    #[test]
    fn test_connection_limiter_rejects_at_capacity() {
        let limiter = ConnectionLimiter::new(2);

        let first = limiter.admit();
        let second = limiter.admit();
        assert!(matches!(first, Admission::Granted(_)));
        assert!(matches!(second, Admission::Granted(_)));
        assert_eq!(limiter.available(), Some(0));
        assert!(limiter.admit().is_rejected());

        drop(first);
        assert!(matches!(limiter.admit(), Admission::Granted(_)));
    }
}
