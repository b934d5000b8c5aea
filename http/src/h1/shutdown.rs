//! §4.6 Graceful shutdown coordinator, grounded in the teacher server's
//! `ServerHandle`/`st` stop-timeout wiring (`xitca-server`'s graceful
//! shutdown path), reworked here as a standalone type the `chan-server`
//! crate drives from its accept loop.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Notify;

/// Tracks in-flight exchanges across every connection the server owns.
/// Cloned cheaply (`Arc` inside) and handed to each connection task.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    stopping: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// RAII guard marking one exchange in flight; dropping it decrements the
/// counter and wakes a waiting `wait_for_drain`.
pub struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stopping: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// §4.6 step 1/2: new connections (or new exchanges on a pipelined
    /// connection) check this before accepting work; once true they
    /// respond with `Connection: close` and no keep-alive.
    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    pub fn begin_exchange(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// §4.6: mark stopping, then wait up to `stop_timeout` for in-flight
    /// exchanges to drain. Returns the number still active at timeout (0 on
    /// a clean stop).
    pub async fn shutdown(&self, stop_timeout: Duration) -> usize {
        self.inner.stopping.store(true, Ordering::Release);

        if self.in_flight_count() == 0 {
            return 0;
        }

        let wait = async {
            loop {
                if self.in_flight_count() == 0 {
                    return;
                }
                self.inner.idle.notified().await;
            }
        };

        match tokio::time::timeout(stop_timeout, wait).await {
            Ok(()) => 0,
            Err(_) => self.in_flight_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_returns_immediately_with_nothing_in_flight() {
        let coordinator = ShutdownCoordinator::new();
        let stragglers = coordinator.shutdown(Duration::from_millis(50)).await;
        assert_eq!(stragglers, 0);
        assert!(coordinator.is_stopping());
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_exchange_to_drain() {
        let coordinator = ShutdownCoordinator::new();
        let guard = coordinator.begin_exchange();

        let c = coordinator.clone();
        let finisher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        let stragglers = c.shutdown(Duration::from_secs(5)).await;
        assert_eq!(stragglers, 0);
        finisher.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_reports_stragglers_past_deadline() {
        let coordinator = ShutdownCoordinator::new();
        let _guard = coordinator.begin_exchange();

        let stragglers = coordinator.shutdown(Duration::from_millis(10)).await;
        assert_eq!(stragglers, 1);
    }
}
