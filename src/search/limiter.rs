use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Closeable counting permit pool bounding how many probes run at once.
///
/// A permit covers a probe only until its outcome is published. The
/// probe's resources stay borrowed after that under its
/// [`CleanupGate`](super::gate::CleanupGate), which does not hold a permit.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
}

/// One unit of concurrency budget. Returned to the pool on drop.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl Permit {
    /// Return the permit now rather than at end of scope.
    pub fn release(self) {}
}

impl ConcurrencyLimiter {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Wait for a permit. Returns `None` without consuming anything once the
    /// limiter is closed, including for callers already waiting.
    pub async fn acquire(&self) -> Option<Permit> {
        if self.semaphore.is_closed() {
            return None;
        }
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .ok()
            .map(|permit| Permit { _permit: permit })
    }

    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
