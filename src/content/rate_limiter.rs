//! Process-wide throttle for VK API calls.
//!
//! Two limits apply to every upstream call: at most `max_concurrent` calls in
//! flight, and consecutive calls start at least `min_interval` apart.

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

/// Gate every upstream call passes through.
pub struct RateLimiter {
    permits: Semaphore,
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

/// Held for the duration of one upstream call.
#[must_use = "the call slot is released as soon as the permit is dropped"]
pub struct RatePermit<'a> {
    _permit: Option<SemaphorePermit<'a>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent.max(1)),
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    /// Minimum spacing between the starts of two calls.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits for a call slot and for `min_interval` since the previous call.
    ///
    /// Never fails. Callers are admitted in FIFO order; the residual wait is
    /// slept while holding the timestamp lock so no two calls start closer
    /// than `min_interval`.
    pub async fn acquire(&self) -> RatePermit<'_> {
        // Never closed
        let permit = self.permits.acquire().await.ok();

        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis(), "Throttling VK call");
                sleep(wait).await;
            }
        }
        *last_call = Some(Instant::now());

        RatePermit { _permit: permit }
    }
}
