use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum spacing between remote calls, shared by all workers of a batch.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `requests_per_minute == 0` disables limiting.
    pub fn new(requests_per_minute: u32) -> Self {
        let interval = (requests_per_minute > 0)
            .then(|| Duration::from_secs_f64(60.0 / requests_per_minute as f64));
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait until `interval` has passed since the previous grant, then grant.
    ///
    /// The lock is held across the wait, so concurrent callers queue up and
    /// receive grants spaced at least `interval` apart.
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let mut last = self.last_grant.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
