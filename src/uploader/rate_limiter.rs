use std::sync::Mutex;
use tokio::time::{sleep, sleep_until, Duration, Instant};

/// Enforces a minimum spacing between submissions to one endpoint. Uses
/// tokio's clock, so tests can drive it with paused time.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Time left before the next submission is allowed.
    pub fn remaining(&self) -> Option<Duration> {
        match self.last_request.lock() {
            Ok(last_request) => last_request
                .map(|last| (last + self.min_interval).saturating_duration_since(Instant::now()))
                .filter(|remaining| !remaining.is_zero()),
            Err(e) => {
                log::warn!("Failed to acquire rate limiter lock (non-critical): {}", e);
                None
            }
        }
    }

    /// Reserve the next submission slot and sleep until it opens. The slot
    /// is recorded before sleeping, so concurrent callers queue up one
    /// interval apart.
    pub async fn wait(&self) {
        let slot = match self.last_request.lock() {
            Ok(mut last_request) => {
                let now = Instant::now();
                let slot = match *last_request {
                    Some(last) => (last + self.min_interval).max(now),
                    None => now,
                };
                *last_request = Some(slot);
                slot
            }
            Err(e) => {
                log::warn!("Failed to acquire rate limiter lock (non-critical): {}", e);
                return;
            }
        };

        let now = Instant::now();
        if slot > now {
            log::debug!("Rate limiting: waiting {:?} before next submission", slot - now);
            sleep_until(slot).await;
        }
    }

    /// Record that a submission just completed. The interval then counts
    /// from completion, unless a later slot is already reserved.
    pub fn mark(&self) {
        match self.last_request.lock() {
            Ok(mut last_request) => {
                let now = Instant::now();
                *last_request = Some(last_request.map_or(now, |last| last.max(now)));
            }
            Err(e) => {
                log::warn!("Failed to update rate limiter (non-critical): {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_out_remaining_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(1100));

        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.mark();
        sleep(Duration::from_millis(300)).await;

        let before = Instant::now();
        limiter.wait().await;
        assert!(before.elapsed() >= Duration::from_millis(800));
        assert!(before.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let limiter = RateLimiter::new(Duration::from_millis(1100));
        limiter.mark();
        sleep(Duration::from_millis(1500)).await;

        assert!(limiter.remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_get_separate_slots() {
        let limiter = RateLimiter::new(Duration::from_millis(1100));
        let start = Instant::now();

        let first = async {
            limiter.wait().await;
            Instant::now()
        };
        let second = async {
            limiter.wait().await;
            Instant::now()
        };
        let (a, b) = tokio::join!(first, second);

        let (earlier, later) = if a <= b { (a, b) } else { (b, a) };
        assert_eq!(earlier, start);
        assert!(later.duration_since(earlier) >= Duration::from_millis(1100));
    }
}
