//! Client-side request pacing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces calls at least `1 / rps` seconds apart.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A non-positive or non-finite rate disables pacing.
    pub fn new(rate_limit_rps: f64) -> Self {
        let interval = if rate_limit_rps.is_finite() && rate_limit_rps > 0.0 {
            Duration::from_secs_f64(1.0 / rate_limit_rps)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next call is allowed.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let slot = match *next_slot {
            Some(slot) if slot > now => {
                tokio::time::sleep_until(slot).await;
                slot
            }
            _ => now,
        };
        *next_slot = Some(slot + self.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_calls_by_interval() {
        let limiter = RateLimiter::new(2.0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // first call is immediate, the next two wait 500ms each
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn zero_rate_never_waits() {
        let limiter = RateLimiter::new(0.0);
        assert!(limiter.interval().is_zero());
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
