//! Minimum-gap rate limiter for judge calls.
//!
//! Enforces a minimum interval between consecutive calls across all worker
//! threads. Simpler than a token bucket and sufficient here: judge traffic
//! is steady, not bursty, and the API quota is a per-minute request count.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

pub struct RateLimiter {
    min_gap: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let min_gap = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / f64::from(requests_per_minute))
        };
        Self {
            min_gap,
            last_call: Mutex::new(None),
        }
    }

    /// Block until the minimum gap since the previous call has elapsed, then
    /// claim the slot. The slot is claimed under the lock so concurrent
    /// callers serialize instead of stampeding.
    pub fn wait(&self) {
        if self.min_gap.is_zero() {
            return;
        }
        loop {
            let sleep_for = {
                // poisoned lock degrades the limiter to a no-op
                let Ok(mut last) = self.last_call.lock() else {
                    return;
                };
                let now = Instant::now();
                match *last {
                    Some(prev) if now.duration_since(prev) < self.min_gap => {
                        self.min_gap - now.duration_since(prev)
                    }
                    _ => {
                        *last = Some(now);
                        return;
                    }
                }
            };
            trace!(sleep_ms = sleep_for.as_millis() as u64, "rate limit wait");
            std::thread::sleep(sleep_for);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_minimum_gap() {
        // 6000 rpm = 10ms gap, keeps the test fast
        let limiter = RateLimiter::new(6000);
        let start = Instant::now();
        limiter.wait();
        limiter.wait();
        limiter.wait();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn zero_rate_never_blocks() {
        let limiter = RateLimiter::new(0);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn first_call_is_immediate() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        limiter.wait();
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
