use std::thread;
use std::time::{Duration, Instant};
use parking_lot::Mutex;

/// Token bucket shared by every worker.
///
/// Callers reserve a token and get back how long to wait for it, then sleep
/// outside the lock. A slow reservation never holds up other workers.
pub struct RateLimiter {
    bucket: Option<Mutex<Bucket>>,
    rate: f64,
    burst: f64,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl RateLimiter {
    pub fn unlimited() -> Self {
        RateLimiter {
            bucket: None,
            rate: f64::INFINITY,
            burst: 1.0,
        }
    }

    /// `rate_per_sec == 0` means unlimited. The bucket starts full.
    pub fn new(rate_per_sec: u64, burst: usize) -> Self {
        if rate_per_sec == 0 {
            return RateLimiter::unlimited();
        }
        let burst = burst.max(1) as f64;
        RateLimiter {
            bucket: Some(Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            })),
            rate: rate_per_sec as f64,
            burst,
        }
    }

    pub fn is_limited(&self) -> bool {
        self.bucket.is_some()
    }

    /// Reserves one token, returning the delay before it may be used.
    pub fn reserve(&self) -> Duration {
        self.reserve_n_at(1, Instant::now())
    }

    pub(crate) fn reserve_n_at(&self, n: u32, now: Instant) -> Duration {
        let Some(bucket) = &self.bucket else {
            return Duration::ZERO;
        };

        let mut bucket = bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last = bucket.last.max(now);
        bucket.tokens -= n as f64;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    /// Reserves one token and sleeps until it is usable.
    pub fn wait(&self) {
        let delay = self.reserve();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(d: Duration, millis: u64) -> bool {
        let got = d.as_secs_f64() * 1000.0;
        (got - millis as f64).abs() < 1.0
    }

    #[test]
    fn test_unlimited_never_waits() {
        let limiter = RateLimiter::new(0, 8);
        assert!(!limiter.is_limited());
        for _ in 0..1000 {
            assert_eq!(limiter.reserve(), Duration::ZERO);
        }
    }

    #[test]
    fn test_burst_then_spaced_reservations() {
        let limiter = RateLimiter::new(10, 2);
        let now = Instant::now();

        assert_eq!(limiter.reserve_n_at(1, now), Duration::ZERO);
        assert_eq!(limiter.reserve_n_at(1, now), Duration::ZERO);
        assert!(approx(limiter.reserve_n_at(1, now), 100));
        assert!(approx(limiter.reserve_n_at(1, now), 200));
    }

    #[test]
    fn test_tokens_refill_over_time() {
        let limiter = RateLimiter::new(10, 1);
        let now = Instant::now();

        assert_eq!(limiter.reserve_n_at(1, now), Duration::ZERO);
        assert!(approx(limiter.reserve_n_at(1, now), 100));
        // 300ms later the debt is repaid and the bucket is capped at the burst
        let later = now + Duration::from_millis(300);
        assert_eq!(limiter.reserve_n_at(1, later), Duration::ZERO);
        assert!(approx(limiter.reserve_n_at(1, later), 100));
    }
}
