//! Token-bucket admission control shared by every outgoing request.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// `rate` tokens per `per`, refilled continuously, capacity `rate`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// A full bucket of `rate` tokens replenished at `rate / per`.
    /// `rate` is clamped to at least one token and `per` to at least 1ms.
    pub fn new(rate: u32, per: Duration) -> Self {
        let capacity = f64::from(rate.max(1));
        let per = per.max(Duration::from_millis(1)).as_secs_f64();
        Self {
            capacity,
            refill_per_sec: capacity / per,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(1))
    }

    /// Take one token if available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Poll [`try_acquire`](Self::try_acquire) until it succeeds or `timeout`
    /// elapses. Returns whether a token was taken.
    pub async fn wait_acquire(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.try_acquire() {
                return true;
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}
