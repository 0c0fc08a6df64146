// Per-client admission control using token buckets

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::sweeper::Sweeper;

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub capacity: u32,
    // empty to full
    pub refill_period: Duration,
    pub cleanup_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_period: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(5 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl Bucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    // Credits whole tokens earned since `last_refill`. The clock only moves
    // forward by the time those tokens cost, so fractional progress carries
    // over to the next call.
    fn refill(&mut self, config: &LimiterConfig, now: Instant) {
        let capacity = config.capacity;

        if self.tokens >= capacity || config.refill_period.is_zero() {
            // a full bucket earns nothing
            self.tokens = capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let period_nanos = config.refill_period.as_nanos();
        let earned = elapsed.as_nanos() * u128::from(capacity) / period_nanos;
        if earned == 0 {
            return;
        }

        let missing = u128::from(capacity - self.tokens);
        if earned >= missing {
            self.tokens = capacity;
            self.last_refill = now;
        } else {
            // earned < capacity here, so the cast and the product are bounded
            self.tokens += earned as u32;
            let spent = period_nanos * earned / u128::from(capacity);
            self.last_refill += Duration::from_nanos(spent as u64);
        }
    }
}

// Token bucket per client. A rejected request leaves the bucket untouched.
pub struct AdmissionLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    config: LimiterConfig,
}

impl AdmissionLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn allow(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        let bucket = buckets
            .entry(client_key.to_string())
            .or_insert_with(|| Bucket::full(self.config.capacity, now));

        bucket.refill(&self.config, now);

        if bucket.tokens >= 1 {
            bucket.tokens -= 1;
            true
        } else {
            tracing::debug!(client = client_key, "admission denied");
            false
        }
    }

    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            now.saturating_duration_since(bucket.last_refill) < idle_timeout
        });
        before - buckets.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> Sweeper {
        Sweeper::spawn(
            "admission_limiter",
            self.config.cleanup_interval,
            Arc::downgrade(self),
            AdmissionLimiter::evict_idle,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn limiter() -> AdmissionLimiter {
        AdmissionLimiter::new(LimiterConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject() {
        let limiter = limiter();

        for i in 0..10 {
            assert!(limiter.allow("10.0.0.1"), "request {i} should pass");
        }
        assert!(!limiter.allow("10.0.0.1"));

        // other clients have their own bucket
        assert!(limiter.allow("10.0.0.2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_refill_after_period() {
        let limiter = limiter();
        for _ in 0..10 {
            limiter.allow("client");
        }
        assert!(!limiter.allow("client"));

        tokio::time::advance(Duration::from_secs(60)).await;

        for _ in 0..10 {
            assert!(limiter.allow("client"));
        }
        assert!(!limiter.allow("client"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_refill_keeps_remainder() {
        // one token every 6s
        let limiter = limiter();
        for _ in 0..10 {
            limiter.allow("client");
        }

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!limiter.allow("client"));

        // 8s elapsed: one token granted, 2s carried forward
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.allow("client"));

        // 12s elapsed: second token only exists if the 2s were kept
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.allow("client"));
        assert!(!limiter.allow("client"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_bucket_does_not_bank_credit() {
        let limiter = limiter();
        assert!(limiter.allow("client"));

        // refills to full well before this, idle time must not count later
        tokio::time::advance(Duration::from_secs(600)).await;
        for _ in 0..10 {
            assert!(limiter.allow("client"));
        }
        assert!(!limiter.allow("client"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!limiter.allow("client"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle() {
        let limiter = limiter();
        limiter.allow("old");

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        limiter.allow("new");
        assert_eq!(limiter.evict_idle(), 0);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(limiter.evict_idle(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_clients() {
        let limiter = Arc::new(limiter());
        let sweeper = limiter.spawn_sweeper();

        limiter.allow("a");
        limiter.allow("b");
        assert_eq!(limiter.tracked_clients(), 2);

        tokio::time::sleep(Duration::from_secs(16 * 60)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        sweeper.stop().await;
    }

    #[test]
    fn test_concurrent_clients_never_exceed_capacity() {
        let limiter = Arc::new(AdmissionLimiter::new(LimiterConfig {
            capacity: 50,
            refill_period: Duration::from_secs(3600),
            ..LimiterConfig::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || (0..100).filter(|_| limiter.allow("shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
