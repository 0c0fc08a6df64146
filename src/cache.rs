// Short-lived memoization of aggregated search results
// Sits in front of the provider fan-out so identical searches inside the TTL window
// never reach the suppliers twice.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::{
    context::instant_after,
    models::{Query, RankedHotel},
    sweeper::Sweeper,
};

// Snapshot of cache counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

// City is compared case-insensitively
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    city: String,
    checkin: NaiveDate,
    nights: u32,
    adults: u32,
}

impl From<&Query> for CacheKey {
    fn from(query: &Query) -> Self {
        Self {
            city: query.city.to_lowercase(),
            checkin: query.checkin,
            nights: query.nights,
            adults: query.adults,
        }
    }
}

struct CacheEntry {
    hotels: Arc<[RankedHotel]>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    expired: AtomicUsize,
}

// Stores hotel lists only, never whole responses: stats are per call
pub struct ResultCache {
    // sharded RwLock map: concurrent readers, exclusive writers per shard
    store: DashMap<CacheKey, CacheEntry>,
    config: CacheConfig,
    counters: Counters,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: DashMap::new(),
            config,
            counters: Counters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<[RankedHotel]>> {
        let now = Instant::now();

        // read guard is released when the closure returns
        let lookup = self
            .store
            .get(key)
            .map(|entry| entry.is_fresh(now).then(|| Arc::clone(&entry.hotels)));

        match lookup {
            Some(Some(hotels)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(hotels)
            }
            Some(None) => {
                // a concurrent set may have refreshed it in between
                if self
                    .store
                    .remove_if(key, |_, entry| !entry.is_fresh(now))
                    .is_some()
                {
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: CacheKey, hotels: Vec<RankedHotel>, ttl: Duration) {
        let entry = CacheEntry {
            hotels: hotels.into(),
            expires_at: instant_after(ttl),
        };
        self.store.insert(key, entry);
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.store.retain(|_, entry| {
            let fresh = entry.is_fresh(now);
            if !fresh {
                removed += 1;
            }
            fresh
        });

        self.counters.expired.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            items_count: self.store.len(),
            hit_count: self.counters.hits.load(Ordering::Relaxed),
            miss_count: self.counters.misses.load(Ordering::Relaxed),
            expired_count: self.counters.expired.load(Ordering::Relaxed),
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> Sweeper {
        Sweeper::spawn(
            "result_cache",
            self.config.cleanup_interval,
            Arc::downgrade(self),
            ResultCache::purge_expired,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hotel(id: &str, price: f64) -> RankedHotel {
        RankedHotel {
            hotel_id: id.to_string(),
            name: format!("Hotel {id}"),
            currency: "EUR".to_string(),
            price,
        }
    }

    fn key(city: &str) -> CacheKey {
        CacheKey::from(&Query::parse(city, "2025-06-01", 2, 2).unwrap())
    }

    #[test]
    fn test_key_ignores_city_case() {
        assert_eq!(key("Paris"), key("PARIS"));
        assert_ne!(key("Paris"), key("Lyon"));
    }

    #[test]
    fn test_key_is_structured() {
        // "a1" + nights 11 vs "a11" + nights 1 would collide as a flat string
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let a = CacheKey::from(&Query::new("a1", date, 11, 2));
        let b = CacheKey::from(&Query::new("a11", date, 1, 2));
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_and_set() {
        let cache = ResultCache::new(CacheConfig::default());
        assert!(cache.get(&key("Paris")).is_none());

        cache.set(key("Paris"), vec![hotel("H2", 80.0), hotel("H1", 120.0)], cache.ttl());

        let hotels = cache.get(&key("paris")).unwrap();
        assert_eq!(hotels.len(), 2);
        assert_eq!(hotels[0].hotel_id, "H2");

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.items_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_and_ttl() {
        let cache = ResultCache::new(CacheConfig::default());

        cache.set(key("Paris"), vec![hotel("H1", 10.0)], Duration::from_secs(5));
        cache.set(key("Lyon"), vec![hotel("H2", 20.0)], Duration::from_secs(2));

        assert!(cache.get(&key("Paris")).is_some());
        assert!(cache.get(&key("Lyon")).is_some());

        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(cache.get(&key("Paris")).is_some());
        assert!(cache.get(&key("Lyon")).is_none());
        // lazily evicted on read
        assert_eq!(cache.len(), 1);

        // expiry is inclusive of the exact deadline
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&key("Paris")).is_none());
        assert!(cache.is_empty());

        assert_eq!(cache.stats().expired_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_replaces_entry() {
        let cache = ResultCache::new(CacheConfig::default());
        cache.set(key("Paris"), vec![hotel("H1", 10.0)], Duration::from_secs(1));

        tokio::time::advance(Duration::from_millis(900)).await;
        cache.set(key("Paris"), vec![hotel("H9", 99.0)], Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(2)).await;
        let hotels = cache.get(&key("Paris")).unwrap();
        assert_eq!(hotels[0].hotel_id, "H9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResultCache::new(CacheConfig::default());
        cache.set(key("Paris"), vec![], Duration::from_secs(1));
        cache.set(key("Lyon"), vec![], Duration::from_secs(1));
        cache.set(key("Nice"), vec![], Duration::from_secs(60));

        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expired_count, 2);
    }

    #[test]
    fn test_purge_ignores_concurrent_inserts() {
        let cache = Arc::new(ResultCache::new(CacheConfig::default()));
        // already expired: freshness requires now < expires_at
        cache.set(key("Paris"), vec![], Duration::ZERO);

        let writer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..200 {
                    let city = format!("City{i}");
                    cache.set(key(&city), vec![], Duration::from_secs(60));
                }
            })
        };
        let removed = cache.purge_expired();
        writer.join().unwrap();

        // fresh inserts racing the sweep never count as removals
        assert_eq!(removed, 1);
        assert_eq!(cache.stats().expired_count, 1);
        assert_eq!(cache.len(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_does_not_overflow() {
        let cache = ResultCache::new(CacheConfig::default());
        cache.set(key("Paris"), vec![hotel("H1", 10.0)], Duration::MAX);

        tokio::time::advance(Duration::from_secs(86400 * 365)).await;
        assert!(cache.get(&key("Paris")).is_some());
        assert_eq!(cache.purge_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_unread_keys() {
        let cache = Arc::new(ResultCache::new(CacheConfig {
            ttl: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
        }));
        let sweeper = cache.spawn_sweeper();

        cache.set(key("Paris"), vec![hotel("H1", 1.0)], cache.ttl());
        cache.set(key("Lyon"), vec![hotel("H2", 2.0)], cache.ttl());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expired_count, 2);

        sweeper.stop().await;
    }

    #[test]
    fn test_concurrent_access_with_contention() {
        let cache = Arc::new(ResultCache::new(CacheConfig::default()));
        let cities = ["Paris", "Lyon", "Nice", "Lille"];
        let threads_count = 16;
        let operations_per_thread = 1000;

        let mut handles = vec![];
        for i in 0..threads_count {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for j in 0..operations_per_thread {
                    let k = key(cities[(i + j) % cities.len()]);
                    if j % 10 < 8 {
                        let _ = cache.get(&k);
                    } else {
                        cache.set(k, vec![hotel("H1", j as f64 + 1.0)], Duration::from_secs(300));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert_eq!(
            stats.hit_count + stats.miss_count,
            threads_count * operations_per_thread * 8 / 10
        );
        assert!(stats.items_count <= cities.len());
        assert!(stats.hit_count > 0);
    }
}
