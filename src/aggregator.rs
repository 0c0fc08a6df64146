// Fan-out/join across all configured providers, fronted by the result cache

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::{
    cache::{CacheKey, ResultCache},
    context::{instant_after, ContextError, SearchContext},
    merge,
    models::{BackendRecord, CacheStatus, Query, SearchInfo, SearchResponse, SearchStats},
    provider::{HotelProvider, ProviderError},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search cancelled before it started")]
    Cancelled,

    #[error("search deadline already passed")]
    DeadlineExceeded,
}

impl From<ContextError> for SearchError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => SearchError::Cancelled,
            ContextError::DeadlineExceeded => SearchError::DeadlineExceeded,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    // clamped to the caller's deadline
    pub provider_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(2),
        }
    }
}

// One slot per provider, indexed by registration order. Once closed, late
// results are discarded so a provider contributes all of its records or none.
struct Accumulator {
    slots: Vec<Option<Vec<BackendRecord>>>,
    closed: bool,
}

impl Accumulator {
    fn new(providers: usize) -> Self {
        Self {
            slots: vec![None; providers],
            closed: false,
        }
    }

    fn record(&mut self, index: usize, records: Vec<BackendRecord>) -> bool {
        if self.closed {
            return false;
        }
        self.slots[index] = Some(records);
        true
    }

    fn close(&mut self) -> Vec<Option<Vec<BackendRecord>>> {
        self.closed = true;
        std::mem::take(&mut self.slots)
    }
}

struct FanOut {
    records: Vec<BackendRecord>,
    succeeded: usize,
    failed: usize,
}

pub struct Aggregator {
    providers: Vec<Arc<dyn HotelProvider>>,
    cache: Arc<ResultCache>,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Arc<dyn HotelProvider>>,
        cache: Arc<ResultCache>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            providers,
            cache,
            config,
        }
    }

    pub fn providers_total(&self) -> usize {
        self.providers.len()
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    // Errors only when `ctx` is already done on entry
    pub async fn search(
        &self,
        ctx: &SearchContext,
        query: &Query,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();

        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let key = CacheKey::from(query);
        if let Some(hotels) = self.cache.get(&key) {
            tracing::debug!(city = %query.city, hotels = hotels.len(), "cache hit");
            return Ok(SearchResponse {
                search: SearchInfo::from(query),
                stats: SearchStats {
                    providers_total: self.providers.len(),
                    providers_succeeded: 0,
                    providers_failed: 0,
                    cache: CacheStatus::Hit,
                    duration_ms: started.elapsed().as_millis() as u64,
                },
                hotels: hotels.to_vec(),
            });
        }

        let fan_out = self.fan_out(ctx, query).await;
        let hotels = merge::merge(fan_out.records, query);

        // a caller that gave up mid-flight must not poison the cache with a
        // partial answer
        if ctx.err().is_none() {
            self.cache.set(key, hotels.clone(), self.cache.ttl());
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            city = %query.city,
            checkin = %query.checkin,
            providers_succeeded = fan_out.succeeded,
            providers_failed = fan_out.failed,
            hotels = hotels.len(),
            duration_ms,
            "search completed"
        );

        Ok(SearchResponse {
            search: SearchInfo::from(query),
            stats: SearchStats {
                providers_total: self.providers.len(),
                providers_succeeded: fan_out.succeeded,
                providers_failed: fan_out.failed,
                cache: CacheStatus::Miss,
                duration_ms,
            },
            hotels,
        })
    }

    async fn fan_out(&self, ctx: &SearchContext, query: &Query) -> FanOut {
        let deadline = instant_after(self.config.provider_timeout);
        let inner = ctx.with_deadline(deadline);
        // the caller's own deadline may be tighter
        let deadline = inner.deadline().unwrap_or(deadline);

        let accumulator = Arc::new(Mutex::new(Accumulator::new(self.providers.len())));

        let mut handles = Vec::with_capacity(self.providers.len());
        for (index, provider) in self.providers.iter().enumerate() {
            let provider = Arc::clone(provider);
            let inner = inner.clone();
            let query = query.clone();
            let accumulator = Arc::clone(&accumulator);

            handles.push(tokio::spawn(async move {
                // enforce the deadline even for providers that ignore ctx
                let outcome: Result<Vec<BackendRecord>, ProviderError> = tokio::select! {
                    res = provider.search(&inner, &query) => res,
                    err = inner.done() => Err(err.into()),
                };

                match outcome {
                    Ok(records) => {
                        let count = records.len();
                        if !accumulator.lock().record(index, records) {
                            tracing::debug!(provider = provider.name(), "late result discarded");
                        } else {
                            tracing::debug!(
                                provider = provider.name(),
                                records = count,
                                "provider answered"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(provider = provider.name(), error = %err, "provider failed");
                    }
                }
            }));
        }

        if timeout_at(deadline, join_all(handles.iter_mut())).await.is_err() {
            tracing::warn!("provider fan-out hit its deadline");
        }
        // close first: a task finishing before its abort lands must not count
        let slots = accumulator.lock().close();
        for handle in &handles {
            handle.abort();
        }

        let mut succeeded = 0;
        let mut records = Vec::new();
        // registration order keeps duplicate tie-breaks deterministic
        for slot in slots.into_iter().flatten() {
            succeeded += 1;
            records.extend(slot);
        }

        FanOut {
            records,
            succeeded,
            failed: self.providers.len() - succeeded,
        }
    }
}
