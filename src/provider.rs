// Backend source contract consumed by the aggregator, plus in-process sources

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    context::{ContextError, SearchContext},
    models::{BackendRecord, Query},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider call cancelled")]
    Cancelled,

    #[error("provider call timed out")]
    Timeout,

    #[error("{provider}: {message}")]
    Unavailable { provider: String, message: String },
}

impl From<ContextError> for ProviderError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => ProviderError::Cancelled,
            ContextError::DeadlineExceeded => ProviderError::Timeout,
        }
    }
}

// Implementations must bail out with a cancellation error once `ctx` is done
#[async_trait]
pub trait HotelProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn search(
        &self,
        ctx: &SearchContext,
        query: &Query,
    ) -> Result<Vec<BackendRecord>, ProviderError>;
}

// Sleeps for `latency` unless the context finishes first
async fn simulate_latency(ctx: &SearchContext, latency: Duration) -> Result<(), ProviderError> {
    if let Some(err) = ctx.err() {
        return Err(err.into());
    }

    tokio::select! {
        err = ctx.done() => Err(err.into()),
        _ = tokio::time::sleep(latency) => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    records: Vec<BackendRecord>,
    latency: Duration,
    failure: Option<String>,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, records: Vec<BackendRecord>) -> Self {
        Self {
            name: name.into(),
            records,
            latency: Duration::ZERO,
            failure: None,
        }
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: vec![],
            latency: Duration::ZERO,
            failure: Some(message.into()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl HotelProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        ctx: &SearchContext,
        _query: &Query,
    ) -> Result<Vec<BackendRecord>, ProviderError> {
        simulate_latency(ctx, self.latency).await?;

        match &self.failure {
            Some(message) => Err(ProviderError::Unavailable {
                provider: self.name.clone(),
                message: message.clone(),
            }),
            None => Ok(self.records.clone()),
        }
    }
}

// Randomized suppliers used by the demo binary and soak tests
pub mod mock {
    use super::*;
    use rand::Rng;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct CatalogEntry {
        pub hotel_id: &'static str,
        pub name: &'static str,
        pub price: f64,
    }

    pub const MOCK1_CATALOG: &[CatalogEntry] = &[
        CatalogEntry {
            hotel_id: "H123",
            name: "Hotel Atlas",
            price: 129.90,
        },
        CatalogEntry {
            hotel_id: "H456",
            name: "Riad Zitoun",
            price: 89.50,
        },
        CatalogEntry {
            hotel_id: "H789",
            name: "Le Meridien",
            price: 199.00,
        },
    ];

    pub const MOCK2_CATALOG: &[CatalogEntry] = &[
        CatalogEntry {
            hotel_id: "H123",
            name: "Hotel Atlas",
            price: 135.00,
        },
        CatalogEntry {
            hotel_id: "H999",
            name: "Sofitel Palais",
            price: 250.00,
        },
        CatalogEntry {
            hotel_id: "H111",
            name: "Dar Soukkar",
            price: 75.00,
        },
        CatalogEntry {
            hotel_id: "H222",
            name: "Kech Boutique",
            price: 110.00,
        },
    ];

    pub const MOCK3_CATALOG: &[CatalogEntry] = &[
        CatalogEntry {
            hotel_id: "H789",
            name: "Le Meridien",
            price: 195.00,
        },
        CatalogEntry {
            hotel_id: "H333",
            name: "Royal Mansour",
            price: 450.00,
        },
        CatalogEntry {
            hotel_id: "H444",
            name: "La Mamounia",
            price: 380.00,
        },
    ];

    // Random latency and failures, inconsistent city casing
    #[derive(Debug, Clone)]
    pub struct MockProvider {
        name: String,
        catalog: &'static [CatalogEntry],
        min_latency_ms: u64,
        max_latency_ms: u64,
        failure_rate: f64,
        currency: &'static str,
    }

    impl MockProvider {
        pub fn new(name: impl Into<String>, catalog: &'static [CatalogEntry]) -> Self {
            Self {
                name: name.into(),
                catalog,
                min_latency_ms: 50,
                max_latency_ms: 500,
                failure_rate: 0.2,
                currency: "EUR",
            }
        }

        pub fn with_latency_ms(mut self, min: u64, max: u64) -> Self {
            self.min_latency_ms = min;
            self.max_latency_ms = max.max(min);
            self
        }

        pub fn with_failure_rate(mut self, rate: f64) -> Self {
            self.failure_rate = rate.clamp(0.0, 1.0);
            self
        }
    }

    fn title_case(city: &str) -> String {
        city.split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn random_casing(rng: &mut impl Rng, city: &str) -> String {
        match rng.gen_range(0..4) {
            0 => city.to_string(),
            1 => title_case(city),
            2 => city.to_uppercase(),
            _ => city.to_lowercase(),
        }
    }

    #[async_trait]
    impl HotelProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn search(
            &self,
            ctx: &SearchContext,
            query: &Query,
        ) -> Result<Vec<BackendRecord>, ProviderError> {
            // ThreadRng is not Send, keep it out of the await
            let latency = {
                let mut rng = rand::thread_rng();
                Duration::from_millis(rng.gen_range(self.min_latency_ms..=self.max_latency_ms))
            };

            simulate_latency(ctx, latency).await?;

            let mut rng = rand::thread_rng();
            if rng.gen::<f64>() < self.failure_rate {
                return Err(ProviderError::Unavailable {
                    provider: self.name.clone(),
                    message: "random provider failure".to_string(),
                });
            }

            Ok(self
                .catalog
                .iter()
                .map(|entry| BackendRecord {
                    hotel_id: entry.hotel_id.to_string(),
                    name: entry.name.to_string(),
                    city: random_casing(&mut rng, &query.city),
                    currency: self.currency.to_string(),
                    price: entry.price,
                    nights: query.nights,
                })
                .collect())
        }
    }

    #[cfg(test)]
    #[test]
    fn test_title_case() {
        assert_eq!(title_case("new york"), "New York");
        assert_eq!(title_case("pARIS"), "Paris");
    }

    pub fn default_providers() -> Vec<Arc<dyn HotelProvider>> {
        vec![
            Arc::new(MockProvider::new("Mock1", MOCK1_CATALOG)),
            Arc::new(MockProvider::new("Mock2", MOCK2_CATALOG)),
            Arc::new(MockProvider::new("Mock3", MOCK3_CATALOG)),
        ]
    }
}
