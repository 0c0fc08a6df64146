// Hotel availability aggregation: admission control, result caching and
// concurrent fan-out across independent suppliers

pub mod admission;
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod context;
pub mod merge;
pub mod models;
pub mod provider;
pub mod sweeper;

// Re-export key types for convenience
pub use admission::{AdmissionLimiter, LimiterConfig};
pub use aggregator::{Aggregator, AggregatorConfig, SearchError};
pub use cache::{CacheConfig, CacheKey, CacheStats, ResultCache};
pub use config::{AppConfig, ConfigError};
pub use context::{CancelHandle, ContextError, SearchContext};
pub use models::{BackendRecord, CacheStatus, Query, QueryError, RankedHotel, SearchResponse};
pub use provider::{HotelProvider, ProviderError, StaticProvider};
pub use sweeper::Sweeper;
