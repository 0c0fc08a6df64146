// Demo entrypoint: runs searches against the mock suppliers and prints the
// responses as JSON

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use hotel_aggregator::{
    provider::mock::default_providers, AdmissionLimiter, Aggregator, AppConfig, Query,
    ResultCache, SearchContext,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hotel-aggr", about = "Aggregate hotel availability across mock suppliers")]
struct Args {
    #[arg(long)]
    city: String,

    /// Check-in date, YYYY-MM-DD
    #[arg(long)]
    checkin: String,

    #[arg(long, default_value_t = 1)]
    nights: u32,

    #[arg(long, default_value_t = 1)]
    adults: u32,

    /// Identity used for admission control
    #[arg(long, default_value = "127.0.0.1")]
    client: String,

    /// How many times to issue the same search
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Overall budget per search in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hotel_aggregator=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    let query = Query::parse(&args.city, &args.checkin, args.nights, args.adults)
        .context("invalid search")?;

    let cache = Arc::new(ResultCache::new(config.cache.clone()));
    let limiter = Arc::new(AdmissionLimiter::new(config.limiter.clone()));
    let cache_sweeper = cache.spawn_sweeper();
    let limiter_sweeper = limiter.spawn_sweeper();

    let aggregator = Aggregator::new(default_providers(), Arc::clone(&cache), config.aggregator);

    for attempt in 1..=args.repeat {
        if !limiter.allow(&args.client) {
            tracing::warn!(client = %args.client, attempt, "rate limit exceeded");
            continue;
        }

        let ctx = SearchContext::background().with_timeout(Duration::from_millis(args.timeout_ms));
        let response = aggregator
            .search(&ctx, &query)
            .await
            .context("search failed")?;

        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    tracing::info!(cache = ?cache.stats(), clients = limiter.tracked_clients(), "done");

    cache_sweeper.stop().await;
    limiter_sweeper.stop().await;
    Ok(())
}
