use std::{path::PathBuf, sync::Arc};

use tracing::info;

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod drainer;
pub mod error;
pub mod feed;
pub mod ingestor;
pub mod instrument;
pub mod logger;
pub mod schedule;
pub mod store;

pub use error::{Error, Result};

/// Starts the pipeline against in-process cache and store, replaying updates
/// from `replay_file`.
pub async fn run_in_memory(
    replay_file: PathBuf,
    config: config::Config,
) -> Result<(coordinator::PipelineHandle, Arc<store::MemoryStore>)> {
    let store = Arc::new(store::MemoryStore::new());
    let feed = Arc::new(feed::ReplayFeed::new(replay_file, config.replay_delay()));
    let pipeline = coordinator::Pipeline::new(
        config,
        Arc::new(cache::MemoryCache::new()),
        store.clone(),
        feed,
    );
    info!("Tracking {} keys in memory", pipeline.keys().len());
    Ok((pipeline.start().await?, store))
}

/// Starts the pipeline against Redis and Postgres. Failing to reach either
/// is fatal.
pub async fn run_persistent(
    replay_file: PathBuf,
    config: config::Config,
) -> Result<coordinator::PipelineHandle> {
    let cache = Arc::new(cache::RedisCache::connect(&config.cache_url).await?);
    let store = Arc::new(
        store::PostgresStore::connect(
            &config.database_url,
            config.raw_schema.clone(),
            config.aggregated_schema.clone(),
        )
        .await?,
    );
    let feed = Arc::new(feed::ReplayFeed::new(replay_file, config.replay_delay()));
    let pipeline = coordinator::Pipeline::new(config, cache, store, feed);
    info!("Tracking {} keys", pipeline.keys().len());
    pipeline.start().await
}
