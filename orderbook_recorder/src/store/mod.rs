use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{error::Result, instrument::CacheKey};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// One level sampled at a drain tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawRow {
    pub price: f64,
    pub size: f64,
    pub observed_at: DateTime<Utc>,
}

/// Peak size seen at one price over an aggregation window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregatedRow {
    pub price: f64,
    pub max_size: f64,
    pub computed_at: DateTime<Utc>,
}

/// Append-only time-series store with one raw and one aggregated table per
/// cache key, both named after the key.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Creates the raw and aggregated tables for the key if missing.
    async fn create_tables(&self, key: &CacheKey) -> Result<()>;

    async fn insert_raw(&self, key: &CacheKey, rows: &[RawRow]) -> Result<()>;

    /// `(price, max(size))` over raw rows with `from <= observed_at < to`,
    /// one entry per distinct price.
    async fn max_sizes(
        &self,
        key: &CacheKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(f64, f64)>>;

    async fn insert_aggregated(&self, key: &CacheKey, rows: &[AggregatedRow]) -> Result<()>;
}
