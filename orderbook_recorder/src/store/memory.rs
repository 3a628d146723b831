use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    cache::levels::PriceKey,
    error::{Error, Result},
    instrument::CacheKey,
    store::{AggregatedRow, BookStore, RawRow},
};

#[derive(Default)]
struct Tables {
    raw: Vec<RawRow>,
    aggregated: Vec<AggregatedRow>,
}

/// In-process store with the same append-only semantics as the relational
/// one. Writing to a table that was never created fails.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<CacheKey, Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw_rows(&self, key: &CacheKey) -> Vec<RawRow> {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.get(key).map(|t| t.raw.clone()))
            .unwrap_or_default()
    }

    pub fn aggregated_rows(&self, key: &CacheKey) -> Vec<AggregatedRow> {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.get(key).map(|t| t.aggregated.clone()))
            .unwrap_or_default()
    }

    pub fn has_tables(&self, key: &CacheKey) -> bool {
        self.tables
            .read()
            .map(|t| t.contains_key(key))
            .unwrap_or(false)
    }

    fn with_table<T>(&self, key: &CacheKey, f: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| Error::Lock(e.to_string()))?;
        let table = tables
            .get_mut(key)
            .ok_or_else(|| Error::TableNotFound(key.to_string()))?;
        Ok(f(table))
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn create_tables(&self, key: &CacheKey) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| Error::Lock(e.to_string()))?;
        tables.entry(key.clone()).or_default();
        Ok(())
    }

    async fn insert_raw(&self, key: &CacheKey, rows: &[RawRow]) -> Result<()> {
        self.with_table(key, |t| t.raw.extend_from_slice(rows))
    }

    async fn max_sizes(
        &self,
        key: &CacheKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(f64, f64)>> {
        self.with_table(key, |t| {
            let mut peaks: BTreeMap<PriceKey, f64> = BTreeMap::new();
            for row in t
                .raw
                .iter()
                .filter(|r| r.observed_at >= from && r.observed_at < to)
            {
                let peak = peaks.entry(PriceKey::new(row.price)).or_insert(row.size);
                *peak = peak.max(row.size);
            }
            peaks.into_iter().map(|(k, size)| (k.price, size)).collect()
        })
    }

    async fn insert_aggregated(&self, key: &CacheKey, rows: &[AggregatedRow]) -> Result<()> {
        self.with_table(key, |t| t.aggregated.extend_from_slice(rows))
    }
}
