use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;

use crate::{
    cache::OrderBookCache,
    error::Result,
    instrument::CacheKey,
    schedule::{run_periodic, Clock, TickReport},
    store::{BookStore, RawRow},
};

/// Samples every tracked cache key into its raw table once per tick.
pub struct RawDrainer {
    cache: Arc<dyn OrderBookCache>,
    store: Arc<dyn BookStore>,
    keys: Arc<[CacheKey]>,
}

impl RawDrainer {
    pub fn new(
        cache: Arc<dyn OrderBookCache>,
        store: Arc<dyn BookStore>,
        keys: Arc<[CacheKey]>,
    ) -> Self {
        Self { cache, store, keys }
    }

    /// Snapshots and writes all keys concurrently, every level stamped with
    /// `now`. A failing key loses this tick's sample and nothing else.
    pub async fn drain_tick(&self, now: DateTime<Utc>) -> TickReport {
        let results = join_all(self.keys.iter().map(|key| self.drain_key(key, now))).await;
        TickReport::collect("drain", &self.keys, results)
    }

    async fn drain_key(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<usize> {
        let rows: Vec<RawRow> = self
            .cache
            .snapshot(key)
            .await?
            .into_iter()
            .map(|level| RawRow {
                price: level.price,
                size: level.size,
                observed_at: now,
            })
            .collect();
        self.store.insert_raw(key, &rows).await?;
        Ok(rows.len())
    }

    pub async fn run(
        self,
        period: Duration,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) {
        let drainer = &self;
        run_periodic("drain", period, clock.as_ref(), shutdown, |now| {
            drainer.drain_tick(now)
        })
        .await;
    }
}
