use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::watch;

use crate::{
    error::Result,
    instrument::CacheKey,
    schedule::{run_periodic, Clock, TickReport},
    store::{AggregatedRow, BookStore},
};

/// Rolls the trailing window of raw samples into one peak size per price.
pub struct MinuteAggregator {
    store: Arc<dyn BookStore>,
    keys: Arc<[CacheKey]>,
    window: chrono::Duration,
}

impl MinuteAggregator {
    pub fn new(store: Arc<dyn BookStore>, keys: Arc<[CacheKey]>, window: Duration) -> Self {
        Self {
            store,
            keys,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Aggregates `[now - window, now)` for every key concurrently. Prices
    /// without samples in the window produce no row.
    pub async fn aggregate_tick(&self, now: DateTime<Utc>) -> TickReport {
        let from = now
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let results = join_all(
            self.keys
                .iter()
                .map(|key| self.aggregate_key(key, from, now)),
        )
        .await;
        TickReport::collect("aggregate", &self.keys, results)
    }

    async fn aggregate_key(
        &self,
        key: &CacheKey,
        from: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let rows: Vec<AggregatedRow> = self
            .store
            .max_sizes(key, from, now)
            .await?
            .into_iter()
            .map(|(price, max_size)| AggregatedRow {
                price,
                max_size,
                computed_at: now,
            })
            .collect();
        self.store.insert_aggregated(key, &rows).await?;
        Ok(rows.len())
    }

    pub async fn run(
        self,
        period: Duration,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) {
        let aggregator = &self;
        run_periodic("aggregate", period, clock.as_ref(), shutdown, |now| {
            aggregator.aggregate_tick(now)
        })
        .await;
    }
}
