use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    cache::{OrderBookCache, PriceLevel},
    error::Result,
    feed::{BookUpdate, LevelFeed},
    instrument::{CacheKey, Instrument, Side},
};

/// Applies one instrument's level-update stream to the cache, one batch per
/// side per event, in arrival order.
pub struct Ingestor {
    instrument: Instrument,
    bid_key: CacheKey,
    ask_key: CacheKey,
    cache: Arc<dyn OrderBookCache>,
}

impl Ingestor {
    pub fn new(instrument: Instrument, cache: Arc<dyn OrderBookCache>) -> Self {
        Self {
            bid_key: CacheKey::new(&instrument, Side::Bid),
            ask_key: CacheKey::new(&instrument, Side::Ask),
            instrument,
            cache,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Applies both sides of the update. A failed batch is dropped and
    /// counted; the other side is still applied.
    pub async fn apply(&self, update: &BookUpdate) -> usize {
        let mut dropped = 0;
        if !self.apply_side(&self.ask_key, &update.asks).await {
            dropped += 1;
        }
        if !self.apply_side(&self.bid_key, &update.bids).await {
            dropped += 1;
        }
        dropped
    }

    async fn apply_side(&self, key: &CacheKey, levels: &[PriceLevel]) -> bool {
        if levels.is_empty() {
            return true;
        }
        match self.cache.apply_batch(key, levels).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping level batch");
                false
            }
        }
    }

    /// Subscribes and consumes the stream until the feed closes. Returns the
    /// number of events processed; a failed subscription is returned as the
    /// error so the instrument can be flagged unavailable.
    pub async fn run(&self, feed: &dyn LevelFeed) -> Result<u64> {
        let mut updates = feed.subscribe(&self.instrument).await?;
        info!("Subscribed to \"{}\" ticker changes", self.instrument.id);
        let mut processed = 0u64;
        let mut dropped = 0u64;
        while let Some(update) = updates.recv().await {
            dropped += self.apply(&update).await as u64;
            processed += 1;
            if processed % 10_000 == 0 {
                debug!(processed, dropped, "Ingestor progress");
            }
        }
        warn!(processed, dropped, "Feed closed for {}", self.instrument.id);
        Ok(processed)
    }
}
