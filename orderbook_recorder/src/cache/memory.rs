use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;

use crate::{
    cache::{OrderBookCache, PriceLevel, SideLevels},
    error::{Error, Result},
    instrument::CacheKey,
};

/// In-process cache. A batch is applied under one write lock, so readers
/// never observe a partially applied batch.
#[derive(Default)]
pub struct MemoryCache {
    books: RwLock<HashMap<CacheKey, SideLevels>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn keys(&self) -> Vec<CacheKey> {
        match self.books.read() {
            Ok(books) => books.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl OrderBookCache for MemoryCache {
    async fn apply_batch(&self, key: &CacheKey, updates: &[PriceLevel]) -> Result<()> {
        let mut books = self
            .books
            .write()
            .map_err(|e| Error::Cache(key.to_string(), e.to_string()))?;
        books.entry(key.clone()).or_default().apply_batch(updates)
    }

    async fn snapshot(&self, key: &CacheKey) -> Result<Vec<PriceLevel>> {
        let books = self
            .books
            .read()
            .map_err(|e| Error::Cache(key.to_string(), e.to_string()))?;
        Ok(books.get(key).map(|l| l.levels()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{Instrument, Side};

    fn keys() -> (CacheKey, CacheKey) {
        let btc = Instrument::new("BTCUSDT", "BTC", "USDT");
        let eth = Instrument::new("ETHUSDT", "ETH", "USDT");
        (CacheKey::new(&btc, Side::Bid), CacheKey::new(&eth, Side::Bid))
    }

    #[tokio::test]
    async fn test_unknown_key_is_created_on_first_batch() {
        let cache = MemoryCache::new();
        let (btc, _) = keys();
        assert!(cache.snapshot(&btc).await.unwrap().is_empty());

        cache
            .apply_batch(&btc, &[PriceLevel::new(100.0, 5.0)])
            .await
            .unwrap();

        assert_eq!(cache.keys(), vec![btc.clone()]);
        assert_eq!(
            cache.snapshot(&btc).await.unwrap(),
            vec![PriceLevel::new(100.0, 5.0)]
        );
    }

    #[tokio::test]
    async fn test_snapshot_reflects_batch_merged_with_prior_state() {
        let cache = MemoryCache::new();
        let (btc, _) = keys();
        cache
            .apply_batch(
                &btc,
                &[PriceLevel::new(100.0, 5.0), PriceLevel::new(101.0, 3.0)],
            )
            .await
            .unwrap();
        cache
            .apply_batch(
                &btc,
                &[
                    PriceLevel::new(101.0, 0.0),
                    PriceLevel::new(102.0, 1.0),
                    PriceLevel::new(100.0, 6.0),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            cache.snapshot(&btc).await.unwrap(),
            vec![PriceLevel::new(100.0, 6.0), PriceLevel::new(102.0, 1.0)]
        );
    }

    #[tokio::test]
    async fn test_keys_do_not_interfere() {
        let cache = MemoryCache::new();
        let (btc, eth) = keys();
        cache
            .apply_batch(&eth, &[PriceLevel::new(3000.0, 2.0)])
            .await
            .unwrap();
        let before = cache.snapshot(&eth).await.unwrap();

        cache
            .apply_batch(
                &btc,
                &[PriceLevel::new(3000.0, 9.0), PriceLevel::new(3000.0, 0.0)],
            )
            .await
            .unwrap();

        assert_eq!(cache.snapshot(&eth).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_negative_values_are_stored_as_received() {
        let cache = MemoryCache::new();
        let (btc, _) = keys();

        cache
            .apply_batch(
                &btc,
                &[PriceLevel::new(100.0, 5.0), PriceLevel::new(101.0, -0.5)],
            )
            .await
            .unwrap();

        assert_eq!(
            cache.snapshot(&btc).await.unwrap(),
            vec![PriceLevel::new(100.0, 5.0), PriceLevel::new(101.0, -0.5)]
        );
    }

    #[tokio::test]
    async fn test_non_finite_batch_leaves_key_unchanged() {
        let cache = MemoryCache::new();
        let (btc, _) = keys();
        cache
            .apply_batch(&btc, &[PriceLevel::new(100.0, 5.0)])
            .await
            .unwrap();

        let result = cache
            .apply_batch(
                &btc,
                &[PriceLevel::new(100.0, 0.0), PriceLevel::new(101.0, f64::INFINITY)],
            )
            .await;

        assert!(result.is_err());
        assert_eq!(
            cache.snapshot(&btc).await.unwrap(),
            vec![PriceLevel::new(100.0, 5.0)]
        );
    }
}
