use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use orderbook_recorder_lib::{
    cache::{MemoryCache, OrderBookCache, PriceLevel},
    config::Config,
    coordinator::Pipeline,
    feed::{BookUpdate, ChannelFeed},
    instrument::{CacheKey, Instrument, Side},
    schedule::TokioClock,
    store::{AggregatedRow, BookStore, MemoryStore, RawRow},
    Error, Result,
};

fn btc() -> Instrument {
    Instrument::new("BTCUSDT", "BTC", "USDT")
}

fn eth() -> Instrument {
    Instrument::new("ETHUSDT", "ETH", "USDT")
}

fn test_config(instruments: Vec<Instrument>) -> Config {
    Config {
        instruments,
        ..Config::default()
    }
}

fn bids(levels: &[(f64, f64)]) -> BookUpdate {
    BookUpdate {
        asks: vec![],
        bids: levels
            .iter()
            .map(|(price, size)| PriceLevel::new(*price, *size))
            .collect(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_drains_and_aggregates() {
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(ChannelFeed::new());
    let btc_feed = feed.register(&btc(), 16);

    let pipeline = Pipeline::new(
        test_config(vec![btc(), eth()]),
        cache.clone(),
        store.clone(),
        feed.clone(),
    );
    assert_eq!(pipeline.keys().len(), 4);
    let handle = pipeline.start().await.unwrap();
    for key in handle.keys() {
        assert!(store.has_tables(key), "{}", key);
    }

    let btc_bid = CacheKey::new(&btc(), Side::Bid);
    btc_feed
        .send(bids(&[(100.0, 5.0), (101.0, 3.0)]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let first_drain = store.raw_rows(&btc_bid);
    assert_eq!(first_drain.len(), 2);
    assert_eq!((first_drain[0].price, first_drain[0].size), (100.0, 5.0));
    assert_eq!((first_drain[1].price, first_drain[1].size), (101.0, 3.0));
    assert_eq!(first_drain[0].observed_at, first_drain[1].observed_at);
    assert!(store.raw_rows(&CacheKey::new(&eth(), Side::Bid)).is_empty());
    assert_eq!(handle.unavailable(), vec!["ETHUSDT".to_string()]);

    btc_feed.send(bids(&[(100.0, 8.0)])).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    btc_feed.send(bids(&[(100.0, 0.0)])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(59_000)).await;

    let mut aggregated = store.aggregated_rows(&btc_bid);
    aggregated.sort_by(|a, b| a.price.total_cmp(&b.price));
    let peaks: Vec<(f64, f64)> = aggregated.iter().map(|r| (r.price, r.max_size)).collect();
    assert_eq!(peaks, vec![(100.0, 8.0), (101.0, 3.0)]);
    assert!(store
        .aggregated_rows(&CacheKey::new(&eth(), Side::Ask))
        .is_empty());
    assert_eq!(
        cache.snapshot(&btc_bid).await.unwrap(),
        vec![PriceLevel::new(101.0, 3.0)]
    );

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rows_are_stamped_by_the_injected_clock() {
    let anchor = Utc::now();
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(ChannelFeed::new());
    let btc_feed = feed.register(&btc(), 16);
    let config = Config {
        aggregation_window_ms: 30_000,
        ..test_config(vec![btc()])
    };
    let handle = Pipeline::new(config, Arc::new(MemoryCache::new()), store.clone(), feed)
        .with_clock(Arc::new(TokioClock::new(anchor)))
        .start()
        .await
        .unwrap();

    btc_feed
        .send(bids(&[(100.0, 8.0), (101.0, 3.0)]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;
    btc_feed.send(bids(&[(100.0, 0.0)])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(58_000)).await;

    let btc_bid = CacheKey::new(&btc(), Side::Bid);
    let mut stamps: Vec<DateTime<Utc>> = store
        .raw_rows(&btc_bid)
        .iter()
        .map(|r| r.observed_at)
        .collect();
    stamps.dedup();
    assert_eq!(stamps.first(), Some(&(anchor + chrono::Duration::seconds(1))));
    assert!(stamps.len() >= 59);
    for pair in stamps.windows(2) {
        assert_eq!(pair[1] - pair[0], chrono::Duration::seconds(1));
    }

    // 100 was removed long before the 30s window ending at the first
    // aggregation tick
    let aggregated = store.aggregated_rows(&btc_bid);
    let peaks: Vec<(f64, f64)> = aggregated.iter().map(|r| (r.price, r.max_size)).collect();
    assert_eq!(peaks, vec![(101.0, 3.0)]);
    assert_eq!(
        aggregated[0].computed_at,
        anchor + chrono::Duration::seconds(60)
    );

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_instruments_do_not_interfere() {
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(ChannelFeed::new());
    let btc_feed = feed.register(&btc(), 16);
    let eth_feed = feed.register(&eth(), 16);
    let handle = Pipeline::new(
        test_config(vec![btc(), eth()]),
        cache.clone(),
        store.clone(),
        feed,
    )
    .start()
    .await
    .unwrap();

    eth_feed
        .send(BookUpdate {
            asks: vec![PriceLevel::new(3000.0, 2.0)],
            bids: vec![],
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let eth_ask = CacheKey::new(&eth(), Side::Ask);
    let before = cache.snapshot(&eth_ask).await.unwrap();

    btc_feed
        .send(BookUpdate {
            asks: vec![PriceLevel::new(3000.0, 9.0), PriceLevel::new(3000.0, 0.0)],
            bids: vec![PriceLevel::new(3000.0, 1.0)],
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(cache.snapshot(&eth_ask).await.unwrap(), before);
    assert!(handle.unavailable().is_empty());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_ticks() {
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(ChannelFeed::new());
    let btc_feed = feed.register(&btc(), 16);
    let handle = Pipeline::new(test_config(vec![btc()]), cache, store.clone(), feed)
        .start()
        .await
        .unwrap();
    btc_feed.send(bids(&[(100.0, 1.0)])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    let btc_bid = CacheKey::new(&btc(), Side::Bid);
    assert_eq!(store.raw_rows(&btc_bid).len(), 3);

    handle.shutdown().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(store.raw_rows(&btc_bid).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_max_instruments_limits_tracked_keys() {
    let config = Config {
        max_instruments: 1,
        ..test_config(vec![btc(), eth()])
    };
    let pipeline = Pipeline::new(
        config,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryStore::new()),
        Arc::new(ChannelFeed::new()),
    );
    assert_eq!(pipeline.instruments(), &[btc()]);
    let keys: Vec<&str> = pipeline.keys().iter().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["BTC:USDT:bid", "BTC:USDT:ask"]);
}

/// Store whose tables can never be created.
struct UnreachableStore;

#[async_trait]
impl BookStore for UnreachableStore {
    async fn create_tables(&self, key: &CacheKey) -> Result<()> {
        Err(Error::TableNotFound(key.to_string()))
    }

    async fn insert_raw(&self, _key: &CacheKey, _rows: &[RawRow]) -> Result<()> {
        Ok(())
    }

    async fn max_sizes(
        &self,
        _key: &CacheKey,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<(f64, f64)>> {
        Ok(vec![])
    }

    async fn insert_aggregated(&self, _key: &CacheKey, _rows: &[AggregatedRow]) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_table_creation_failure_aborts_start() {
    let feed = Arc::new(ChannelFeed::new());
    let pipeline = Pipeline::new(
        test_config(vec![btc()]),
        Arc::new(MemoryCache::new()),
        Arc::new(UnreachableStore),
        feed,
    );
    assert!(pipeline.start().await.is_err());
}
