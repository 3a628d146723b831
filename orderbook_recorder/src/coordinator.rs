use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
};

use tokio::{sync::watch, task::JoinHandle, task::JoinSet};
use tracing::{error, info, info_span, warn, Instrument as _};

use crate::{
    aggregator::MinuteAggregator,
    cache::OrderBookCache,
    config::Config,
    drainer::RawDrainer,
    error::Result,
    feed::LevelFeed,
    ingestor::Ingestor,
    instrument::{tracked_keys, CacheKey, Instrument},
    schedule::{Clock, SystemClock},
    store::BookStore,
};

/// Wires one ingestor per instrument and a single drainer/aggregator pair
/// around a shared cache and store.
pub struct Pipeline {
    config: Config,
    instruments: Vec<Instrument>,
    keys: Arc<[CacheKey]>,
    cache: Arc<dyn OrderBookCache>,
    store: Arc<dyn BookStore>,
    feed: Arc<dyn LevelFeed>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        cache: Arc<dyn OrderBookCache>,
        store: Arc<dyn BookStore>,
        feed: Arc<dyn LevelFeed>,
    ) -> Self {
        let instruments = config.tracked_instruments();
        let keys = tracked_keys(&instruments).into();
        Self {
            config,
            instruments,
            keys,
            cache,
            store,
            feed,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the wall clock that stamps drained and aggregated rows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }

    /// Creates every table, then starts ingestion and the periodic tasks.
    /// Any table creation failure aborts the start.
    pub async fn start(self) -> Result<PipelineHandle> {
        self.config.validate()?;
        for key in self.keys.iter() {
            self.store.create_tables(key).await?;
        }
        info!("Created tables for {} keys", self.keys.len());

        let unavailable = Arc::new(Mutex::new(BTreeSet::new()));
        let mut ingestors = JoinSet::new();
        info!("Starting {} ingestors ...", self.instruments.len());
        for instrument in &self.instruments {
            let ingestor = Ingestor::new(instrument.clone(), self.cache.clone());
            let feed = self.feed.clone();
            let unavailable = unavailable.clone();
            let id = instrument.id.clone();
            let span = info_span!("ingestor", instrument = %instrument.id);
            ingestors.spawn(
                async move {
                    if let Err(e) = ingestor.run(feed.as_ref()).await {
                        error!(error = %e, "Instrument unavailable");
                        if let Ok(mut unavailable) = unavailable.lock() {
                            unavailable.insert(id);
                        }
                    }
                }
                .instrument(span),
            );
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        info!("Starting persist tasks ...");
        let drainer = tokio::spawn(
            RawDrainer::new(self.cache.clone(), self.store.clone(), self.keys.clone())
                .run(
                    self.config.drain_period(),
                    self.clock.clone(),
                    shutdown_rx.clone(),
                )
                .instrument(info_span!("drainer")),
        );
        let aggregator = tokio::spawn(
            MinuteAggregator::new(
                self.store.clone(),
                self.keys.clone(),
                self.config.aggregation_window(),
            )
            .run(self.config.aggregation_period(), self.clock, shutdown_rx)
            .instrument(info_span!("aggregator")),
        );

        Ok(PipelineHandle {
            keys: self.keys,
            unavailable,
            ingestors,
            drainer,
            aggregator,
            shutdown,
        })
    }
}

pub struct PipelineHandle {
    keys: Arc<[CacheKey]>,
    unavailable: Arc<Mutex<BTreeSet<String>>>,
    ingestors: JoinSet<()>,
    drainer: JoinHandle<()>,
    aggregator: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl PipelineHandle {
    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }

    /// Ids of instruments whose feed could not be subscribed.
    pub fn unavailable(&self) -> Vec<String> {
        self.unavailable
            .lock()
            .map(|u| u.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Stops issuing ticks, lets in-flight ticks finish and drops the
    /// ingestors.
    pub async fn shutdown(mut self) {
        info!("Shutting down pipeline");
        let _ = self.shutdown.send(true);
        for (name, task) in [("drainer", self.drainer), ("aggregator", self.aggregator)] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "Periodic task ended abnormally");
            }
        }
        self.ingestors.abort_all();
        while self.ingestors.join_next().await.is_some() {}
        info!("Pipeline stopped");
    }
}
