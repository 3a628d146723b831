use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    cache::PriceLevel,
    error::{Error, Result},
    instrument::Instrument,
};

pub mod replay;

pub use replay::ReplayFeed;

/// One level-2 diff for one instrument, as delivered by the exchange.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookUpdate {
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
}

/// Source of live level updates. The exchange connectivity itself lives
/// behind this trait.
#[async_trait]
pub trait LevelFeed: Send + Sync {
    /// Opens the update stream for one instrument. An error here means the
    /// instrument will produce no data at all.
    async fn subscribe(&self, instrument: &Instrument) -> Result<mpsc::Receiver<BookUpdate>>;
}

/// Feed whose streams are pushed by the embedding application.
#[derive(Default)]
pub struct ChannelFeed {
    receivers: Mutex<HashMap<String, mpsc::Receiver<BookUpdate>>>,
}

impl ChannelFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stream for the instrument and returns its sending half.
    pub fn register(&self, instrument: &Instrument, capacity: usize) -> mpsc::Sender<BookUpdate> {
        let (tx, rx) = mpsc::channel(capacity);
        if let Ok(mut receivers) = self.receivers.lock() {
            receivers.insert(instrument.id.clone(), rx);
        }
        tx
    }
}

#[async_trait]
impl LevelFeed for ChannelFeed {
    async fn subscribe(&self, instrument: &Instrument) -> Result<mpsc::Receiver<BookUpdate>> {
        let mut receivers = self.receivers.lock().map_err(|e| Error::FeedSubscription {
            instrument: instrument.id.clone(),
            reason: e.to_string(),
        })?;
        receivers
            .remove(&instrument.id)
            .ok_or_else(|| Error::FeedSubscription {
                instrument: instrument.id.clone(),
                reason: "no stream registered".into(),
            })
    }
}
