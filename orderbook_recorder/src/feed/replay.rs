use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info, warn, Instrument as _};

use crate::{
    cache::PriceLevel,
    error::{Error, Result},
    feed::{BookUpdate, LevelFeed},
    instrument::Instrument,
};

const CHANNEL_CAPACITY: usize = 1024;

/// One recorded update, e.g.
/// `{"symbol":"BTCUSDT","asks":[[101.0,3.0]],"bids":[[100.0,0.0]]}`.
#[derive(Debug, Deserialize)]
pub struct ReplayLine {
    pub symbol: String,
    #[serde(default)]
    pub asks: Vec<(f64, f64)>,
    #[serde(default)]
    pub bids: Vec<(f64, f64)>,
}

impl From<ReplayLine> for BookUpdate {
    fn from(line: ReplayLine) -> Self {
        let to_levels = |levels: Vec<(f64, f64)>| {
            levels
                .into_iter()
                .map(|(price, size)| PriceLevel::new(price, size))
                .collect()
        };
        BookUpdate {
            asks: to_levels(line.asks),
            bids: to_levels(line.bids),
        }
    }
}

/// Replays recorded level updates from a JSON-lines file, one stream per
/// subscribed instrument.
pub struct ReplayFeed {
    path: PathBuf,
    delay: Duration,
}

impl ReplayFeed {
    pub fn new(path: PathBuf, delay: Duration) -> Self {
        Self { path, delay }
    }
}

#[async_trait]
impl LevelFeed for ReplayFeed {
    async fn subscribe(&self, instrument: &Instrument) -> Result<mpsc::Receiver<BookUpdate>> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| Error::FeedSubscription {
                instrument: instrument.id.clone(),
                reason: format!("{}: {}", self.path.display(), e),
            })?;
        info!("Replaying {:?} for {}", self.path, instrument.id);

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let symbol = instrument.id.clone();
        let delay = self.delay;
        let span = tracing::info_span!("replay", instrument = %symbol);
        tokio::spawn(
            async move {
                let mut lines = BufReader::new(file).lines();
                let mut line_no = 0usize;
                loop {
                    let line = match lines.next_line().await {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Replay read failed: {}", e);
                            break;
                        }
                    };
                    line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record: ReplayLine = match serde_json::from_str(&line) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!("Skipping malformed line {}: {}", line_no, e);
                            continue;
                        }
                    };
                    if record.symbol != symbol {
                        continue;
                    }
                    if tx.send(record.into()).await.is_err() {
                        debug!("Subscriber gone, stopping replay");
                        break;
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                debug!("Replay finished after {} lines", line_no);
            }
            .instrument(span),
        );
        Ok(rx)
    }
}
