use std::fmt;

use serde::Deserialize;

/// Tradable instrument as listed by the exchange.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Instrument {
    /// Exchange-native identifier, e.g. `BTCUSDT`.
    pub id: String,
    pub base: String,
    pub quote: String,
}

impl Instrument {
    pub fn new(id: impl Into<String>, base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Bid, Side::Ask];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

/// Address of one sorted set in the cache and of one table in each schema
/// of the durable store. Always `base:quote:side`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(instrument: &Instrument, side: Side) -> Self {
        Self(format!(
            "{}:{}:{}",
            instrument.base,
            instrument.quote,
            side.as_str()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every key the pipeline reads or writes: bid keys for all instruments,
/// followed by ask keys.
pub fn tracked_keys(instruments: &[Instrument]) -> Vec<CacheKey> {
    Side::ALL
        .iter()
        .flat_map(|side| instruments.iter().map(|i| CacheKey::new(i, *side)))
        .collect()
}
