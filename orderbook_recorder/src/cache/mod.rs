use async_trait::async_trait;

use crate::{error::Result, instrument::CacheKey};

pub mod levels;
pub mod memory;
pub mod redis;

pub use levels::{PriceLevel, SideLevels};
pub use memory::MemoryCache;
pub use self::redis::RedisCache;

/// Keyed collection of sorted price -> size sets, one per instrument side.
///
/// Keys are created implicitly by the first batch that touches them.
#[async_trait]
pub trait OrderBookCache: Send + Sync {
    /// Applies every update in order as a single indivisible unit. A zero
    /// size removes the price, anything else replaces the level.
    async fn apply_batch(&self, key: &CacheKey, updates: &[PriceLevel]) -> Result<()>;

    /// Full contents of one key in ascending price order. Unknown keys are
    /// empty.
    async fn snapshot(&self, key: &CacheKey) -> Result<Vec<PriceLevel>>;
}
