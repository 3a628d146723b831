use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::info;

use crate::{
    cache::{OrderBookCache, PriceLevel},
    error::{Error, Result},
    instrument::CacheKey,
};

/// Redis sorted sets: the member is the price, the score is the size.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        info!("Connected to cache at {}", client.get_connection_info().addr);
        Ok(Self { connection })
    }
}

/// Shortest decimal that round-trips, so one price is always one member.
pub fn price_member(price: f64) -> String {
    (price + 0.0).to_string()
}

/// One `MULTI/EXEC` transaction: `ZADD key size price` for upserts,
/// `ZREM key price` for zero sizes, in update order.
pub fn batch_pipeline(key: &CacheKey, updates: &[PriceLevel]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for update in updates {
        let member = price_member(update.price);
        if update.is_removal() {
            pipe.zrem(key.as_str(), member).ignore();
        } else {
            pipe.zadd(key.as_str(), member, update.size).ignore();
        }
    }
    pipe
}

/// Parses `ZRANGE ... WITHSCORES` output into levels in ascending price
/// order. Redis returns members by score, i.e. by size.
pub fn levels_from_members(
    key: &CacheKey,
    members: Vec<(String, f64)>,
) -> Result<Vec<PriceLevel>> {
    let mut levels = members
        .into_iter()
        .map(|(member, size)| {
            member
                .parse::<f64>()
                .map(|price| PriceLevel::new(price, size))
                .map_err(|e| Error::Cache(key.to_string(), format!("bad member {member}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    levels.sort_by(|a, b| a.price.total_cmp(&b.price));
    Ok(levels)
}

#[async_trait]
impl OrderBookCache for RedisCache {
    async fn apply_batch(&self, key: &CacheKey, updates: &[PriceLevel]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        for update in updates {
            update.validate()?;
        }
        let pipe = batch_pipeline(key, updates);
        let mut connection = self.connection.clone();
        let () = pipe.query_async(&mut connection).await?;
        Ok(())
    }

    async fn snapshot(&self, key: &CacheKey) -> Result<Vec<PriceLevel>> {
        let mut connection = self.connection.clone();
        let members: Vec<(String, f64)> = connection.zrange_withscores(key.as_str(), 0, -1).await?;
        levels_from_members(key, members)
    }
}
