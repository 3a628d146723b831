#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cache operation failed for {0}: {1}")]
    Cache(String, String),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Table {0} does not exist")]
    TableNotFound(String),
    #[error("Failed to subscribe to {instrument} market: {reason}")]
    FeedSubscription { instrument: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid level (price: {0}, size: {1})")]
    InvalidLevel(f64, f64),
}

pub type Result<T> = std::result::Result<T, Error>;
