use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use crate::{
    error::Result,
    instrument::CacheKey,
    store::{AggregatedRow, BookStore, RawRow},
};

const MAX_CONNECTIONS: u32 = 16;

/// Postgres store. Each cache key gets a table of the same name in the raw
/// schema and in the aggregated schema.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    raw_schema: String,
    aggregated_schema: String,
}

/// Double-quotes an identifier; keys contain `:` and mixed case.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_name(schema: &str, key: &CacheKey) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(key.as_str()))
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            price DOUBLE PRECISION NOT NULL,
            size DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )",
        table
    )
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (price, size, created_at)
            SELECT * FROM UNNEST($1::float8[], $2::float8[], $3::timestamptz[])",
        table
    )
}

fn max_sizes_sql(table: &str) -> String {
    format!(
        "SELECT price, MAX(size) AS size
            FROM {}
            WHERE created_at >= $1 AND created_at < $2
            GROUP BY price
            ORDER BY price",
        table
    )
}

impl PostgresStore {
    pub async fn connect(
        url: &str,
        raw_schema: impl Into<String>,
        aggregated_schema: impl Into<String>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        let store = Self {
            pool,
            raw_schema: raw_schema.into(),
            aggregated_schema: aggregated_schema.into(),
        };
        for schema in [&store.raw_schema, &store.aggregated_schema] {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
                .execute(&store.pool)
                .await?;
        }
        info!(
            "Connected to database, schemas {} and {}",
            store.raw_schema, store.aggregated_schema
        );
        Ok(store)
    }

    async fn insert(&self, table: String, rows: Vec<(f64, f64, DateTime<Utc>)>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut prices = Vec::with_capacity(rows.len());
        let mut sizes = Vec::with_capacity(rows.len());
        let mut times = Vec::with_capacity(rows.len());
        for (price, size, at) in rows {
            prices.push(price);
            sizes.push(size);
            times.push(at);
        }
        sqlx::query(&insert_sql(&table))
            .bind(prices)
            .bind(sizes)
            .bind(times)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BookStore for PostgresStore {
    async fn create_tables(&self, key: &CacheKey) -> Result<()> {
        for schema in [&self.raw_schema, &self.aggregated_schema] {
            let table = table_name(schema, key);
            sqlx::query(&create_table_sql(&table))
                .execute(&self.pool)
                .await?;
        }
        // the aggregation query scans the raw table by time
        let index = quote_ident(&format!("{}:created_at", key));
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (created_at)",
            index,
            table_name(&self.raw_schema, key)
        ))
        .execute(&self.pool)
        .await?;
        debug!("Tables ready for {}", key);
        Ok(())
    }

    async fn insert_raw(&self, key: &CacheKey, rows: &[RawRow]) -> Result<()> {
        self.insert(
            table_name(&self.raw_schema, key),
            rows.iter().map(|r| (r.price, r.size, r.observed_at)).collect(),
        )
        .await
    }

    async fn max_sizes(
        &self,
        key: &CacheKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<(f64, f64)>> {
        let rows = sqlx::query_as::<_, (f64, f64)>(&max_sizes_sql(&table_name(
            &self.raw_schema,
            key,
        )))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_aggregated(&self, key: &CacheKey, rows: &[AggregatedRow]) -> Result<()> {
        self.insert(
            table_name(&self.aggregated_schema, key),
            rows.iter()
                .map(|r| (r.price, r.max_size, r.computed_at))
                .collect(),
        )
        .await
    }
}
