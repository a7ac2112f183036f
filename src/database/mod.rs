use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{CollectorError, CollectorResult};
use crate::models::{Direction, FundingRate};

const SELECT_COLUMNS: &str = "asset, exchange, rate, predicted_rate, direction, timestamp, \
    next_funding_time, open_interest, mark_price, volume_24h";

/// SQLite-backed store for normalized funding rates
///
/// Rows are unique on `(asset, exchange, timestamp)`; writing the same cycle
/// twice updates in place instead of adding rows.
#[derive(Clone)]
pub struct RateStore {
    pool: SqlitePool,
}

impl RateStore {
    /// Open (or create) the database file and make sure the schema exists
    pub async fn new(database_path: &str) -> CollectorResult<Self> {
        let filename = database_path.strip_prefix("sqlite:").unwrap_or(database_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(SqliteConnectOptions::new().filename(filename).create_if_missing(true))
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        let store = Self { pool };
        store.create_schema().await?;
        info!("Rate store initialized at {}", filename);
        Ok(store)
    }

    async fn create_schema(&self) -> CollectorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS funding_rates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset TEXT NOT NULL,
                exchange TEXT NOT NULL,
                rate REAL NOT NULL,
                predicted_rate REAL,
                direction TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                next_funding_time INTEGER,
                open_interest REAL,
                mark_price REAL,
                volume_24h REAL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(asset, exchange, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_funding_rates_timestamp ON funding_rates(timestamp DESC)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert or update a batch in a single transaction
    ///
    /// Either every row is written or none is.
    pub async fn upsert_rates(&self, rates: &[FundingRate]) -> CollectorResult<usize> {
        if rates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for rate in rates {
            sqlx::query(
                r#"
                INSERT INTO funding_rates (
                    asset, exchange, rate, predicted_rate, direction, timestamp,
                    next_funding_time, open_interest, mark_price, volume_24h
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(asset, exchange, timestamp) DO UPDATE SET
                    rate = excluded.rate,
                    predicted_rate = excluded.predicted_rate,
                    direction = excluded.direction,
                    next_funding_time = excluded.next_funding_time,
                    open_interest = excluded.open_interest,
                    mark_price = excluded.mark_price,
                    volume_24h = excluded.volume_24h,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )
            .bind(&rate.asset)
            .bind(&rate.exchange)
            .bind(rate.rate)
            .bind(rate.predicted_rate)
            .bind(rate.direction.as_str())
            .bind(rate.timestamp.timestamp_millis())
            .bind(rate.next_funding_time.map(|t| t.timestamp_millis()))
            .bind(rate.open_interest)
            .bind(rate.mark_price)
            .bind(rate.volume_24h)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Upserted {} funding rates", rates.len());
        Ok(rates.len())
    }

    /// Newest rows first, optionally limited
    pub async fn latest_rates(&self, limit: Option<i64>) -> CollectorResult<Vec<FundingRate>> {
        let query = format!(
            "SELECT {} FROM funding_rates ORDER BY timestamp DESC, asset, exchange LIMIT ?",
            SELECT_COLUMNS
        );
        // SQLite treats a negative LIMIT as unbounded
        let rows = sqlx::query(&query)
            .bind(limit.unwrap_or(-1))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_rate).collect()
    }

    /// The newest row for every (asset, exchange) pair
    pub async fn latest_per_pair(&self) -> CollectorResult<Vec<FundingRate>> {
        let query = format!(
            r#"
            SELECT {} FROM funding_rates f
            WHERE f.timestamp = (
                SELECT MAX(timestamp) FROM funding_rates
                WHERE asset = f.asset AND exchange = f.exchange
            )
            ORDER BY asset, exchange
            "#,
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_rate).collect()
    }

    pub async fn count(&self) -> CollectorResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM funding_rates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn millis(value: i64) -> CollectorResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| CollectorError::decode("database", format!("invalid timestamp {}", value)))
}

fn row_to_rate(row: &SqliteRow) -> CollectorResult<FundingRate> {
    let direction: String = row.try_get("direction")?;
    let next_funding: Option<i64> = row.try_get("next_funding_time")?;

    Ok(FundingRate {
        asset: row.try_get("asset")?,
        exchange: row.try_get("exchange")?,
        rate: row.try_get("rate")?,
        predicted_rate: row.try_get("predicted_rate")?,
        timestamp: millis(row.try_get("timestamp")?)?,
        direction: direction
            .parse::<Direction>()
            .map_err(|_| CollectorError::decode("database", format!("unknown direction '{}'", direction)))?,
        next_funding_time: next_funding.map(millis).transpose()?,
        open_interest: row.try_get("open_interest")?,
        mark_price: row.try_get("mark_price")?,
        volume_24h: row.try_get("volume_24h")?,
    })
}
