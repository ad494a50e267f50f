//! SQLite prediction store and candle source.
//!
//! Predictions are stored as JSON bodies next to their current value so the
//! batch can select ongoing ones without decoding every row.

use crate::domain::candle::Candle;
use crate::domain::error::{MarketError, VerdictError};
use crate::domain::prediction::{Prediction, PredictionValue};
use crate::ports::candle_port::{CandleFeed, CandlePort, VecCandleFeed};
use crate::ports::config_port::ConfigPort;
use crate::ports::storage_port::PredictionStore;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter};
use std::collections::BTreeMap;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, VerdictError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| VerdictError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| VerdictError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, VerdictError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| VerdictError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, VerdictError> {
        self.pool.get().map_err(|e: r2d2::Error| VerdictError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), VerdictError> {
        let conn = self.connection()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                state_value TEXT NOT NULL,
                body TEXT NOT NULL CHECK (json_extract(body, '$.id') = id)
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_state ON predictions(state_value);
            CREATE TABLE IF NOT EXISTS candles (
                operand_key TEXT NOT NULL,
                ts INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (operand_key, ts)
            );",
        )
        .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    pub fn insert_candles(&self, operand_key: &str, candles: &[Candle]) -> Result<(), VerdictError> {
        let mut conn = self.connection()?;

        let tx =
            conn.transaction()
                .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                    reason: e.to_string(),
                })?;

        for candle in candles {
            tx.execute(
                "INSERT OR REPLACE INTO candles (operand_key, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    operand_key,
                    candle.timestamp,
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume
                ],
            )
            .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(())
    }

    pub fn fetch_candles(&self, operand_key: &str, start_ts: i64) -> Result<Vec<Candle>, VerdictError> {
        let conn = self.connection()?;

        let query = "SELECT ts, open, high, low, close, volume
                     FROM candles
                     WHERE operand_key = ?1 AND ts >= ?2
                     ORDER BY ts ASC";

        let mut stmt =
            conn.prepare(query)
                .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                    reason: e.to_string(),
                })?;

        let rows = stmt
            .query_map(params![operand_key, start_ts], |row| {
                Ok(Candle {
                    timestamp: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut candles = Vec::new();
        for row in rows {
            let candle = row.map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;
            if !candle.has_finite_prices() {
                return Err(VerdictError::DatabaseQuery {
                    reason: format!(
                        "candle {} at {} has a non-finite price",
                        operand_key, candle.timestamp
                    ),
                });
            }
            candles.push(candle);
        }

        Ok(candles)
    }
}

impl PredictionStore for SqliteAdapter {
    /// An empty `values` slice selects every prediction.
    fn get_predictions(
        &self,
        values: &[PredictionValue],
    ) -> Result<BTreeMap<String, Prediction>, VerdictError> {
        let conn = self.connection()?;

        let query = if values.is_empty() {
            "SELECT id, body FROM predictions".to_string()
        } else {
            let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "SELECT id, body FROM predictions WHERE state_value IN ({})",
                placeholders.join(", ")
            )
        };

        let mut stmt =
            conn.prepare(&query)
                .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                    reason: e.to_string(),
                })?;

        let rows = stmt
            .query_map(params_from_iter(values.iter().map(|v| v.as_str())), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut predictions = BTreeMap::new();
        for row in rows {
            let (id, body) = row.map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;
            let prediction: Prediction =
                serde_json::from_str(&body).map_err(|e| VerdictError::Serialization {
                    reason: format!("prediction {}: {}", id, e),
                })?;
            predictions.insert(id, prediction);
        }

        Ok(predictions)
    }

    fn upsert_predictions(
        &self,
        predictions: &BTreeMap<String, Prediction>,
    ) -> Result<(), VerdictError> {
        let mut conn = self.connection()?;

        let tx =
            conn.transaction()
                .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                    reason: e.to_string(),
                })?;

        for (id, prediction) in predictions {
            let body = serde_json::to_string(prediction).map_err(|e| VerdictError::Serialization {
                reason: format!("prediction {}: {}", id, e),
            })?;
            tx.execute(
                "INSERT INTO predictions (id, state_value, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET state_value = excluded.state_value, body = excluded.body",
                params![id, prediction.state.value.as_str(), body],
            )
            .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| VerdictError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

impl CandlePort for SqliteAdapter {
    fn open_feed(
        &self,
        operand_key: &str,
        start_ts: i64,
    ) -> Result<Box<dyn CandleFeed>, MarketError> {
        let candles =
            self.fetch_candles(operand_key, start_ts)
                .map_err(|e| MarketError::Upstream {
                    operand: operand_key.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(Box::new(VecCandleFeed::new(candles)))
    }
}
