//! SQLite trade store.
//!
//! Recorded days live in `trades`, excluded days in `exclusions`. A day may
//! appear in at most one row across both tables.

use crate::domain::config_validation::parse_or;
use crate::domain::error::{DayError, OrtraderError};
use crate::domain::outcome::{DayOutcome, ExclusionEntry, TradeRecord};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::TradeStore;
use chrono::{NaiveDate, NaiveDateTime};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub struct SqliteTradeStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteTradeStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, OrtraderError> {
        let db_path = config
            .get_string("storage", "sqlite_path")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| OrtraderError::ConfigMissing {
                section: "storage".into(),
                key: "sqlite_path".into(),
            })?;
        let pool_size: u32 = parse_or(config, "storage", "pool_size", 4)?;

        let manager = SqliteConnectionManager::file(db_path.trim());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(storage_error)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, OrtraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(storage_error)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), OrtraderError> {
        let conn = self.pool.get().map_err(storage_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trades (
                day TEXT PRIMARY KEY,
                direction TEXT NOT NULL,
                no_trade_reason TEXT,
                or_high REAL NOT NULL,
                or_low REAL NOT NULL,
                reference_price REAL,
                position_pct REAL,
                entry_price REAL,
                entry_time TEXT,
                stop_price REAL,
                target_price REAL,
                exit_price REAL,
                exit_time TEXT,
                exit_reason TEXT,
                points_gained REAL NOT NULL,
                pnl_usd REAL NOT NULL,
                mfe_points REAL,
                mae_points REAL
            );
            CREATE TABLE IF NOT EXISTS exclusions (
                day TEXT PRIMARY KEY,
                reason_code TEXT NOT NULL,
                detail TEXT NOT NULL,
                error TEXT NOT NULL
            );",
        )
        .map_err(storage_error)?;

        Ok(())
    }
}

impl TradeStore for SqliteTradeStore {
    fn save_outcome(&self, outcome: &DayOutcome) -> Result<(), OrtraderError> {
        let mut conn = self.pool.get().map_err(storage_error)?;
        let tx = conn.transaction().map_err(storage_error)?;
        let day = outcome.day().format(DATE_FORMAT).to_string();

        let existing: Option<String> = tx
            .query_row(
                "SELECT day FROM trades WHERE day = ?1 UNION ALL SELECT day FROM exclusions WHERE day = ?1",
                params![day],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        if existing.is_some() {
            return Err(OrtraderError::Storage {
                reason: format!("day {day} is already stored"),
            });
        }

        match outcome {
            DayOutcome::Recorded { record } => {
                tx.execute(
                    "INSERT INTO trades (day, direction, no_trade_reason, or_high, or_low, reference_price,
                        position_pct, entry_price, entry_time, stop_price, target_price, exit_price,
                        exit_time, exit_reason, points_gained, pnl_usd, mfe_points, mae_points)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                    params![
                        day,
                        record.direction.to_string(),
                        record.no_trade_reason.map(|r| r.to_string()),
                        record.or_high,
                        record.or_low,
                        record.reference_price,
                        record.position_pct,
                        record.entry_price,
                        record.entry_time.map(format_datetime),
                        record.stop_price,
                        record.target_price,
                        record.exit_price,
                        record.exit_time.map(format_datetime),
                        record.exit_reason.map(|r| r.to_string()),
                        record.points_gained,
                        record.pnl_usd,
                        record.mfe_points,
                        record.mae_points
                    ],
                )
                .map_err(storage_error)?;
            }
            DayOutcome::Excluded { entry } => {
                let error = serde_json::to_string(&entry.error).map_err(storage_error)?;
                tx.execute(
                    "INSERT INTO exclusions (day, reason_code, detail, error) VALUES (?1, ?2, ?3, ?4)",
                    params![day, entry.reason_code(), entry.detail(), error],
                )
                .map_err(storage_error)?;
            }
        }

        tx.commit().map_err(storage_error)?;
        debug!(%day, "stored day outcome");
        Ok(())
    }

    fn load_outcomes(&self) -> Result<Vec<DayOutcome>, OrtraderError> {
        let conn = self.pool.get().map_err(storage_error)?;
        let mut outcomes = Vec::new();

        let mut stmt = conn
            .prepare(
                "SELECT day, direction, no_trade_reason, or_high, or_low, reference_price, position_pct,
                        entry_price, entry_time, stop_price, target_price, exit_price, exit_time,
                        exit_reason, points_gained, pnl_usd, mfe_points, mae_points
                 FROM trades ORDER BY day ASC",
            )
            .map_err(storage_error)?;
        let rows = stmt.query_map([], trade_from_row).map_err(storage_error)?;
        for row in rows {
            let record = row.map_err(storage_error)?;
            outcomes.push(DayOutcome::Recorded { record });
        }

        let mut stmt = conn
            .prepare("SELECT day, error FROM exclusions ORDER BY day ASC")
            .map_err(storage_error)?;
        let rows = stmt
            .query_map([], |row| {
                let day = parse_text::<NaiveDate>(row, 0)?;
                let raw: String = row.get(1)?;
                let error: DayError = serde_json::from_str(&raw).map_err(|e| conversion_failure(1, e))?;
                Ok(ExclusionEntry { day, error })
            })
            .map_err(storage_error)?;
        for row in rows {
            let entry = row.map_err(storage_error)?;
            outcomes.push(DayOutcome::Excluded { entry });
        }

        outcomes.sort_by_key(DayOutcome::day);
        Ok(outcomes)
    }
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<TradeRecord> {
    Ok(TradeRecord {
        day: parse_text(row, 0)?,
        direction: parse_text(row, 1)?,
        no_trade_reason: parse_optional_text(row, 2)?,
        or_high: row.get(3)?,
        or_low: row.get(4)?,
        reference_price: row.get(5)?,
        position_pct: row.get(6)?,
        entry_price: row.get(7)?,
        entry_time: parse_optional_datetime(row, 8)?,
        stop_price: row.get(9)?,
        target_price: row.get(10)?,
        exit_price: row.get(11)?,
        exit_time: parse_optional_datetime(row, 12)?,
        exit_reason: parse_optional_text(row, 13)?,
        points_gained: row.get(14)?,
        pnl_usd: row.get(15)?,
        mfe_points: row.get(16)?,
        mae_points: row.get(17)?,
    })
}

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_failure(idx, e))
}

fn parse_optional_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse::<T>().map_err(|e| conversion_failure(idx, e)))
        .transpose()
}

fn parse_optional_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| conversion_failure(idx, e)))
        .transpose()
}

fn format_datetime(ts: NaiveDateTime) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

fn conversion_failure(idx: usize, e: impl Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.to_string().into())
}

fn storage_error(e: impl Display) -> OrtraderError {
    OrtraderError::Storage { reason: e.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::opening_range::OpeningRange;
    use crate::domain::outcome::TradeDirection;
    use crate::domain::position::ExitReason;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn store() -> SqliteTradeStore {
        let store = SqliteTradeStore::in_memory().unwrap();
        store.initialize_schema().unwrap();
        store
    }

    fn long_trade(d: u32) -> TradeRecord {
        let range = OpeningRange {
            day: day(d),
            high: 21600.0,
            low: 21500.0,
            bar_count: 30,
        };
        TradeRecord {
            direction: TradeDirection::Long,
            no_trade_reason: None,
            reference_price: Some(21580.0),
            position_pct: Some(0.8),
            entry_price: Some(21580.0),
            entry_time: day(d).and_hms_opt(10, 22, 0),
            stop_price: Some(21555.0),
            target_price: Some(21655.0),
            exit_price: Some(21655.0),
            exit_time: day(d).and_hms_opt(11, 5, 0),
            exit_reason: Some(ExitReason::TakeProfit),
            points_gained: 75.0,
            pnl_usd: 6000.0,
            mfe_points: Some(80.0),
            mae_points: Some(-10.0),
            ..TradeRecord::zero_range(&range)
        }
    }

    #[test]
    fn from_config_missing_path() {
        let config = FileConfigAdapter::from_string("[storage]\n").unwrap();
        match SqliteTradeStore::from_config(&config) {
            Err(OrtraderError::ConfigMissing { section, key }) => {
                assert_eq!(section, "storage");
                assert_eq!(key, "sqlite_path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn saves_and_loads_outcomes_in_day_order() {
        let store = store();
        let excluded = DayOutcome::excluded(
            day(5),
            DayError::IncompleteRange {
                observed: 25,
                expected: 30,
                tolerance: 2,
            },
        );
        let traded = DayOutcome::Recorded { record: long_trade(4) };
        store.save_outcome(&excluded).unwrap();
        store.save_outcome(&traded).unwrap();

        let loaded = store.load_outcomes().unwrap();
        assert_eq!(loaded, vec![traded, excluded]);
    }

    #[test]
    fn zero_range_record_keeps_empty_columns() {
        let store = store();
        let range = OpeningRange {
            day: day(6),
            high: 21500.0,
            low: 21500.0,
            bar_count: 30,
        };
        let outcome = DayOutcome::Recorded {
            record: TradeRecord::zero_range(&range),
        };
        store.save_outcome(&outcome).unwrap();

        assert_eq!(store.load_outcomes().unwrap(), vec![outcome]);
    }

    #[test]
    fn duplicate_day_is_storage_error() {
        let store = store();
        store
            .save_outcome(&DayOutcome::Recorded { record: long_trade(4) })
            .unwrap();
        let err = store
            .save_outcome(&DayOutcome::excluded(day(4), DayError::NoRangeData))
            .unwrap_err();

        assert!(matches!(err, OrtraderError::Storage { .. }));
        assert_eq!(store.load_outcomes().unwrap().len(), 1);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("trades.db");
        let config = FileConfigAdapter::from_string(&format!(
            "[storage]\nsqlite_path = {}\n",
            path.display()
        ))
        .unwrap();

        let first = SqliteTradeStore::from_config(&config).unwrap();
        first.initialize_schema().unwrap();
        first
            .save_outcome(&DayOutcome::Recorded { record: long_trade(4) })
            .unwrap();
        drop(first);

        let second = SqliteTradeStore::from_config(&config).unwrap();
        second.initialize_schema().unwrap();
        assert_eq!(second.load_outcomes().unwrap().len(), 1);
    }
}
