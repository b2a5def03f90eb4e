//! Day outcome recording: trade records, exclusions and the ordered trade log.

use crate::domain::config::SessionConfig;
use crate::domain::error::{DayError, OrtraderError};
use crate::domain::opening_range::OpeningRange;
use crate::domain::position::{ClosedPosition, ExitReason};
use crate::domain::signal::{Direction, Signal};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
    NoTrade,
}

impl From<Direction> for TradeDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => TradeDirection::Long,
            Direction::Short => TradeDirection::Short,
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeDirection::Long => "long",
            TradeDirection::Short => "short",
            TradeDirection::NoTrade => "no_trade",
        })
    }
}

impl FromStr for TradeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(TradeDirection::Long),
            "short" => Ok(TradeDirection::Short),
            "no_trade" => Ok(TradeDirection::NoTrade),
            other => Err(format!("unknown trade direction '{other}'")),
        }
    }
}

/// Why a recorded day has no position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoTradeReason {
    /// Reference price fell in the middle zone.
    MiddleZone,
    /// Zero-width range recorded under the `no_trade` zero-range policy.
    ZeroRange,
}

impl fmt::Display for NoTradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoTradeReason::MiddleZone => "middle_zone",
            NoTradeReason::ZeroRange => "zero_range",
        })
    }
}

impl FromStr for NoTradeReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "middle_zone" => Ok(NoTradeReason::MiddleZone),
            "zero_range" => Ok(NoTradeReason::ZeroRange),
            other => Err(format!("unknown no-trade reason '{other}'")),
        }
    }
}

/// One immutable row of the trade log. Trade fields are `None` on no-trade days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub day: NaiveDate,
    pub direction: TradeDirection,
    pub no_trade_reason: Option<NoTradeReason>,
    pub or_high: f64,
    pub or_low: f64,
    pub reference_price: Option<f64>,
    pub position_pct: Option<f64>,
    pub entry_price: Option<f64>,
    pub entry_time: Option<NaiveDateTime>,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub exit_reason: Option<ExitReason>,
    pub points_gained: f64,
    pub pnl_usd: f64,
    pub mfe_points: Option<f64>,
    pub mae_points: Option<f64>,
}

impl TradeRecord {
    pub fn trade(closed: &ClosedPosition, signal: &Signal, session: &SessionConfig) -> Self {
        let points = closed.points_gained();
        let p = &closed.position;
        Self {
            day: p.day,
            direction: p.direction.into(),
            no_trade_reason: None,
            or_high: signal.or_high,
            or_low: signal.or_low,
            reference_price: Some(signal.reference_price),
            position_pct: Some(signal.position_pct),
            entry_price: Some(p.entry_price),
            entry_time: Some(p.entry_time),
            stop_price: Some(p.stop_price),
            target_price: Some(p.target_price),
            exit_price: Some(closed.exit_price),
            exit_time: Some(closed.exit_time),
            exit_reason: Some(closed.exit_reason),
            points_gained: points,
            pnl_usd: points * session.dollars_per_point(),
            mfe_points: Some(p.mfe_points),
            mae_points: Some(p.mae_points),
        }
    }

    pub fn middle_zone(signal: &Signal) -> Self {
        Self {
            reference_price: Some(signal.reference_price),
            position_pct: Some(signal.position_pct),
            ..Self::flat(signal.day, signal.or_high, signal.or_low, NoTradeReason::MiddleZone)
        }
    }

    pub fn zero_range(range: &OpeningRange) -> Self {
        Self::flat(range.day, range.high, range.low, NoTradeReason::ZeroRange)
    }

    fn flat(day: NaiveDate, or_high: f64, or_low: f64, reason: NoTradeReason) -> Self {
        Self {
            day,
            direction: TradeDirection::NoTrade,
            no_trade_reason: Some(reason),
            or_high,
            or_low,
            reference_price: None,
            position_pct: None,
            entry_price: None,
            entry_time: None,
            stop_price: None,
            target_price: None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            points_gained: 0.0,
            pnl_usd: 0.0,
            mfe_points: None,
            mae_points: None,
        }
    }

    pub fn is_trade(&self) -> bool {
        self.direction != TradeDirection::NoTrade
    }
}

/// Audit-log entry for a day kept out of P&L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionEntry {
    pub day: NaiveDate,
    pub error: DayError,
}

impl ExclusionEntry {
    pub fn reason_code(&self) -> &'static str {
        self.error.reason_code()
    }

    pub fn detail(&self) -> String {
        self.error.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DayOutcome {
    Recorded { record: TradeRecord },
    Excluded { entry: ExclusionEntry },
}

impl DayOutcome {
    pub fn excluded(day: NaiveDate, error: DayError) -> Self {
        DayOutcome::Excluded {
            entry: ExclusionEntry { day, error },
        }
    }

    pub fn day(&self) -> NaiveDate {
        match self {
            DayOutcome::Recorded { record } => record.day,
            DayOutcome::Excluded { entry } => entry.day,
        }
    }
}

/// Append-only, strictly day-ordered log of recorded and excluded days.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeLog {
    records: Vec<TradeRecord>,
    exclusions: Vec<ExclusionEntry>,
    last_day: Option<NaiveDate>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, outcome: DayOutcome) -> Result<(), OrtraderError> {
        let day = outcome.day();
        if let Some(last_day) = self.last_day {
            if day <= last_day {
                return Err(OrtraderError::DayOrder { day, last_day });
            }
        }
        match outcome {
            DayOutcome::Recorded { record } => self.records.push(record),
            DayOutcome::Excluded { entry } => self.exclusions.push(entry),
        }
        self.last_day = Some(day);
        Ok(())
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn exclusions(&self) -> &[ExclusionEntry] {
        &self.exclusions
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.last_day
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.records.iter().any(|r| r.day == day) || self.exclusions.iter().any(|e| e.day == day)
    }

    /// Recorded and excluded days merged back into day order.
    pub fn outcomes(&self) -> Vec<DayOutcome> {
        let mut outcomes: Vec<DayOutcome> = self
            .records
            .iter()
            .map(|record| DayOutcome::Recorded { record: record.clone() })
            .chain(
                self.exclusions
                    .iter()
                    .map(|entry| DayOutcome::Excluded { entry: entry.clone() }),
            )
            .collect();
        outcomes.sort_by_key(DayOutcome::day);
        outcomes
    }
}
