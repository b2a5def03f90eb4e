//! Signal classification at the decision instant.
//!
//! The reference price is placed within the opening range as
//! `position_pct = (price - low) / (high - low)`. The top zone is
//! `[1 - top/100, ..)`, the bottom zone `(.., bottom/100]`, and the rest is the
//! middle. Boundaries are inclusive toward the extremes, so with
//! `top + bottom <= 100` the three zones partition the line. When the zones
//! touch (`top + bottom == 100`) the shared point is Long.

use crate::domain::config::SessionConfig;
use crate::domain::error::DayError;
use crate::domain::opening_range::OpeningRange;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Long => "long",
            Direction::Short => "short",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Long,
    Short,
    NoTrade,
}

impl SignalKind {
    pub fn direction(self) -> Option<Direction> {
        match self {
            SignalKind::Long => Some(Direction::Long),
            SignalKind::Short => Some(Direction::Short),
            SignalKind::NoTrade => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalKind::Long => "long",
            SignalKind::Short => "short",
            SignalKind::NoTrade => "no_trade",
        })
    }
}

/// The day's decision and the inputs it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub day: NaiveDate,
    pub kind: SignalKind,
    pub reference_price: f64,
    /// Timestamp of the bar the reference price was read from.
    pub reference_time: NaiveDateTime,
    pub or_high: f64,
    pub or_low: f64,
    pub position_pct: f64,
    pub top_cutoff: f64,
    pub bottom_cutoff: f64,
    /// Average true range of the day's bars up to the decision bar.
    #[serde(default)]
    pub pre_trade_atr: f64,
}

pub fn position_pct(reference_price: f64, range: &OpeningRange) -> Result<f64, DayError> {
    if range.is_degenerate() {
        return Err(DayError::DegenerateRange {
            high: range.high,
            low: range.low,
        });
    }
    Ok((reference_price - range.low) / range.range())
}

pub fn classify_pct(pct: f64, top_zone_pct: f64, bottom_zone_pct: f64) -> SignalKind {
    if pct >= 1.0 - top_zone_pct / 100.0 {
        SignalKind::Long
    } else if pct <= bottom_zone_pct / 100.0 {
        SignalKind::Short
    } else {
        SignalKind::NoTrade
    }
}

/// Price levels of the zone boundaries: `(top_cutoff, bottom_cutoff)`.
pub fn cutoffs(range: &OpeningRange, session: &SessionConfig) -> (f64, f64) {
    let width = range.range();
    (
        range.high - session.top_zone_pct / 100.0 * width,
        range.low + session.bottom_zone_pct / 100.0 * width,
    )
}

pub fn classify(
    range: &OpeningRange,
    reference_price: f64,
    reference_time: NaiveDateTime,
    session: &SessionConfig,
) -> Result<Signal, DayError> {
    let pct = position_pct(reference_price, range)?;
    let (top_cutoff, bottom_cutoff) = cutoffs(range, session);
    Ok(Signal {
        day: range.day,
        kind: classify_pct(pct, session.top_zone_pct, session.bottom_zone_pct),
        reference_price,
        reference_time,
        or_high: range.high,
        or_low: range.low,
        position_pct: pct,
        top_cutoff,
        bottom_cutoff,
        pre_trade_atr: 0.0,
    })
}
