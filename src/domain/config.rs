//! Immutable engine configuration.
//!
//! Built once at startup (see [`crate::domain::config_validation`]) and never
//! mutated while bars are processed.

use crate::domain::bar::PriceField;
use crate::domain::error::OrtraderError;
use chrono::{NaiveTime, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Session boundaries plus the strategy and market parameters of one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub instrument: String,
    pub timezone: Tz,
    pub or_start: NaiveTime,
    /// Exclusive end of the opening range window.
    pub or_end: NaiveTime,
    pub entry_time: NaiveTime,
    pub hard_exit_time: NaiveTime,
    pub session_end: NaiveTime,
    pub skip_weekends: bool,
    pub top_zone_pct: f64,
    pub bottom_zone_pct: f64,
    pub stop_points: f64,
    pub target_points: f64,
    pub point_value: f64,
    pub position_size: f64,
    pub tick_size: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instrument: "NQ".to_string(),
            timezone: chrono_tz::America::New_York,
            or_start: hm(9, 30),
            or_end: hm(10, 0),
            entry_time: hm(10, 22),
            hard_exit_time: hm(12, 0),
            session_end: hm(16, 0),
            skip_weekends: true,
            top_zone_pct: 35.0,
            bottom_zone_pct: 35.0,
            stop_points: 25.0,
            target_points: 75.0,
            point_value: 80.0,
            position_size: 1.0,
            tick_size: None,
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl SessionConfig {
    /// Number of one-minute bars a gap-free opening range window holds.
    pub fn expected_or_bars(&self) -> usize {
        let minutes = (self.or_end - self.or_start).num_minutes();
        usize::try_from(minutes).unwrap_or(0)
    }

    /// Rounds a price to the nearest tick when a tick size is configured.
    pub fn round_to_tick(&self, price: f64) -> f64 {
        match self.tick_size {
            Some(tick) if tick > 0.0 => (price / tick).round() * tick,
            _ => price,
        }
    }

    /// USD value of one point move for the configured size.
    pub fn dollars_per_point(&self) -> f64 {
        self.point_value * self.position_size
    }
}

/// How the entry price is chosen once a directional signal is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryFill {
    /// Enter at the reference price used for classification.
    DecisionPrice,
    /// Enter at the open of the first bar after the decision bar.
    NextBarOpen,
}

/// Which exit wins when one bar touches both stop and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    StopFirst,
    TargetFirst,
}

/// Fill price of a triggered stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopFill {
    /// Always the stop price.
    StopPrice,
    /// The bar's open when the bar opens beyond the stop, else the stop price.
    GapAware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroRangePolicy {
    /// Exclude the day with a degenerate-range reason.
    Exclude,
    /// Record an auditable no-trade day.
    NoTrade,
}

macro_rules! impl_from_str {
    ($ty:ty, $($name:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(format!(
                        "unknown value '{other}', expected one of: {}",
                        [$($name),+].join(", ")
                    )),
                }
            }
        }
    };
}

impl_from_str!(EntryFill, "decision_price" => EntryFill::DecisionPrice, "next_bar_open" => EntryFill::NextBarOpen);
impl_from_str!(TieBreak, "stop_first" => TieBreak::StopFirst, "target_first" => TieBreak::TargetFirst);
impl_from_str!(StopFill, "stop_price" => StopFill::StopPrice, "gap_aware" => StopFill::GapAware);
impl_from_str!(ZeroRangePolicy, "exclude" => ZeroRangePolicy::Exclude, "no_trade" => ZeroRangePolicy::NoTrade);

#[derive(Debug, Clone, PartialEq)]
pub struct FillPolicy {
    pub entry: EntryFill,
    pub decision_field: PriceField,
    pub hard_exit_field: PriceField,
    pub tie_break: TieBreak,
    pub stop_fill: StopFill,
    /// How far before the entry time the last bar may lie and still serve as
    /// the decision bar.
    pub decision_tolerance_minutes: i64,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            entry: EntryFill::DecisionPrice,
            decision_field: PriceField::Close,
            hard_exit_field: PriceField::Close,
            tie_break: TieBreak::StopFirst,
            stop_fill: StopFill::StopPrice,
            decision_tolerance_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataQualityPolicy {
    /// `None` accepts any number of missing opening-range minutes.
    pub max_missing_or_bars: Option<usize>,
    pub zero_range: ZeroRangePolicy,
    /// Live only: minutes past the entry time before deciding without a bar.
    pub decision_grace_minutes: i64,
}

impl Default for DataQualityPolicy {
    fn default() -> Self {
        Self {
            max_missing_or_bars: Some(2),
            zero_range: ZeroRangePolicy::Exclude,
            decision_grace_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub fills: FillPolicy,
    pub quality: DataQualityPolicy,
    pub initial_capital: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            fills: FillPolicy::default(),
            quality: DataQualityPolicy::default(),
            initial_capital: 100_000.0,
        }
    }
}

impl EngineConfig {
    /// Checks every structural invariant; the first violation is returned.
    pub fn validate(&self) -> Result<(), OrtraderError> {
        let s = &self.session;

        if s.or_start >= s.or_end {
            return Err(OrtraderError::invalid("session", "or_end", "or_end must be after or_start"));
        }
        if s.or_end > s.entry_time {
            return Err(OrtraderError::invalid(
                "session",
                "entry_time",
                "entry_time must not be before or_end",
            ));
        }
        if s.entry_time >= s.hard_exit_time {
            return Err(OrtraderError::invalid(
                "session",
                "hard_exit_time",
                "hard_exit_time must be after entry_time",
            ));
        }
        if s.hard_exit_time >= s.session_end {
            return Err(OrtraderError::invalid(
                "session",
                "session_end",
                "session_end must be after hard_exit_time",
            ));
        }
        for t in [s.or_start, s.or_end, s.entry_time, s.hard_exit_time, s.session_end] {
            if t.second() != 0 || t.nanosecond() != 0 {
                return Err(OrtraderError::invalid(
                    "session",
                    "or_start",
                    format!("session times must fall on whole minutes, got {t}"),
                ));
            }
        }

        for (key, pct) in [("top_zone_pct", s.top_zone_pct), ("bottom_zone_pct", s.bottom_zone_pct)] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(OrtraderError::invalid("strategy", key, "zone percent must be between 0 and 100"));
            }
        }
        if s.top_zone_pct + s.bottom_zone_pct > 100.0 {
            return Err(OrtraderError::invalid(
                "strategy",
                "bottom_zone_pct",
                "top_zone_pct + bottom_zone_pct must not exceed 100",
            ));
        }

        for (section, key, value) in [
            ("strategy", "stop_points", s.stop_points),
            ("strategy", "target_points", s.target_points),
            ("market", "point_value", s.point_value),
            ("market", "position_size", s.position_size),
            ("backtest", "initial_capital", self.initial_capital),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(OrtraderError::invalid(section, key, format!("{key} must be positive")));
            }
        }
        if let Some(tick) = s.tick_size {
            if !(tick.is_finite() && tick > 0.0) {
                return Err(OrtraderError::invalid("market", "tick_size", "tick_size must be positive"));
            }
        }

        if self.fills.decision_tolerance_minutes < 0 {
            return Err(OrtraderError::invalid(
                "fills",
                "decision_tolerance_minutes",
                "decision_tolerance_minutes must be non-negative",
            ));
        }
        if self.quality.decision_grace_minutes < 0 {
            return Err(OrtraderError::invalid(
                "data_quality",
                "decision_grace_minutes",
                "decision_grace_minutes must be non-negative",
            ));
        }
        Ok(())
    }
}
