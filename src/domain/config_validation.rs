//! Builds and validates the immutable [`EngineConfig`] from a [`ConfigPort`].
//!
//! Every key is parsed strictly: a value that is present but unparseable is a
//! `ConfigInvalid` error naming its section and key, never a silent default.

use crate::domain::config::{DataQualityPolicy, EngineConfig, FillPolicy, SessionConfig};
use crate::domain::error::OrtraderError;
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::str::FromStr;

/// Backtest run parameters that are not part of the engine itself.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub data_path: Option<PathBuf>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub risk_free_rate: f64,
}

impl BacktestSettings {
    pub fn includes(&self, day: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| day >= start) && self.end_date.is_none_or(|end| day <= end)
    }
}

pub fn build_engine_config(config: &dyn ConfigPort) -> Result<EngineConfig, OrtraderError> {
    let engine = EngineConfig {
        session: build_session_config(config)?,
        fills: build_fill_policy(config)?,
        quality: build_quality_policy(config)?,
        initial_capital: parse_or(config, "backtest", "initial_capital", 100_000.0)?,
    };
    engine.validate()?;
    Ok(engine)
}

pub fn build_session_config(config: &dyn ConfigPort) -> Result<SessionConfig, OrtraderError> {
    let defaults = SessionConfig::default();
    Ok(SessionConfig {
        instrument: config
            .get_string("market", "instrument")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.instrument),
        timezone: parse_timezone(config, "session", "timezone")?.unwrap_or(defaults.timezone),
        or_start: parse_time(config, "or_start", defaults.or_start)?,
        or_end: parse_time(config, "or_end", defaults.or_end)?,
        entry_time: parse_time(config, "entry_time", defaults.entry_time)?,
        hard_exit_time: parse_time(config, "hard_exit_time", defaults.hard_exit_time)?,
        session_end: parse_time(config, "session_end", defaults.session_end)?,
        skip_weekends: parse_bool(config, "session", "skip_weekends", defaults.skip_weekends)?,
        top_zone_pct: parse_or(config, "strategy", "top_zone_pct", defaults.top_zone_pct)?,
        bottom_zone_pct: parse_or(config, "strategy", "bottom_zone_pct", defaults.bottom_zone_pct)?,
        stop_points: parse_or(config, "strategy", "stop_points", defaults.stop_points)?,
        target_points: parse_or(config, "strategy", "target_points", defaults.target_points)?,
        point_value: parse_or(config, "market", "point_value", defaults.point_value)?,
        position_size: parse_or(config, "market", "position_size", defaults.position_size)?,
        tick_size: parse_optional(config, "market", "tick_size")?,
    })
}

pub fn build_fill_policy(config: &dyn ConfigPort) -> Result<FillPolicy, OrtraderError> {
    let defaults = FillPolicy::default();
    Ok(FillPolicy {
        entry: parse_or(config, "fills", "entry_fill", defaults.entry)?,
        decision_field: parse_or(config, "fills", "decision_field", defaults.decision_field)?,
        hard_exit_field: parse_or(config, "fills", "hard_exit_field", defaults.hard_exit_field)?,
        tie_break: parse_or(config, "fills", "tie_break", defaults.tie_break)?,
        stop_fill: parse_or(config, "fills", "stop_fill", defaults.stop_fill)?,
        decision_tolerance_minutes: parse_or(
            config,
            "fills",
            "decision_tolerance_minutes",
            defaults.decision_tolerance_minutes,
        )?,
    })
}

pub fn build_quality_policy(config: &dyn ConfigPort) -> Result<DataQualityPolicy, OrtraderError> {
    let defaults = DataQualityPolicy::default();
    let max_missing_or_bars = match config.get_string("data_quality", "max_missing_or_bars") {
        None => defaults.max_missing_or_bars,
        Some(s) if s.trim().eq_ignore_ascii_case("unlimited") => None,
        Some(s) => Some(s.trim().parse::<usize>().map_err(|_| {
            OrtraderError::invalid(
                "data_quality",
                "max_missing_or_bars",
                format!("expected a non-negative integer or 'unlimited', got '{s}'"),
            )
        })?),
    };
    Ok(DataQualityPolicy {
        max_missing_or_bars,
        zero_range: parse_or(config, "data_quality", "zero_range", defaults.zero_range)?,
        decision_grace_minutes: parse_or(
            config,
            "data_quality",
            "decision_grace_minutes",
            defaults.decision_grace_minutes,
        )?,
    })
}

pub fn build_backtest_settings(config: &dyn ConfigPort) -> Result<BacktestSettings, OrtraderError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start > end {
            return Err(OrtraderError::invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    let risk_free_rate = parse_or(config, "backtest", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(OrtraderError::invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(BacktestSettings {
        data_path: config
            .get_string("backtest", "data_path")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
        start_date,
        end_date,
        risk_free_rate,
    })
}

/// Parses `[section] key` with `FromStr`, falling back to `default` when absent.
pub fn parse_or<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, OrtraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(config, section, key)?.unwrap_or(default))
}

pub fn parse_optional<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, OrtraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| OrtraderError::invalid(section, key, format!("cannot parse '{s}': {e}"))),
    }
}

pub fn parse_bool(config: &dyn ConfigPort, section: &str, key: &str, default: bool) -> Result<bool, OrtraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(OrtraderError::invalid(section, key, format!("expected a boolean, got '{s}'"))),
        },
    }
}

fn parse_time(config: &dyn ConfigPort, key: &str, default: NaiveTime) -> Result<NaiveTime, OrtraderError> {
    match config.get_string("session", key) {
        None => Ok(default),
        Some(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
            .map_err(|_| OrtraderError::invalid("session", key, format!("invalid time '{s}', expected HH:MM"))),
    }
}

pub fn parse_timezone(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<Tz>, OrtraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<Tz>()
            .map(Some)
            .map_err(|_| OrtraderError::invalid(section, key, format!("unknown timezone '{s}'"))),
    }
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, OrtraderError> {
    match config.get_string("backtest", key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| OrtraderError::invalid("backtest", key, format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}
