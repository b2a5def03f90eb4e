//! Domain error types.
//!
//! [`DayError`] is the per-day taxonomy: it never aborts a run, it is caught
//! at the day boundary and turned into an exclusion-log entry. [`OrtraderError`]
//! covers everything that is fatal to a run (configuration, malformed input,
//! storage).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Per-day failure. Every variant carries the raw values needed to explain the
/// exclusion without looking at the bars again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum DayError {
    #[error("no bars observed in the opening range window")]
    NoRangeData,

    #[error("opening range has zero width (high {high} == low {low})")]
    DegenerateRange { high: f64, low: f64 },

    #[error("opening range incomplete: {observed} of {expected} bars, tolerance {tolerance}")]
    IncompleteRange {
        observed: usize,
        expected: usize,
        tolerance: usize,
    },

    #[error("no decision bar at {entry_time} within {tolerance_minutes} min (last bar before: {last_bar:?})")]
    MissingDecisionBar {
        entry_time: NaiveTime,
        tolerance_minutes: i64,
        last_bar: Option<NaiveDateTime>,
    },

    #[error("{direction} entry pending at {decided_at} but no later bar arrived to fill it")]
    EntryFillMissed {
        direction: String,
        decided_at: NaiveDateTime,
    },

    #[error("position entered at {entry_price} still open: no bar at or after hard exit {hard_exit_time} (last bar: {last_bar:?})")]
    ForcedExitMissed {
        hard_exit_time: NaiveTime,
        entry_price: f64,
        last_bar: Option<NaiveDateTime>,
    },

    #[error("bar at {received} does not follow previous bar at {previous}")]
    OutOfOrderBar {
        previous: NaiveDateTime,
        received: NaiveDateTime,
    },
}

impl DayError {
    /// Stable reason code written to the exclusion log.
    pub fn reason_code(&self) -> &'static str {
        match self {
            DayError::NoRangeData => "no_range_data",
            DayError::DegenerateRange { .. } => "degenerate_range",
            DayError::IncompleteRange { .. } => "incomplete_range",
            DayError::MissingDecisionBar { .. } => "missing_decision_bar",
            DayError::EntryFillMissed { .. } => "entry_fill_missed",
            DayError::ForcedExitMissed { .. } => "forced_exit_missed",
            DayError::OutOfOrderBar { .. } => "out_of_order_bar",
        }
    }
}

/// Top-level error type for ortrader.
#[derive(Debug, thiserror::Error)]
pub enum OrtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("bad bar data in {source_name}: {reason}")]
    Data { source_name: String, reason: String },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("state file error: {reason}")]
    State { reason: String },

    #[error("trade log append out of day order: {day} is not after {last_day}")]
    DayOrder { day: NaiveDate, last_day: NaiveDate },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OrtraderError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        OrtraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl OrtraderError {
    /// Process exit status for a run that stopped on this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            OrtraderError::Io(_) | OrtraderError::State { .. } => 1,
            OrtraderError::ConfigParse { .. }
            | OrtraderError::ConfigMissing { .. }
            | OrtraderError::ConfigInvalid { .. } => 2,
            OrtraderError::Storage { .. } | OrtraderError::DayOrder { .. } => 3,
            OrtraderError::Data { .. } => 5,
        }
    }
}

impl From<&OrtraderError> for std::process::ExitCode {
    fn from(err: &OrtraderError) -> Self {
        std::process::ExitCode::from(err.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_distinct() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 22, 0)
            .unwrap();
        let errors = [
            DayError::NoRangeData,
            DayError::DegenerateRange { high: 1.0, low: 1.0 },
            DayError::IncompleteRange {
                observed: 20,
                expected: 30,
                tolerance: 2,
            },
            DayError::MissingDecisionBar {
                entry_time: t.time(),
                tolerance_minutes: 0,
                last_bar: None,
            },
            DayError::EntryFillMissed {
                direction: "long".into(),
                decided_at: t,
            },
            DayError::ForcedExitMissed {
                hard_exit_time: t.time(),
                entry_price: 100.0,
                last_bar: Some(t),
            },
            DayError::OutOfOrderBar {
                previous: t,
                received: t,
            },
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.reason_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn degenerate_range_message_carries_values() {
        let err = DayError::DegenerateRange {
            high: 21500.0,
            low: 21500.0,
        };
        assert!(err.to_string().contains("21500"));
    }

    #[test]
    fn config_errors_map_to_exit_code_two() {
        let err = OrtraderError::invalid("session", "or_start", "bad");
        assert_eq!(err.exit_code(), 2);
        let err = OrtraderError::Data {
            source_name: "bars.csv".into(),
            reason: "line 3: bad price".into(),
        };
        assert_eq!(err.exit_code(), 5);
    }
}
