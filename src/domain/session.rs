//! Session clock: maps a session-local timestamp to its phase of the day.

use crate::domain::config::SessionConfig;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Non-trading day, or at/after the session end.
    OutsideSession,
    PreRange,
    /// `[or_start, or_end)`
    InRange,
    PostRangePreEntry,
    DecisionInstant,
    Monitoring,
    /// `[hard_exit_time, session_end)`
    PostHardExit,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::OutsideSession => "outside_session",
            SessionPhase::PreRange => "pre_range",
            SessionPhase::InRange => "in_range",
            SessionPhase::PostRangePreEntry => "post_range_pre_entry",
            SessionPhase::DecisionInstant => "decision_instant",
            SessionPhase::Monitoring => "monitoring",
            SessionPhase::PostHardExit => "post_hard_exit",
        };
        f.write_str(s)
    }
}

pub fn is_trading_day(day: NaiveDate, session: &SessionConfig) -> bool {
    !(session.skip_weekends && matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
}

/// Total over all timestamps; pure.
pub fn phase_at(timestamp: NaiveDateTime, session: &SessionConfig) -> SessionPhase {
    if !is_trading_day(timestamp.date(), session) {
        return SessionPhase::OutsideSession;
    }
    let t = timestamp.time();
    if t >= session.session_end {
        SessionPhase::OutsideSession
    } else if t < session.or_start {
        SessionPhase::PreRange
    } else if t < session.or_end {
        SessionPhase::InRange
    } else if t < session.entry_time {
        SessionPhase::PostRangePreEntry
    } else if t == session.entry_time {
        SessionPhase::DecisionInstant
    } else if t < session.hard_exit_time {
        SessionPhase::Monitoring
    } else {
        SessionPhase::PostHardExit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        // March 2024: the 4th is a Monday.
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn phases_follow_boundaries() {
        let s = SessionConfig::default();
        assert_eq!(phase_at(at(4, 9, 29), &s), SessionPhase::PreRange);
        assert_eq!(phase_at(at(4, 9, 30), &s), SessionPhase::InRange);
        assert_eq!(phase_at(at(4, 9, 59), &s), SessionPhase::InRange);
        assert_eq!(phase_at(at(4, 10, 0), &s), SessionPhase::PostRangePreEntry);
        assert_eq!(phase_at(at(4, 10, 21), &s), SessionPhase::PostRangePreEntry);
        assert_eq!(phase_at(at(4, 10, 22), &s), SessionPhase::DecisionInstant);
        assert_eq!(phase_at(at(4, 10, 23), &s), SessionPhase::Monitoring);
        assert_eq!(phase_at(at(4, 11, 59), &s), SessionPhase::Monitoring);
        assert_eq!(phase_at(at(4, 12, 0), &s), SessionPhase::PostHardExit);
        assert_eq!(phase_at(at(4, 15, 59), &s), SessionPhase::PostHardExit);
        assert_eq!(phase_at(at(4, 16, 0), &s), SessionPhase::OutsideSession);
    }

    #[test]
    fn weekend_is_outside_session() {
        let s = SessionConfig::default();
        assert_eq!(phase_at(at(2, 10, 22), &s), SessionPhase::OutsideSession);
        assert_eq!(phase_at(at(3, 9, 45), &s), SessionPhase::OutsideSession);

        let every_day = SessionConfig {
            skip_weekends: false,
            ..SessionConfig::default()
        };
        assert_eq!(phase_at(at(3, 9, 45), &every_day), SessionPhase::InRange);
    }

    #[test]
    fn entry_at_or_end_skips_gap_phase() {
        let s = SessionConfig {
            entry_time: SessionConfig::default().or_end,
            ..SessionConfig::default()
        };
        assert_eq!(phase_at(at(4, 10, 0), &s), SessionPhase::DecisionInstant);
    }

    #[test]
    fn phase_is_idempotent() {
        let s = SessionConfig::default();
        let t = at(5, 10, 45);
        assert_eq!(phase_at(t, &s), phase_at(t, &s));
    }
}
