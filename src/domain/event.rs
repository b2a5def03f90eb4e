//! Intended-order and audit events emitted by the engine.
//!
//! The engine never routes orders or sends notifications; it hands these to an
//! [`crate::ports::event_port::EventSink`].

use crate::domain::position::ExitReason;
use crate::domain::signal::{Direction, Signal};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RangeFinalized {
        day: NaiveDate,
        high: f64,
        low: f64,
        bar_count: usize,
        top_cutoff: f64,
        bottom_cutoff: f64,
    },
    SignalDecided {
        signal: Signal,
    },
    EntryIntended {
        day: NaiveDate,
        direction: Direction,
        entry_price: f64,
        entry_time: NaiveDateTime,
        stop_price: f64,
        target_price: f64,
    },
    ExitIntended {
        day: NaiveDate,
        direction: Direction,
        exit_price: f64,
        exit_time: NaiveDateTime,
        exit_reason: ExitReason,
        points_gained: f64,
    },
    /// Hard exit time reached with a position still open and no bar to fill it.
    FlattenRequested {
        day: NaiveDate,
        direction: Direction,
        at: NaiveDateTime,
    },
    DayExcluded {
        day: NaiveDate,
        reason_code: String,
        detail: String,
    },
    BarRejected {
        timestamp: NaiveDateTime,
        reason: String,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::RangeFinalized { .. } => "range_finalized",
            EngineEvent::SignalDecided { .. } => "signal_decided",
            EngineEvent::EntryIntended { .. } => "entry_intended",
            EngineEvent::ExitIntended { .. } => "exit_intended",
            EngineEvent::FlattenRequested { .. } => "flatten_requested",
            EngineEvent::DayExcluded { .. } => "day_excluded",
            EngineEvent::BarRejected { .. } => "bar_rejected",
        }
    }
}
