//! Per-day evaluation context.
//!
//! A [`DayContext`] owns everything one trading day needs: the opening range
//! accumulator, the decision candidate, the signal and the position. It is a
//! plain serializable value so a live runner can persist it between polls and
//! resume after a restart.

use crate::domain::bar::Bar;
use crate::domain::config::{EngineConfig, EntryFill, ZeroRangePolicy};
use crate::domain::error::DayError;
use crate::domain::event::EngineEvent;
use crate::domain::opening_range::{OpeningRange, OpeningRangeAccumulator};
use crate::domain::outcome::{DayOutcome, TradeRecord};
use crate::domain::position::{ClosedPosition, Position, PositionState};
use crate::domain::session::{phase_at, SessionPhase};
use crate::domain::signal::{self, Signal};
use crate::domain::volatility::AtrTracker;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayContext {
    day: NaiveDate,
    accumulator: OpeningRangeAccumulator,
    range: Option<OpeningRange>,
    /// Last bar at or before the entry time.
    decision_bar: Option<Bar>,
    #[serde(default)]
    atr: AtrTracker,
    last_timestamp: Option<NaiveDateTime>,
    signal: Option<Signal>,
    position: PositionState,
    record: Option<TradeRecord>,
    failure: Option<DayError>,
    flatten_requested: bool,
}

impl DayContext {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            accumulator: OpeningRangeAccumulator::new(),
            range: None,
            decision_bar: None,
            atr: AtrTracker::default(),
            last_timestamp: None,
            signal: None,
            position: PositionState::Flat,
            record: None,
            failure: None,
            flatten_requested: false,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn range(&self) -> Option<&OpeningRange> {
        self.range.as_ref()
    }

    pub fn signal(&self) -> Option<&Signal> {
        self.signal.as_ref()
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn failure(&self) -> Option<&DayError> {
        self.failure.as_ref()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }

    /// The day's outcome is known; further bars are ignored.
    pub fn is_settled(&self) -> bool {
        self.record.is_some() || self.failure.is_some()
    }

    pub fn on_bar(&mut self, bar: &Bar, config: &EngineConfig) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp <= previous {
                if self.is_settled() {
                    warn!(day = %self.day, %previous, received = %bar.timestamp, "out-of-order bar after day settled");
                    events.push(EngineEvent::BarRejected {
                        timestamp: bar.timestamp,
                        reason: format!("does not follow {previous}"),
                    });
                } else {
                    self.fail(DayError::OutOfOrderBar {
                        previous,
                        received: bar.timestamp,
                    });
                }
                return events;
            }
        }
        self.last_timestamp = Some(bar.timestamp);
        if self.is_settled() {
            return events;
        }

        if bar.time() <= config.session.entry_time {
            self.atr.observe(bar);
            self.decision_bar = Some(bar.clone());
        }

        match phase_at(bar.timestamp, &config.session) {
            SessionPhase::OutsideSession | SessionPhase::PreRange => {}
            SessionPhase::InRange => self.accumulator.observe(bar),
            SessionPhase::PostRangePreEntry
            | SessionPhase::DecisionInstant
            | SessionPhase::Monitoring
            | SessionPhase::PostHardExit => self.advance(bar, config, &mut events),
        }
        events
    }

    /// Time-driven transitions for live mode: deciding once the decision
    /// grace has elapsed without a decision bar, and requesting a flatten once
    /// the hard exit time passes with the position still open.
    pub fn on_clock(&mut self, now: NaiveDateTime, config: &EngineConfig) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.is_settled() || now.date() != self.day {
            return events;
        }
        let session = &config.session;

        let decide_at = self.day.and_time(session.entry_time)
            + Duration::minutes(config.quality.decision_grace_minutes);
        if self.signal.is_none() && now >= decide_at {
            debug!(day = %self.day, %now, "decision grace elapsed, deciding on available bars");
            if self.range.is_some() || self.finalize_range(config, &mut events) {
                self.decide(config, &mut events);
            }
        }

        if now.time() >= session.hard_exit_time {
            self.request_flatten(now, &mut events);
        }
        events
    }

    /// Closes the day. Anything still unresolved becomes an exclusion.
    pub fn finish(mut self, config: &EngineConfig) -> (DayOutcome, Vec<EngineEvent>) {
        let mut events = Vec::new();
        if !self.is_settled() && self.range.is_none() {
            self.finalize_range(config, &mut events);
        }
        if !self.is_settled() && self.signal.is_none() {
            self.decide(config, &mut events);
        }
        if !self.is_settled() {
            if self.position.is_entered() {
                let at = self.day.and_time(config.session.hard_exit_time);
                self.request_flatten(at, &mut events);
            }
            let error = self.unresolved_error(config);
            self.fail(error);
        }

        let outcome = match (self.failure, self.record) {
            (Some(error), _) => {
                warn!(day = %self.day, reason = error.reason_code(), "day excluded: {error}");
                events.push(EngineEvent::DayExcluded {
                    day: self.day,
                    reason_code: error.reason_code().to_string(),
                    detail: error.to_string(),
                });
                DayOutcome::excluded(self.day, error)
            }
            (None, Some(record)) => {
                info!(
                    day = %record.day,
                    direction = %record.direction,
                    points = record.points_gained,
                    pnl_usd = record.pnl_usd,
                    "day recorded"
                );
                DayOutcome::Recorded { record }
            }
            (None, None) => {
                // Unreachable after the resolution above; kept total.
                DayOutcome::excluded(self.day, DayError::NoRangeData)
            }
        };
        (outcome, events)
    }

    fn advance(&mut self, bar: &Bar, config: &EngineConfig, events: &mut Vec<EngineEvent>) {
        if self.range.is_none() && !self.finalize_range(config, events) {
            return;
        }
        if self.signal.is_none() {
            if bar.time() < config.session.entry_time {
                return;
            }
            if !self.decide(config, events) {
                return;
            }
        }
        self.track_position(bar, config, events);
    }

    /// Returns true when the day continues with a usable range.
    fn finalize_range(&mut self, config: &EngineConfig, events: &mut Vec<EngineEvent>) -> bool {
        let range = match self.accumulator.finalize(self.day) {
            Ok(range) => range,
            Err(error) => {
                self.fail(error);
                return false;
            }
        };

        let expected = config.session.expected_or_bars();
        if let Some(tolerance) = config.quality.max_missing_or_bars {
            if range.missing_bars(expected) > tolerance {
                self.fail(DayError::IncompleteRange {
                    observed: range.bar_count,
                    expected,
                    tolerance,
                });
                return false;
            }
        }

        if range.is_degenerate() {
            self.range = Some(range);
            match config.quality.zero_range {
                ZeroRangePolicy::Exclude => self.fail(DayError::DegenerateRange {
                    high: range.high,
                    low: range.low,
                }),
                ZeroRangePolicy::NoTrade => {
                    self.position.stand_aside();
                    self.record = Some(TradeRecord::zero_range(&range));
                }
            }
            return false;
        }

        let (top_cutoff, bottom_cutoff) = signal::cutoffs(&range, &config.session);
        info!(
            day = %self.day,
            high = range.high,
            low = range.low,
            bars = range.bar_count,
            top_cutoff,
            bottom_cutoff,
            "opening range finalized"
        );
        events.push(EngineEvent::RangeFinalized {
            day: self.day,
            high: range.high,
            low: range.low,
            bar_count: range.bar_count,
            top_cutoff,
            bottom_cutoff,
        });
        self.range = Some(range);
        true
    }

    /// Classifies once. Returns true when a position is pending or open.
    fn decide(&mut self, config: &EngineConfig, events: &mut Vec<EngineEvent>) -> bool {
        let Some(range) = self.range else {
            return false;
        };
        let session = &config.session;
        let tolerance = config.fills.decision_tolerance_minutes;
        let entry_at = self.day.and_time(session.entry_time);

        let Some(bar) = self
            .decision_bar
            .clone()
            .filter(|b| (entry_at - b.timestamp).num_minutes() <= tolerance)
        else {
            let last_bar = self.decision_bar.as_ref().map(|b| b.timestamp);
            self.fail(DayError::MissingDecisionBar {
                entry_time: session.entry_time,
                tolerance_minutes: tolerance,
                last_bar,
            });
            return false;
        };

        let reference = bar.price(config.fills.decision_field);
        let signal = match signal::classify(&range, reference, bar.timestamp, session) {
            Ok(signal) => Signal {
                pre_trade_atr: self.atr.value(),
                ..signal
            },
            Err(error) => {
                self.fail(error);
                return false;
            }
        };
        info!(
            day = %self.day,
            signal = %signal.kind,
            reference,
            position_pct = signal.position_pct,
            atr = signal.pre_trade_atr,
            "signal decided"
        );
        events.push(EngineEvent::SignalDecided {
            signal: signal.clone(),
        });

        let Some(direction) = signal.kind.direction() else {
            self.position.stand_aside();
            self.record = Some(TradeRecord::middle_zone(&signal));
            self.signal = Some(signal);
            return false;
        };

        match config.fills.entry {
            EntryFill::DecisionPrice => {
                if let Some(position) = self.position.enter(direction, reference, bar.timestamp, session) {
                    events.push(entry_event(position));
                }
            }
            EntryFill::NextBarOpen => {
                self.position.await_fill(direction, bar.timestamp);
            }
        }
        self.signal = Some(signal);
        true
    }

    fn track_position(&mut self, bar: &Bar, config: &EngineConfig, events: &mut Vec<EngineEvent>) {
        let session = &config.session;
        let mut filled_on_bar = false;
        if let PositionState::AwaitingFill { decided_at, .. } = self.position {
            if bar.timestamp <= decided_at {
                return;
            }
            if let Some(position) = self.position.fill_at_open(bar, session) {
                events.push(entry_event(position));
                filled_on_bar = true;
            }
        }

        // An open fill is exposed to the rest of its own bar; a decision-price
        // fill is not.
        match self.position.position() {
            Some(position) if filled_on_bar || bar.timestamp > position.entry_time => {}
            _ => return,
        }
        let hard_exit_due = bar.time() >= session.hard_exit_time;
        let Some(closed) = self.position.monitor(bar, &config.fills, hard_exit_due).cloned() else {
            return;
        };
        events.push(exit_event(&closed));

        if let Some(signal) = &self.signal {
            self.record = Some(TradeRecord::trade(&closed, signal, session));
        }
    }

    fn request_flatten(&mut self, at: NaiveDateTime, events: &mut Vec<EngineEvent>) {
        if self.flatten_requested {
            return;
        }
        if let Some(position) = self.position.position() {
            warn!(day = %self.day, direction = %position.direction, %at, "hard exit reached with open position, requesting flatten");
            events.push(EngineEvent::FlattenRequested {
                day: self.day,
                direction: position.direction,
                at,
            });
            self.flatten_requested = true;
        }
    }

    fn unresolved_error(&self, config: &EngineConfig) -> DayError {
        match &self.position {
            PositionState::AwaitingFill {
                direction,
                decided_at,
            } => DayError::EntryFillMissed {
                direction: direction.to_string(),
                decided_at: *decided_at,
            },
            PositionState::Entered { position } => DayError::ForcedExitMissed {
                hard_exit_time: config.session.hard_exit_time,
                entry_price: position.entry_price,
                last_bar: self.last_timestamp,
            },
            PositionState::Flat | PositionState::StoodAside | PositionState::Closed { .. } => {
                DayError::MissingDecisionBar {
                    entry_time: config.session.entry_time,
                    tolerance_minutes: config.fills.decision_tolerance_minutes,
                    last_bar: self.decision_bar.as_ref().map(|b| b.timestamp),
                }
            }
        }
    }

    fn fail(&mut self, error: DayError) {
        debug!(day = %self.day, reason = error.reason_code(), "day failed: {error}");
        self.failure = Some(error);
    }
}

fn entry_event(position: &Position) -> EngineEvent {
    info!(
        day = %position.day,
        direction = %position.direction,
        entry = position.entry_price,
        stop = position.stop_price,
        target = position.target_price,
        "entry intended"
    );
    EngineEvent::EntryIntended {
        day: position.day,
        direction: position.direction,
        entry_price: position.entry_price,
        entry_time: position.entry_time,
        stop_price: position.stop_price,
        target_price: position.target_price,
    }
}

fn exit_event(closed: &ClosedPosition) -> EngineEvent {
    info!(
        day = %closed.position.day,
        reason = %closed.exit_reason,
        exit = closed.exit_price,
        points = closed.points_gained(),
        "exit intended"
    );
    EngineEvent::ExitIntended {
        day: closed.position.day,
        direction: closed.position.direction,
        exit_price: closed.exit_price,
        exit_time: closed.exit_time,
        exit_reason: closed.exit_reason,
        points_gained: closed.points_gained(),
    }
}
