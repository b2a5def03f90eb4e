//! Day-boundary fold shared by backtest and live mode.
//!
//! [`EngineState`] routes bars and clock ticks to the current
//! [`DayContext`], opening a fresh context per calendar day and closing the
//! previous one when the date advances. [`Engine`] wraps it with the
//! [`Ledger`] and an event sink. Bars are never reordered: a regression fails
//! the current day, and a bar for a day that is already closed is rejected.

use crate::domain::bar::Bar;
use crate::domain::config::EngineConfig;
use crate::domain::day::DayContext;
use crate::domain::equity::{EquityCurve, EquityPoint};
use crate::domain::error::OrtraderError;
use crate::domain::event::EngineEvent;
use crate::domain::outcome::{DayOutcome, TradeLog};
use crate::domain::session::{phase_at, SessionPhase};
use crate::ports::event_port::EventSink;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Everything that must survive between live polls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub current: Option<DayContext>,
    pub last_closed_day: Option<NaiveDate>,
}

/// Events and finished days produced by one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub events: Vec<EngineEvent>,
    pub outcomes: Vec<DayOutcome>,
}

impl Step {
    fn extend(&mut self, other: Step) {
        self.events.extend(other.events);
        self.outcomes.extend(other.outcomes);
    }

    fn reject(&mut self, bar: &Bar, reason: &str) {
        warn!(timestamp = %bar.timestamp, reason, "bar rejected");
        self.events.push(EngineEvent::BarRejected {
            timestamp: bar.timestamp,
            reason: reason.to_string(),
        });
    }
}

impl EngineState {
    pub fn on_bar(&mut self, bar: &Bar, config: &EngineConfig) -> Step {
        let mut step = Step::default();
        if !bar.is_sane() {
            step.reject(bar, "inconsistent OHLC values");
            return step;
        }

        let day = bar.day();
        if self.current.as_ref().is_some_and(|ctx| day > ctx.day()) {
            step.extend(self.close_day(config));
        }

        if self.current.is_none() {
            if self.last_closed_day.is_some_and(|last| day <= last) {
                step.reject(bar, "day already closed");
                return step;
            }
            if phase_at(bar.timestamp, &config.session) == SessionPhase::OutsideSession {
                debug!(timestamp = %bar.timestamp, "ignoring bar outside session");
                return step;
            }
            debug!(%day, "opening day");
            self.current = Some(DayContext::new(day));
        }

        if let Some(ctx) = self.current.as_mut() {
            step.events.extend(ctx.on_bar(bar, config));
        }
        step
    }

    /// Clock tick in session-local time. Closes the day once the date
    /// advances, the session ends, or the day is settled and past hard exit.
    pub fn on_clock(&mut self, now: NaiveDateTime, config: &EngineConfig) -> Step {
        let Some(ctx) = self.current.as_mut() else {
            return Step::default();
        };
        let session = &config.session;
        let past_day = now.date() > ctx.day();
        let session_over = now.date() == ctx.day() && now.time() >= session.session_end;
        let settled_after_exit = ctx.is_settled() && now.time() >= session.hard_exit_time;

        if past_day || session_over || settled_after_exit {
            return self.close_day(config);
        }
        Step {
            events: ctx.on_clock(now, config),
            outcomes: Vec::new(),
        }
    }

    pub fn close_day(&mut self, config: &EngineConfig) -> Step {
        let mut step = Step::default();
        if let Some(ctx) = self.current.take() {
            let day = ctx.day();
            let (outcome, events) = ctx.finish(config);
            step.events = events;
            step.outcomes.push(outcome);
            self.last_closed_day = Some(day);
        }
        step
    }

    /// Latest instant already accounted for, used to resume a live feed.
    pub fn resume_point(&self) -> Option<NaiveDateTime> {
        self.current
            .as_ref()
            .and_then(DayContext::last_timestamp)
            .or_else(|| self.last_closed_day.and_then(|d| d.and_hms_opt(23, 59, 59)))
    }
}

/// Ordered trade log plus the equity series derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    log: TradeLog,
    equity: EquityCurve,
}

impl Ledger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            log: TradeLog::new(),
            equity: EquityCurve::new(initial_capital),
        }
    }

    /// Rebuilds a ledger from previously stored outcomes.
    pub fn from_outcomes(
        initial_capital: f64,
        outcomes: impl IntoIterator<Item = DayOutcome>,
    ) -> Result<Self, OrtraderError> {
        let mut ledger = Self::new(initial_capital);
        for outcome in outcomes {
            ledger.record(outcome)?;
        }
        Ok(ledger)
    }

    /// Appends one day. Excluded days reach the audit log only.
    pub fn record(&mut self, outcome: DayOutcome) -> Result<Option<EquityPoint>, OrtraderError> {
        let record = match &outcome {
            DayOutcome::Recorded { record } => Some(record.clone()),
            DayOutcome::Excluded { .. } => None,
        };
        self.log.append(outcome)?;
        Ok(record.map(|r| self.equity.push(&r).clone()))
    }

    pub fn log(&self) -> &TradeLog {
        &self.log
    }

    pub fn equity(&self) -> &EquityCurve {
        &self.equity
    }
}

pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    ledger: Ledger,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, OrtraderError> {
        config.validate()?;
        let ledger = Ledger::new(config.initial_capital);
        Ok(Self {
            config,
            state: EngineState::default(),
            ledger,
        })
    }

    /// Resumes from persisted state. A current day the ledger already holds
    /// is dropped so it cannot be recorded twice.
    pub fn resume(
        config: EngineConfig,
        mut state: EngineState,
        ledger: Ledger,
    ) -> Result<Self, OrtraderError> {
        config.validate()?;
        if let Some(day) = state.current.as_ref().map(DayContext::day) {
            if ledger.log().contains_day(day) {
                info!(%day, "stored trade log already holds current day, dropping it");
                state.current = None;
            }
        }
        state.last_closed_day = state.last_closed_day.max(ledger.log().last_day());
        Ok(Self {
            config,
            state,
            ledger,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }

    pub fn on_bar(&mut self, bar: &Bar, sink: &mut dyn EventSink) -> Result<Vec<DayOutcome>, OrtraderError> {
        let step = self.state.on_bar(bar, &self.config);
        self.apply(step, sink)
    }

    pub fn on_clock(
        &mut self,
        now: NaiveDateTime,
        sink: &mut dyn EventSink,
    ) -> Result<Vec<DayOutcome>, OrtraderError> {
        let step = self.state.on_clock(now, &self.config);
        self.apply(step, sink)
    }

    /// Closes the current day; used when a historical feed is exhausted.
    pub fn finish(&mut self, sink: &mut dyn EventSink) -> Result<Vec<DayOutcome>, OrtraderError> {
        let step = self.state.close_day(&self.config);
        self.apply(step, sink)
    }

    fn apply(&mut self, step: Step, sink: &mut dyn EventSink) -> Result<Vec<DayOutcome>, OrtraderError> {
        for event in &step.events {
            sink.publish(event)?;
        }
        for outcome in &step.outcomes {
            self.ledger.record(outcome.clone())?;
        }
        Ok(step.outcomes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub ledger: Ledger,
    pub bars_processed: usize,
    pub bars_rejected: usize,
}

/// Runs a complete historical bar sequence through a fresh engine.
pub fn run_backtest(
    bars: impl IntoIterator<Item = Bar>,
    config: &EngineConfig,
    sink: &mut dyn EventSink,
) -> Result<BacktestResult, OrtraderError> {
    let mut engine = Engine::new(config.clone())?;
    let mut counter = RejectCounter { inner: sink, rejected: 0 };
    let mut bars_processed = 0;

    for bar in bars {
        engine.on_bar(&bar, &mut counter)?;
        bars_processed += 1;
    }
    engine.finish(&mut counter)?;

    let bars_rejected = counter.rejected;
    let ledger = engine.into_ledger();
    info!(
        bars = bars_processed,
        rejected = bars_rejected,
        recorded = ledger.log().records().len(),
        excluded = ledger.log().exclusions().len(),
        "backtest complete"
    );
    Ok(BacktestResult {
        ledger,
        bars_processed,
        bars_rejected,
    })
}

struct RejectCounter<'a> {
    inner: &'a mut dyn EventSink,
    rejected: usize,
}

impl EventSink for RejectCounter<'_> {
    fn publish(&mut self, event: &EngineEvent) -> Result<(), OrtraderError> {
        if matches!(event, EngineEvent::BarRejected { .. }) {
            self.rejected += 1;
        }
        self.inner.publish(event)
    }
}
