//! The day's single position and its lifecycle.
//!
//! `Flat -> [AwaitingFill ->] Entered -> Closed`, or `Flat -> StoodAside` when
//! the signal is NoTrade. Every transition is a method on [`PositionState`]
//! that only fires from its source state, so a second entry on the same day is
//! impossible: once the state leaves `Flat` it never returns.

use crate::domain::bar::{Bar, PriceField};
use crate::domain::config::{FillPolicy, SessionConfig, StopFill, TieBreak};
use crate::domain::signal::Direction;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    HardExit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::HardExit => "hard_exit",
        })
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop_loss" => Ok(ExitReason::StopLoss),
            "take_profit" => Ok(ExitReason::TakeProfit),
            "hard_exit" => Ok(ExitReason::HardExit),
            other => Err(format!("unknown exit reason '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub day: NaiveDate,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub stop_price: f64,
    pub target_price: f64,
    /// Best excursion in points seen on the monitored path, never negative.
    pub mfe_points: f64,
    /// Worst excursion in points seen on the monitored path, never negative.
    pub mae_points: f64,
}

impl Position {
    pub fn open(
        direction: Direction,
        entry_price: f64,
        entry_time: NaiveDateTime,
        session: &SessionConfig,
    ) -> Self {
        let sign = direction.sign();
        Self {
            day: entry_time.date(),
            direction,
            entry_price,
            entry_time,
            stop_price: session.round_to_tick(entry_price - sign * session.stop_points),
            target_price: session.round_to_tick(entry_price + sign * session.target_points),
            mfe_points: 0.0,
            mae_points: 0.0,
        }
    }

    pub fn stop_touched(&self, bar: &Bar) -> bool {
        match self.direction {
            Direction::Long => bar.low <= self.stop_price,
            Direction::Short => bar.high >= self.stop_price,
        }
    }

    pub fn target_touched(&self, bar: &Bar) -> bool {
        match self.direction {
            Direction::Long => bar.high >= self.target_price,
            Direction::Short => bar.low <= self.target_price,
        }
    }

    pub fn points_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.direction.sign()
    }

    fn observe_excursion(&mut self, bar: &Bar) {
        let (favorable, adverse) = match self.direction {
            Direction::Long => (bar.high - self.entry_price, self.entry_price - bar.low),
            Direction::Short => (self.entry_price - bar.low, bar.high - self.entry_price),
        };
        self.mfe_points = self.mfe_points.max(favorable);
        self.mae_points = self.mae_points.max(adverse);
    }

    fn stop_fill_price(&self, bar: &Bar, policy: StopFill) -> f64 {
        match (policy, self.direction) {
            (StopFill::GapAware, Direction::Long) if bar.open <= self.stop_price => bar.open,
            (StopFill::GapAware, Direction::Short) if bar.open >= self.stop_price => bar.open,
            _ => self.stop_price,
        }
    }
}

/// A position that has been exited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_reason: ExitReason,
}

impl ClosedPosition {
    pub fn points_gained(&self) -> f64 {
        self.position.points_at(self.exit_price)
    }
}

/// Evaluates one monitored bar against an open position.
///
/// Excursions are updated first so the exit bar counts toward MFE/MAE. Stop
/// and target are checked on every bar; when both are touched the fill
/// policy's tie-break decides. If neither fires and `hard_exit_due`, the
/// position exits at the configured field of this bar.
pub fn evaluate_exit(
    position: &mut Position,
    bar: &Bar,
    fills: &FillPolicy,
    hard_exit_due: bool,
) -> Option<(f64, ExitReason)> {
    position.observe_excursion(bar);

    let stop = position.stop_touched(bar);
    let target = position.target_touched(bar);
    let stop_exit = || (position.stop_fill_price(bar, fills.stop_fill), ExitReason::StopLoss);
    let target_exit = || (position.target_price, ExitReason::TakeProfit);

    match (stop, target) {
        (true, true) => Some(match fills.tie_break {
            TieBreak::StopFirst => stop_exit(),
            TieBreak::TargetFirst => target_exit(),
        }),
        (true, false) => Some(stop_exit()),
        (false, true) => Some(target_exit()),
        (false, false) if hard_exit_due => {
            Some((bar.price(fills.hard_exit_field), ExitReason::HardExit))
        }
        (false, false) => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionState {
    #[default]
    Flat,
    /// Directional decision taken; waits for the next bar's open.
    AwaitingFill {
        direction: Direction,
        decided_at: NaiveDateTime,
    },
    Entered { position: Position },
    Closed { closed: ClosedPosition },
    /// The signal was NoTrade; no position exists today.
    StoodAside,
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn is_entered(&self) -> bool {
        matches!(self, PositionState::Entered { .. })
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Entered { position } => Some(position),
            _ => None,
        }
    }

    pub fn closed(&self) -> Option<&ClosedPosition> {
        match self {
            PositionState::Closed { closed } => Some(closed),
            _ => None,
        }
    }

    /// `Flat -> Entered`. Returns the new position, or `None` if not flat.
    pub fn enter(
        &mut self,
        direction: Direction,
        entry_price: f64,
        entry_time: NaiveDateTime,
        session: &SessionConfig,
    ) -> Option<&Position> {
        if !self.is_flat() {
            return None;
        }
        *self = PositionState::Entered {
            position: Position::open(direction, entry_price, entry_time, session),
        };
        self.position()
    }

    /// `Flat -> AwaitingFill`.
    pub fn await_fill(&mut self, direction: Direction, decided_at: NaiveDateTime) -> bool {
        if !self.is_flat() {
            return false;
        }
        *self = PositionState::AwaitingFill {
            direction,
            decided_at,
        };
        true
    }

    /// `Flat -> StoodAside`.
    pub fn stand_aside(&mut self) -> bool {
        if !self.is_flat() {
            return false;
        }
        *self = PositionState::StoodAside;
        true
    }

    /// `AwaitingFill -> Entered` at `bar`'s open.
    pub fn fill_at_open(&mut self, bar: &Bar, session: &SessionConfig) -> Option<&Position> {
        let PositionState::AwaitingFill { direction, .. } = *self else {
            return None;
        };
        *self = PositionState::Entered {
            position: Position::open(direction, bar.price(PriceField::Open), bar.timestamp, session),
        };
        self.position()
    }

    /// `Entered -> Closed` when `bar` triggers an exit.
    pub fn monitor(
        &mut self,
        bar: &Bar,
        fills: &FillPolicy,
        hard_exit_due: bool,
    ) -> Option<&ClosedPosition> {
        let PositionState::Entered { position } = self else {
            return None;
        };
        let (exit_price, exit_reason) = evaluate_exit(position, bar, fills, hard_exit_due)?;
        let closed = ClosedPosition {
            position: position.clone(),
            exit_price,
            exit_time: bar.timestamp,
            exit_reason,
        };
        *self = PositionState::Closed { closed };
        self.closed()
    }
}
