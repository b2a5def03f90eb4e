//! Equity and drawdown accumulation over recorded days.

use crate::domain::outcome::TradeRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub day: NaiveDate,
    pub pnl_usd: f64,
    pub equity_after: f64,
    /// Highest `equity_after` up to and including this day.
    pub peak: f64,
    pub drawdown_from_peak: f64,
    pub drawdown_pct: f64,
}

/// Running equity series. Peak tracks recorded equity points only, so the
/// first point never shows a drawdown.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityCurve {
    initial_capital: f64,
    equity: f64,
    peak: Option<f64>,
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            equity: initial_capital,
            peak: None,
            points: Vec::new(),
        }
    }

    pub fn push(&mut self, record: &TradeRecord) -> &EquityPoint {
        self.equity += record.pnl_usd;
        let peak = self.peak.map_or(self.equity, |p| p.max(self.equity));
        self.peak = Some(peak);
        let drawdown = (peak - self.equity).max(0.0);
        let drawdown_pct = if peak > 0.0 { drawdown / peak } else { 0.0 };
        self.points.push(EquityPoint {
            day: record.day,
            pnl_usd: record.pnl_usd,
            equity_after: self.equity,
            peak,
            drawdown_from_peak: drawdown,
            drawdown_pct,
        });
        &self.points[self.points.len() - 1]
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn max_drawdown(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.drawdown_from_peak)
            .fold(0.0, f64::max)
    }
}
