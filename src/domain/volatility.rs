//! Pre-trade volatility: a streaming average true range over the day's bars.

use crate::domain::bar::Bar;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const ATR_PERIOD: usize = 14;

/// Simple moving average of the last `period` true ranges.
///
/// The first bar has no previous close and contributes no true range, so the
/// value stays 0.0 until `period + 1` bars have been observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrTracker {
    period: usize,
    prev_close: Option<f64>,
    true_ranges: VecDeque<f64>,
}

impl AtrTracker {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            true_ranges: VecDeque::with_capacity(period),
        }
    }

    pub fn observe(&mut self, bar: &Bar) {
        if let Some(prev_close) = self.prev_close {
            if self.true_ranges.len() == self.period {
                self.true_ranges.pop_front();
            }
            self.true_ranges.push_back(bar.true_range(prev_close));
        }
        self.prev_close = Some(bar.close);
    }

    pub fn value(&self) -> f64 {
        if self.period == 0 || self.true_ranges.len() < self.period {
            return 0.0;
        }
        self.true_ranges.iter().sum::<f64>() / self.period as f64
    }
}

impl Default for AtrTracker {
    fn default() -> Self {
        Self::new(ATR_PERIOD)
    }
}
