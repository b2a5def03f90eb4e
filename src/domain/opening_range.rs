//! Opening range accumulation.

use crate::domain::bar::Bar;
use crate::domain::error::DayError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// High/low band of the opening range window for one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpeningRange {
    pub day: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub bar_count: usize,
}

impl OpeningRange {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_degenerate(&self) -> bool {
        self.high <= self.low
    }

    pub fn missing_bars(&self, expected: usize) -> usize {
        expected.saturating_sub(self.bar_count)
    }
}

/// Running high/low over the bars observed in the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpeningRangeAccumulator {
    extremes: Option<(f64, f64)>,
    bar_count: usize,
}

impl OpeningRangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, bar: &Bar) {
        self.extremes = Some(match self.extremes {
            None => (bar.high, bar.low),
            Some((high, low)) => (high.max(bar.high), low.min(bar.low)),
        });
        self.bar_count += 1;
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    pub fn finalize(&self, day: NaiveDate) -> Result<OpeningRange, DayError> {
        let (high, low) = self.extremes.ok_or(DayError::NoRangeData)?;
        Ok(OpeningRange {
            day,
            high,
            low,
            bar_count: self.bar_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(minute: u32, high: f64, low: f64) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(9, 30 + minute, 0)
                .unwrap(),
            open: low,
            high,
            low,
            close: high,
            volume: 10,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn tracks_running_extremes() {
        let mut acc = OpeningRangeAccumulator::new();
        acc.observe(&bar(0, 21550.0, 21520.0));
        acc.observe(&bar(1, 21600.0, 21540.0));
        acc.observe(&bar(2, 21580.0, 21500.0));
        let or = acc.finalize(day()).unwrap();
        assert!((or.high - 21600.0).abs() < f64::EPSILON);
        assert!((or.low - 21500.0).abs() < f64::EPSILON);
        assert!((or.range() - 100.0).abs() < f64::EPSILON);
        assert_eq!(or.bar_count, 3);
        assert_eq!(or.missing_bars(30), 27);
    }

    #[test]
    fn no_bars_is_no_range_data() {
        let acc = OpeningRangeAccumulator::new();
        assert_eq!(acc.finalize(day()), Err(DayError::NoRangeData));
    }

    #[test]
    fn flat_bars_give_degenerate_range() {
        let mut acc = OpeningRangeAccumulator::new();
        acc.observe(&bar(0, 21500.0, 21500.0));
        acc.observe(&bar(1, 21500.0, 21500.0));
        assert!(acc.finalize(day()).unwrap().is_degenerate());
    }

    #[test]
    fn survives_json_round_trip_mid_window() {
        let mut acc = OpeningRangeAccumulator::new();
        acc.observe(&bar(0, 21550.0, 21520.0));
        let json = serde_json::to_string(&acc).unwrap();
        let restored: OpeningRangeAccumulator = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, acc);
    }
}
