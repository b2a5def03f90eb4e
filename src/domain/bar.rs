//! One-minute OHLCV bar in session-local time.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Calendar day the bar belongs to.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.timestamp.time()
    }

    pub fn price(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
        }
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Finite prices with low <= open, close <= high.
    pub fn is_sane(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite())
            && self.low <= self.high
            && self.open >= self.low
            && self.open <= self.high
            && self.close >= self.low
            && self.close <= self.high
    }
}

/// Which OHLC field a fill reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl FromStr for PriceField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(PriceField::Open),
            "high" => Ok(PriceField::High),
            "low" => Ok(PriceField::Low),
            "close" => Ok(PriceField::Close),
            other => Err(format!("unknown price field '{other}'")),
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(10, 22, 0)
                .unwrap(),
            open: 21560.0,
            high: 21580.0,
            low: 21555.0,
            close: 21575.0,
            volume: 1200,
        }
    }

    #[test]
    fn price_reads_requested_field() {
        let bar = sample_bar();
        assert!((bar.price(PriceField::Open) - 21560.0).abs() < f64::EPSILON);
        assert!((bar.price(PriceField::Close) - 21575.0).abs() < f64::EPSILON);
        assert!((bar.price(PriceField::High) - 21580.0).abs() < f64::EPSILON);
        assert!((bar.price(PriceField::Low) - 21555.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_takes_widest_span() {
        let bar = sample_bar();
        // high-low=25 dominates a close inside the bar
        assert!((bar.true_range(21570.0) - 25.0).abs() < f64::EPSILON);
        // gap up from 21530: |21580-21530|=50
        assert!((bar.true_range(21530.0) - 50.0).abs() < f64::EPSILON);
        // gap down from 21600: |21555-21600|=45
        assert!((bar.true_range(21600.0) - 45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn day_and_time_split_timestamp() {
        let bar = sample_bar();
        assert_eq!(bar.day(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(bar.time(), NaiveTime::from_hms_opt(10, 22, 0).unwrap());
    }

    #[test]
    fn sanity_rejects_inverted_bar() {
        let mut bar = sample_bar();
        assert!(bar.is_sane());
        bar.low = 21600.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn sanity_rejects_nan() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(!bar.is_sane());
    }

    #[test]
    fn price_field_parses_case_insensitive() {
        assert_eq!("Close".parse::<PriceField>(), Ok(PriceField::Close));
        assert_eq!(" open ".parse::<PriceField>(), Ok(PriceField::Open));
        assert!("mid".parse::<PriceField>().is_err());
    }
}
