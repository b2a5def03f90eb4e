#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
pub use ortrader::domain::bar::Bar;
use ortrader::domain::engine::EngineState;
use ortrader::domain::error::OrtraderError;
use ortrader::domain::event::EngineEvent;
use ortrader::domain::outcome::DayOutcome;
use ortrader::ports::clock_port::Clock;
use ortrader::ports::data_port::{BarFeed, BarSource};
use ortrader::ports::event_port::EventSink;
use ortrader::ports::state_port::StateStore;
use ortrader::ports::store_port::TradeStore;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// March 2024; the 4th is a Monday.
pub fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

pub fn ts(d: u32, hour: u32, minute: u32) -> NaiveDateTime {
    date(d).and_hms_opt(hour, minute, 0).unwrap()
}

pub fn make_bar(t: NaiveDateTime, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        timestamp: t,
        open,
        high,
        low,
        close,
        volume: 1000,
    }
}

/// A bar with a one-point wick either side of `price`.
pub fn flat_bar(t: NaiveDateTime, price: f64) -> Bar {
    make_bar(t, price, price + 1.0, price - 1.0, price)
}

/// Builds one trading day bar by bar.
pub struct DayBuilder {
    day: u32,
    bars: Vec<Bar>,
}

impl DayBuilder {
    pub fn new(day: u32) -> Self {
        Self { day, bars: Vec::new() }
    }

    /// Thirty bars from 09:30 whose extremes are exactly `high` and `low`.
    pub fn range(mut self, high: f64, low: f64) -> Self {
        let mid = (high + low) / 2.0;
        for m in 0..30 {
            let t = ts(self.day, 9, 30) + Duration::minutes(m);
            let bar = match m {
                0 => make_bar(t, mid, high, mid, mid),
                1 => make_bar(t, mid, mid, low, mid),
                _ => make_bar(t, mid, mid, mid, mid),
            };
            self.bars.push(bar);
        }
        self
    }

    /// Only `count` of the thirty opening-range minutes are present.
    pub fn sparse_range(mut self, high: f64, low: f64, count: i64) -> Self {
        self = self.range(high, low);
        self.bars.truncate(count as usize);
        self
    }

    /// Decision bar at 10:22 closing at `close`.
    pub fn decide(self, close: f64) -> Self {
        self.flat(10, 22, close)
    }

    pub fn flat(mut self, hour: u32, minute: u32, price: f64) -> Self {
        self.bars.push(flat_bar(ts(self.day, hour, minute), price));
        self
    }

    pub fn bar(mut self, hour: u32, minute: u32, open: f64, high: f64, low: f64, close: f64) -> Self {
        self.bars.push(make_bar(ts(self.day, hour, minute), open, high, low, close));
        self
    }

    pub fn build(self) -> Vec<Bar> {
        self.bars
    }
}

/// Full day with range 21500..21600, decision at `reference`, flat to the
/// 12:00 hard exit.
pub fn quiet_day(day: u32, reference: f64) -> Vec<Bar> {
    DayBuilder::new(day)
        .range(21600.0, 21500.0)
        .decide(reference)
        .flat(11, 0, reference)
        .flat(12, 0, reference + 4.0)
        .build()
}

pub struct MockBarSource {
    pub bars: Vec<Bar>,
}

impl BarSource for MockBarSource {
    fn load_bars(&self) -> Result<Vec<Bar>, OrtraderError> {
        Ok(self.bars.clone())
    }
}

/// Hands out one scripted batch per poll.
#[derive(Clone, Default)]
pub struct ScriptedFeed {
    pub batches: Rc<RefCell<VecDeque<Vec<Bar>>>>,
    pub resumed_after: Rc<Cell<Option<NaiveDateTime>>>,
}

impl ScriptedFeed {
    pub fn push(&self, bars: Vec<Bar>) {
        self.batches.borrow_mut().push_back(bars);
    }
}

impl BarFeed for ScriptedFeed {
    fn poll(&mut self) -> Result<Vec<Bar>, OrtraderError> {
        let batch = self.batches.borrow_mut().pop_front().unwrap_or_default();
        let after = self.resumed_after.get();
        Ok(batch
            .into_iter()
            .filter(|b| after.is_none_or(|w| b.timestamp > w))
            .collect())
    }

    fn resume_after(&mut self, watermark: NaiveDateTime) {
        self.resumed_after.set(Some(watermark));
    }
}

#[derive(Clone)]
pub struct ManualClock(pub Rc<Cell<NaiveDateTime>>);

impl ManualClock {
    pub fn at(t: NaiveDateTime) -> Self {
        Self(Rc::new(Cell::new(t)))
    }

    pub fn set(&self, t: NaiveDateTime) {
        self.0.set(t);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.0.get()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStateStore(pub Rc<RefCell<Option<EngineState>>>);

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<EngineState>, OrtraderError> {
        Ok(self.0.borrow().clone())
    }

    fn save(&self, state: &EngineState) -> Result<(), OrtraderError> {
        *self.0.borrow_mut() = Some(state.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryTradeStore(pub Rc<RefCell<Vec<DayOutcome>>>);

impl TradeStore for MemoryTradeStore {
    fn save_outcome(&self, outcome: &DayOutcome) -> Result<(), OrtraderError> {
        let mut stored = self.0.borrow_mut();
        if stored.iter().any(|o| o.day() == outcome.day()) {
            return Err(OrtraderError::Storage {
                reason: format!("day {} is already stored", outcome.day()),
            });
        }
        stored.push(outcome.clone());
        Ok(())
    }

    fn load_outcomes(&self) -> Result<Vec<DayOutcome>, OrtraderError> {
        Ok(self.0.borrow().clone())
    }
}

#[derive(Clone, Default)]
pub struct SharedSink(pub Rc<RefCell<Vec<EngineEvent>>>);

impl SharedSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.0.borrow().iter().map(EngineEvent::name).collect()
    }
}

impl EventSink for SharedSink {
    fn publish(&mut self, event: &EngineEvent) -> Result<(), OrtraderError> {
        self.0.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// Renders bars in the default semicolon file layout.
pub fn to_csv(bars: &[Bar]) -> String {
    bars.iter()
        .map(|b| {
            format!(
                "{};{};{};{};{};{}\n",
                b.timestamp.format("%Y%m%d %H%M%S"),
                b.open,
                b.high,
                b.low,
                b.close,
                b.volume
            )
        })
        .collect()
}
