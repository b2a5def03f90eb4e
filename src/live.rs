//! Live polling runner.
//!
//! Each poll feeds new bars to the shared engine, evaluates the clock, stores
//! finished days and persists the engine state. On start the runner reloads
//! both stores and evaluates the clock at once, so a missed hard exit is
//! flagged immediately.

use crate::domain::config::EngineConfig;
use crate::domain::config_validation::parse_or;
use crate::domain::engine::{Engine, Ledger};
use crate::domain::error::OrtraderError;
use crate::domain::outcome::DayOutcome;
use crate::ports::clock_port::Clock;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::BarFeed;
use crate::ports::event_port::EventSink;
use crate::ports::state_port::StateStore;
use crate::ports::store_port::TradeStore;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_STATE_PATH: &str = "ortrader-state.json";

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub feed_path: PathBuf,
    pub poll_seconds: u64,
    pub state_path: PathBuf,
}

impl LiveSettings {
    /// Reads the `[live]` section. `feed_path` is required.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, OrtraderError> {
        let feed_path = config
            .get_string("live", "feed_path")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| OrtraderError::ConfigMissing {
                section: "live".into(),
                key: "feed_path".into(),
            })?;
        let poll_seconds: u64 = parse_or(config, "live", "poll_seconds", 30)?;
        if poll_seconds == 0 {
            return Err(OrtraderError::invalid("live", "poll_seconds", "must be positive"));
        }
        let state_path = config
            .get_string("live", "state_path")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string());
        Ok(Self {
            feed_path: PathBuf::from(feed_path.trim()),
            poll_seconds,
            state_path: PathBuf::from(state_path.trim()),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }
}

/// External collaborators of a live run.
pub struct LivePorts {
    pub feed: Box<dyn BarFeed>,
    pub clock: Box<dyn Clock>,
    pub state: Box<dyn StateStore>,
    pub trades: Option<Box<dyn TradeStore>>,
    pub sink: Box<dyn EventSink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub bars: usize,
    pub days_closed: usize,
}

pub struct LiveRunner {
    engine: Engine,
    ports: LivePorts,
}

impl LiveRunner {
    pub fn resume(config: EngineConfig, mut ports: LivePorts) -> Result<Self, OrtraderError> {
        let state = ports.state.load()?.unwrap_or_default();
        let outcomes = match &ports.trades {
            Some(store) => store.load_outcomes()?,
            None => Vec::new(),
        };
        let stored_days = outcomes.len();
        let ledger = Ledger::from_outcomes(config.initial_capital, outcomes)?;
        let engine = Engine::resume(config, state, ledger)?;

        if let Some(watermark) = engine.state().resume_point() {
            ports.feed.resume_after(watermark);
        }
        info!(
            stored_days,
            open_day = ?engine.state().current.as_ref().map(|ctx| ctx.day()),
            last_closed = ?engine.state().last_closed_day,
            "live runner resumed"
        );

        let mut runner = Self { engine, ports };
        let now = runner.ports.clock.now();
        let closed = runner.engine.on_clock(now, runner.ports.sink.as_mut())?;
        runner.store(&closed)?;
        runner.ports.state.save(runner.engine.state())?;
        Ok(runner)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn poll_once(&mut self) -> Result<PollSummary, OrtraderError> {
        let bars = self.ports.feed.poll()?;
        let mut closed = Vec::new();
        for bar in &bars {
            closed.extend(self.engine.on_bar(bar, self.ports.sink.as_mut())?);
        }
        let now = self.ports.clock.now();
        closed.extend(self.engine.on_clock(now, self.ports.sink.as_mut())?);

        self.store(&closed)?;
        self.ports.state.save(self.engine.state())?;

        let summary = PollSummary {
            bars: bars.len(),
            days_closed: closed.len(),
        };
        debug!(bars = summary.bars, days_closed = summary.days_closed, %now, "poll complete");
        Ok(summary)
    }

    /// Polls until `max_polls` is reached, or forever when `None`. A bad feed
    /// read is retried on the next poll; any other error stops the run.
    pub fn run(&mut self, interval: Duration, max_polls: Option<usize>) -> Result<(), OrtraderError> {
        let mut polls = 0;
        loop {
            match self.poll_once() {
                Ok(_) => {}
                Err(OrtraderError::Data { source_name, reason }) => {
                    warn!(source = %source_name, %reason, "feed read failed, retrying next poll");
                }
                Err(e) => return Err(e),
            }
            polls += 1;
            if max_polls.is_some_and(|max| polls >= max) {
                return Ok(());
            }
            thread::sleep(interval);
        }
    }

    fn store(&self, outcomes: &[DayOutcome]) -> Result<(), OrtraderError> {
        for outcome in outcomes {
            if let Some(store) = &self.ports.trades {
                store.save_outcome(outcome)?;
            }
            info!(day = %outcome.day(), "day closed");
        }
        Ok(())
    }
}
