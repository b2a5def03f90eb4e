//! ortrader: opening-range intraday trading engine.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. Backtest and [`live`] mode drive
//! the same [`domain::engine`] fold.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod live;
pub mod cli;
