//! Core domain types and logic. No I/O happens here.

pub mod bar;
pub mod config;
pub mod config_validation;
pub mod session;
pub mod opening_range;
pub mod signal;
pub mod volatility;
pub mod position;
pub mod outcome;
pub mod equity;
pub mod event;
pub mod day;
pub mod engine;
pub mod metrics;
pub mod error;
