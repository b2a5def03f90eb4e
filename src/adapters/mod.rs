//! Concrete adapter implementations for ports.

pub mod clock_adapter;
pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod json_state_adapter;
pub mod log_event_sink;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
