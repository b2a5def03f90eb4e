//! Port traits for every external collaborator of the engine.

pub mod clock_port;
pub mod config_port;
pub mod data_port;
pub mod event_port;
pub mod report_port;
pub mod state_port;
pub mod store_port;
