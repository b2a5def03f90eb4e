//! Report generation port.

use crate::domain::engine::Ledger;
use crate::domain::error::OrtraderError;
use crate::domain::metrics::Metrics;
use std::path::Path;

/// Port for writing run reports.
pub trait ReportPort {
    fn write(&self, ledger: &Ledger, metrics: &Metrics, output_dir: &Path) -> Result<(), OrtraderError>;
}
