//! CSV report writer implementing [`ReportPort`].
//!
//! Writes `trades.csv`, `equity.csv`, `exclusions.csv` and `summary.json`
//! into the output directory.

use crate::domain::engine::Ledger;
use crate::domain::equity::EquityPoint;
use crate::domain::error::OrtraderError;
use crate::domain::metrics::Metrics;
use crate::domain::outcome::{ExclusionEntry, TradeRecord};
use crate::ports::report_port::ReportPort;
use chrono::NaiveDateTime;
use std::fs;
use std::path::Path;
use tracing::info;

pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";
pub const EXCLUSIONS_FILE: &str = "exclusions.csv";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, ledger: &Ledger, metrics: &Metrics, output_dir: &Path) -> Result<(), OrtraderError> {
        fs::create_dir_all(output_dir)?;
        write_trades(&output_dir.join(TRADES_FILE), ledger.log().records())?;
        write_equity(&output_dir.join(EQUITY_FILE), ledger.equity().points())?;
        write_exclusions(&output_dir.join(EXCLUSIONS_FILE), ledger.log().exclusions())?;

        let summary = serde_json::to_string_pretty(metrics).map_err(|e| report_error(output_dir, e))?;
        fs::write(output_dir.join(SUMMARY_FILE), summary)?;

        info!(dir = %output_dir.display(), "reports written");
        Ok(())
    }
}

fn write_trades(path: &Path, records: &[TradeRecord]) -> Result<(), OrtraderError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| report_error(path, e))?;
    wtr.write_record([
        "day",
        "direction",
        "no_trade_reason",
        "or_high",
        "or_low",
        "reference_price",
        "position_pct",
        "entry_price",
        "entry_time",
        "stop_price",
        "target_price",
        "exit_price",
        "exit_time",
        "exit_reason",
        "points_gained",
        "pnl_usd",
        "mfe_points",
        "mae_points",
    ])
    .map_err(|e| report_error(path, e))?;

    for r in records {
        wtr.write_record([
            r.day.to_string(),
            r.direction.to_string(),
            opt(r.no_trade_reason),
            r.or_high.to_string(),
            r.or_low.to_string(),
            opt(r.reference_price),
            opt(r.position_pct),
            opt(r.entry_price),
            opt_time(r.entry_time),
            opt(r.stop_price),
            opt(r.target_price),
            opt(r.exit_price),
            opt_time(r.exit_time),
            opt(r.exit_reason),
            r.points_gained.to_string(),
            r.pnl_usd.to_string(),
            opt(r.mfe_points),
            opt(r.mae_points),
        ])
        .map_err(|e| report_error(path, e))?;
    }

    wtr.flush()?;
    Ok(())
}

fn write_equity(path: &Path, points: &[EquityPoint]) -> Result<(), OrtraderError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| report_error(path, e))?;
    wtr.write_record(["day", "pnl_usd", "equity_after", "peak", "drawdown_from_peak", "drawdown_pct"])
        .map_err(|e| report_error(path, e))?;

    for p in points {
        wtr.write_record([
            p.day.to_string(),
            p.pnl_usd.to_string(),
            p.equity_after.to_string(),
            p.peak.to_string(),
            p.drawdown_from_peak.to_string(),
            p.drawdown_pct.to_string(),
        ])
        .map_err(|e| report_error(path, e))?;
    }

    wtr.flush()?;
    Ok(())
}

fn write_exclusions(path: &Path, entries: &[ExclusionEntry]) -> Result<(), OrtraderError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| report_error(path, e))?;
    wtr.write_record(["day", "reason_code", "detail"])
        .map_err(|e| report_error(path, e))?;

    for entry in entries {
        wtr.write_record([entry.day.to_string(), entry.reason_code().to_string(), entry.detail()])
            .map_err(|e| report_error(path, e))?;
    }

    wtr.flush()?;
    Ok(())
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_time(value: Option<NaiveDateTime>) -> String {
    value.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default()
}

fn report_error(path: &Path, e: impl std::fmt::Display) -> OrtraderError {
    OrtraderError::Io(std::io::Error::other(format!("{}: {e}", path.display())))
}
