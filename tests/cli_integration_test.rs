//! CLI integration tests with real INI and bar files on disk.
//!
//! Tests cover:
//! - Backtest command: reports, date window, data override, bad input
//! - Validate command: accepted and rejected configurations
//! - Persist and summary over a SQLite trade store
//! - One live poll against a bar file with a JSON state file

mod common;

use common::*;
use ortrader::adapters::csv_report_adapter::{EQUITY_FILE, EXCLUSIONS_FILE, SUMMARY_FILE, TRADES_FILE};
use ortrader::adapters::json_state_adapter::JsonStateFile;
use ortrader::cli;
use ortrader::domain::error::OrtraderError;
use ortrader::ports::state_port::StateStore;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).unwrap();
        path
    }

    /// Four days: long, stop-out, excluded (no range), short.
    fn write_bars(&self) -> PathBuf {
        let mut bars = quiet_day(4, 21575.0);
        bars.extend(
            DayBuilder::new(5)
                .range(21600.0, 21500.0)
                .decide(21575.0)
                .bar(10, 40, 21575.0, 21576.0, 21540.0, 21545.0)
                .build(),
        );
        bars.extend(DayBuilder::new(6).decide(21575.0).flat(12, 0, 21575.0).build());
        bars.extend(quiet_day(7, 21525.0));
        self.write("nq.csv", &to_csv(&bars))
    }

    fn write_config(&self, extra: &str) -> PathBuf {
        let data = self.write_bars();
        let content = format!(
            "[market]\ninstrument = NQ\npoint_value = 80\n\n\
             [session]\ntimezone = America/New_York\n\n\
             [backtest]\ninitial_capital = 100000\ndata_path = {}\n\n{extra}",
            data.display()
        );
        self.write("ortrader.ini", &content)
    }
}

fn read_summary(dir: &Path) -> serde_json::Value {
    let text = fs::read_to_string(dir.join(SUMMARY_FILE)).unwrap();
    serde_json::from_str(&text).unwrap()
}

mod backtest_command {
    use super::*;

    #[test]
    fn writes_all_reports() {
        let ws = Workspace::new();
        let out = ws.path("reports");
        let config = ws.write_config(&format!("[report]\noutput_dir = {}\n", out.display()));

        cli::run_backtest_command(&config, None, None, false).unwrap();

        for file in [TRADES_FILE, EQUITY_FILE, EXCLUSIONS_FILE, SUMMARY_FILE] {
            assert!(out.join(file).exists(), "{file} missing");
        }
        let summary = read_summary(&out);
        assert_eq!(summary["days_evaluated"], 4);
        assert_eq!(summary["days_traded"], 3);
        assert_eq!(summary["days_excluded"], 1);
        assert_eq!(summary["stop_exits"], 1);
        assert!(summary["profit_factor"].as_f64().is_some());

        let exclusions = fs::read_to_string(out.join(EXCLUSIONS_FILE)).unwrap();
        assert!(exclusions.contains("2024-03-06"));
        assert!(exclusions.contains("no_range_data"));
        let equity_lines = fs::read_to_string(out.join(EQUITY_FILE)).unwrap().lines().count();
        assert_eq!(equity_lines, 1 + 3);
    }

    #[test]
    fn output_override_beats_config() {
        let ws = Workspace::new();
        let configured = ws.path("configured");
        let overridden = ws.path("overridden");
        let config = ws.write_config(&format!("[report]\noutput_dir = {}\n", configured.display()));

        cli::run_backtest_command(&config, None, Some(&overridden), false).unwrap();

        assert!(overridden.join(SUMMARY_FILE).exists());
        assert!(!configured.exists());
    }

    #[test]
    fn date_window_limits_days() {
        let ws = Workspace::new();
        let out = ws.path("out");
        let config = ws.write_config("");
        let content = fs::read_to_string(&config)
            .unwrap()
            .replace("[backtest]\n", "[backtest]\nstart_date = 2024-03-05\nend_date = 2024-03-06\n");
        fs::write(&config, content).unwrap();

        cli::run_backtest_command(&config, None, Some(&out), false).unwrap();

        let summary = read_summary(&out);
        assert_eq!(summary["days_evaluated"], 2);
        assert_eq!(summary["days_excluded"], 1);
    }

    #[test]
    fn data_override_replaces_configured_file() {
        let ws = Workspace::new();
        let out = ws.path("out");
        let config = ws.write_config("");
        let single = ws.write("single.csv", &to_csv(&quiet_day(4, 21550.0)));

        cli::run_backtest_command(&config, Some(&single), Some(&out), false).unwrap();

        let summary = read_summary(&out);
        assert_eq!(summary["days_evaluated"], 1);
        assert_eq!(summary["days_no_trade"], 1);
    }

    #[test]
    fn missing_data_path_is_config_error() {
        let ws = Workspace::new();
        let config = ws.write("bare.ini", "[market]\ninstrument = NQ\n");

        let err = cli::run_backtest_command(&config, None, None, false).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigMissing { ref key, .. } if key == "data_path"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn malformed_row_is_data_error() {
        let ws = Workspace::new();
        let config = ws.write_config("");
        let bad = ws.write(
            "bad.csv",
            "20240304 093000;21550;21560;21540;21555;100\n20240304 093100;abc;21560;21540;21555;100\n",
        );

        let err = cli::run_backtest_command(&config, Some(&bad), None, false).unwrap_err();
        match &err {
            OrtraderError::Data { reason, .. } => assert!(reason.contains("line 2"), "{reason}"),
            other => panic!("expected data error, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn missing_config_file_fails() {
        let ws = Workspace::new();
        let err = cli::run_backtest_command(&ws.path("absent.ini"), None, None, false).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn persist_without_store_is_config_error() {
        let ws = Workspace::new();
        let config = ws.write_config("");

        let err = cli::run_backtest_command(&config, None, None, true).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigMissing { ref key, .. } if key == "sqlite_path"));
    }
}

mod validate_command {
    use super::*;

    #[test]
    fn accepts_full_config() {
        let ws = Workspace::new();
        let config = ws.write_config(
            "[strategy]\ntop_zone_pct = 30\nbottom_zone_pct = 30\n\n\
             [fills]\nentry_fill = next_bar_open\ntie_break = target_first\n\n\
             [data_quality]\nmax_missing_or_bars = unlimited\nzero_range = no_trade\n\n\
             [data]\ndelimiter = comma\nhas_header = true\n",
        );
        cli::run_validate(&config).unwrap();
    }

    #[test]
    fn rejects_inverted_window() {
        let ws = Workspace::new();
        let config = ws.write("bad.ini", "[session]\nor_start = 10:00\nor_end = 09:30\n");

        let err = cli::run_validate(&config).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigInvalid { ref key, .. } if key == "or_end"));
    }

    #[test]
    fn rejects_overlapping_zones() {
        let ws = Workspace::new();
        let config = ws.write("bad.ini", "[strategy]\ntop_zone_pct = 60\nbottom_zone_pct = 50\n");

        let err = cli::run_validate(&config).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let ws = Workspace::new();
        let config = ws.write("bad.ini", "[session]\ntimezone = Mars/Olympus\n");

        let err = cli::run_validate(&config).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigInvalid { ref key, .. } if key == "timezone"));
    }

    #[test]
    fn rejects_unknown_fill_policy() {
        let ws = Workspace::new();
        let config = ws.write("bad.ini", "[fills]\ntie_break = coin_flip\n");

        let err = cli::run_validate(&config).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigInvalid { ref key, .. } if key == "tie_break"));
    }

    #[test]
    fn rejects_bad_delimiter() {
        let ws = Workspace::new();
        let config = ws.write("bad.ini", "[data]\ndelimiter = pipes\n");

        let err = cli::run_validate(&config).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigInvalid { ref key, .. } if key == "delimiter"));
    }
}

#[cfg(feature = "sqlite")]
mod store_commands {
    use super::*;

    fn store_config(ws: &Workspace) -> PathBuf {
        ws.write_config(&format!(
            "[storage]\nsqlite_path = {}\n",
            ws.path("trades.db").display()
        ))
    }

    #[test]
    fn persisted_backtest_feeds_summary() {
        let ws = Workspace::new();
        let config = store_config(&ws);

        cli::run_backtest_command(&config, None, None, true).unwrap();
        cli::run_backtest_command(&config, None, None, true).unwrap();

        let out = ws.path("summary");
        cli::run_summary(&config, Some(&out)).unwrap();
        let summary = read_summary(&out);
        assert_eq!(summary["days_evaluated"], 4);
        assert_eq!(summary["days_excluded"], 1);
        assert_eq!(summary["trades_lost"], 2);
    }

    #[test]
    fn summary_without_store_is_config_error() {
        let ws = Workspace::new();
        let config = ws.write_config("");

        let err = cli::run_summary(&config, None).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigMissing { ref key, .. } if key == "sqlite_path"));
    }
}

mod live_command {
    use super::*;

    #[test]
    fn single_poll_closes_past_days_and_saves_state() {
        let ws = Workspace::new();
        let feed = ws.write_bars();
        let state_path = ws.path("state").join("live.json");
        let config = ws.write_config(&format!(
            "[live]\nfeed_path = {}\npoll_seconds = 1\nstate_path = {}\n",
            feed.display(),
            state_path.display()
        ));

        cli::run_live(&config, true).unwrap();

        let state = JsonStateFile::new(&state_path).load().unwrap().unwrap();
        assert!(state.current.is_none());
        assert_eq!(state.last_closed_day, Some(date(7)));
    }

    #[test]
    fn missing_feed_file_polls_nothing() {
        let ws = Workspace::new();
        let state_path = ws.path("live.json");
        let config = ws.write_config(&format!(
            "[live]\nfeed_path = {}\nstate_path = {}\n",
            ws.path("not_yet.csv").display(),
            state_path.display()
        ));

        cli::run_live(&config, true).unwrap();

        let state = JsonStateFile::new(&state_path).load().unwrap().unwrap();
        assert_eq!(state.last_closed_day, None);
    }

    #[test]
    fn live_requires_feed_path() {
        let ws = Workspace::new();
        let config = ws.write_config("[live]\npoll_seconds = 5\n");

        let err = cli::run_live(&config, true).unwrap_err();
        assert!(matches!(err, OrtraderError::ConfigMissing { ref key, .. } if key == "feed_path"));
    }
}
