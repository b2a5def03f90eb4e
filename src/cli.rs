//! CLI definition and dispatch.

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::clock_adapter::SystemClock;
use crate::adapters::csv_adapter::{CsvBarAdapter, CsvFormat, CsvTailFeed};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_state_adapter::JsonStateFile;
use crate::adapters::log_event_sink::LogEventSink;
use crate::domain::config::EngineConfig;
use crate::domain::config_validation::{build_backtest_settings, build_engine_config, BacktestSettings};
use crate::domain::engine::{run_backtest, BacktestResult, Ledger};
use crate::domain::error::OrtraderError;
use crate::domain::metrics::Metrics;
use crate::live::{LivePorts, LiveRunner, LiveSettings};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::BarSource;
use crate::ports::event_port::EventSink;
use crate::ports::report_port::ReportPort;
use crate::ports::store_port::TradeStore;

#[derive(Parser, Debug)]
#[command(name = "ortrader", about = "Opening-range intraday trading engine")]
pub struct Cli {
    /// Raise log verbosity to debug (ignored when RUST_LOG is set)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a historical bar file
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Bar file, overrides [backtest] data_path
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Report directory, overrides [report] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Append finished days to the configured trade store
        #[arg(long)]
        persist: bool,
    },
    /// Load and validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the live polling loop
    Live {
        #[arg(short, long)]
        config: PathBuf,
        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },
    /// Performance summary over the stored trade log
    Summary {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbose: u8) {
    let default = if verbose > 0 { "ortrader=debug" } else { "ortrader=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            data,
            output,
            persist,
        } => run_backtest_command(&config, data.as_deref(), output.as_deref(), persist),
        Command::Validate { config } => run_validate(&config),
        Command::Live { config, once } => run_live(&config, once),
        Command::Summary { config, output } => run_summary(&config, output.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, OrtraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

pub fn run_backtest_command(
    config_path: &Path,
    data_override: Option<&Path>,
    output_override: Option<&Path>,
    persist: bool,
) -> Result<(), OrtraderError> {
    // Stage 1: configuration
    let adapter = load_config(config_path)?;
    let engine_config = build_engine_config(&adapter)?;
    let settings = build_backtest_settings(&adapter)?;

    // Stage 2: bar file
    let data_path = data_override
        .map(Path::to_path_buf)
        .or_else(|| settings.data_path.clone())
        .ok_or_else(|| OrtraderError::ConfigMissing {
            section: "backtest".into(),
            key: "data_path".into(),
        })?;
    let format = CsvFormat::from_config(&adapter, engine_config.session.timezone)?;
    let source = CsvBarAdapter::new(&data_path, format);
    eprintln!("Loading bars from {}", data_path.display());

    // Stage 3: replay
    let mut sink = LogEventSink::new();
    let result = run_backtest_pipeline(&source, &engine_config, &settings, &mut sink)?;
    eprintln!(
        "  Processed {} bars ({} rejected)",
        result.bars_processed, result.bars_rejected
    );

    // Stage 4: summary and reports
    let metrics = Metrics::compute(&result.ledger, settings.risk_free_rate);
    print_summary(&engine_config, &metrics);

    if let Some(dir) = output_dir(&adapter, output_override) {
        CsvReportAdapter::new().write(&result.ledger, &metrics, &dir)?;
        eprintln!("\nReports written to: {}", dir.display());
    }

    // Stage 5: optional persistence
    if persist {
        let store = open_store(&adapter)?.ok_or_else(|| OrtraderError::ConfigMissing {
            section: "storage".into(),
            key: "sqlite_path".into(),
        })?;
        let saved = persist_ledger(store.as_ref(), &result.ledger)?;
        eprintln!("Stored {saved} new days");
    }
    Ok(())
}

/// Loads bars, applies the configured date window and replays them.
pub fn run_backtest_pipeline(
    source: &dyn BarSource,
    config: &EngineConfig,
    settings: &BacktestSettings,
    sink: &mut dyn EventSink,
) -> Result<BacktestResult, OrtraderError> {
    let bars = source.load_bars()?;
    let total = bars.len();
    let bars: Vec<_> = bars.into_iter().filter(|b| settings.includes(b.day())).collect();
    if bars.len() < total {
        eprintln!("  {} of {} bars inside the configured date window", bars.len(), total);
    }
    run_backtest(bars, config, sink)
}

/// Saves every day of `ledger` the store does not already hold.
pub fn persist_ledger(store: &dyn TradeStore, ledger: &Ledger) -> Result<usize, OrtraderError> {
    let stored_last = store.load_outcomes()?.last().map(|o| o.day());
    let mut saved = 0;
    for outcome in ledger.log().outcomes() {
        if stored_last.is_some_and(|last| outcome.day() <= last) {
            continue;
        }
        store.save_outcome(&outcome)?;
        saved += 1;
    }
    Ok(saved)
}

pub fn run_validate(config_path: &Path) -> Result<(), OrtraderError> {
    let adapter = load_config(config_path)?;
    let config = build_engine_config(&adapter)?;
    let settings = build_backtest_settings(&adapter)?;
    CsvFormat::from_config(&adapter, config.session.timezone)?;
    eprintln!("Config validated successfully");

    let s = &config.session;
    eprintln!("\nSession:");
    eprintln!("  instrument:    {}", s.instrument);
    eprintln!("  timezone:      {}", s.timezone);
    eprintln!(
        "  opening range: {} - {} ({} bars)",
        s.or_start.format("%H:%M"),
        s.or_end.format("%H:%M"),
        s.expected_or_bars()
    );
    eprintln!("  entry:         {}", s.entry_time.format("%H:%M"));
    eprintln!("  hard exit:     {}", s.hard_exit_time.format("%H:%M"));
    eprintln!("  session end:   {}", s.session_end.format("%H:%M"));
    eprintln!("  weekends:      {}", if s.skip_weekends { "skipped" } else { "traded" });

    eprintln!("\nStrategy:");
    eprintln!("  zones:         top {}% / bottom {}%", s.top_zone_pct, s.bottom_zone_pct);
    eprintln!("  stop/target:   {} / {} points", s.stop_points, s.target_points);
    eprintln!(
        "  point value:   ${} x {} = ${} per point",
        s.point_value,
        s.position_size,
        s.dollars_per_point()
    );
    if let Some(tick) = s.tick_size {
        eprintln!("  tick size:     {tick}");
    }

    let f = &config.fills;
    eprintln!("\nFills:");
    eprintln!("  entry:         {:?} on {}", f.entry, f.decision_field);
    eprintln!("  hard exit:     {}", f.hard_exit_field);
    eprintln!("  tie break:     {:?}", f.tie_break);
    eprintln!("  stop fill:     {:?}", f.stop_fill);

    let q = &config.quality;
    eprintln!("\nData quality:");
    match q.max_missing_or_bars {
        Some(n) => eprintln!("  max missing OR bars: {n}"),
        None => eprintln!("  max missing OR bars: unlimited"),
    }
    eprintln!("  zero range:    {:?}", q.zero_range);

    eprintln!("\nBacktest:");
    eprintln!("  initial capital: ${:.2}", config.initial_capital);
    if let Some(path) = &settings.data_path {
        eprintln!("  data:            {}", path.display());
    }
    if let (Some(start), Some(end)) = (settings.start_date, settings.end_date) {
        eprintln!("  window:          {start} .. {end}");
    }
    Ok(())
}

pub fn run_live(config_path: &Path, once: bool) -> Result<(), OrtraderError> {
    let adapter = load_config(config_path)?;
    let config = build_engine_config(&adapter)?;
    let settings = LiveSettings::from_config(&adapter)?;
    let format = CsvFormat::from_config(&adapter, config.session.timezone)?;

    let ports = LivePorts {
        feed: Box::new(CsvTailFeed::new(&settings.feed_path, format)),
        clock: Box::new(SystemClock::new(config.session.timezone)),
        state: Box::new(JsonStateFile::new(&settings.state_path)),
        trades: open_store(&adapter)?,
        sink: Box::new(LogEventSink::new()),
    };
    eprintln!(
        "Live: {} on {} (poll every {}s, state {})",
        config.session.instrument,
        settings.feed_path.display(),
        settings.poll_seconds,
        settings.state_path.display()
    );

    let mut runner = LiveRunner::resume(config, ports)?;
    if once {
        let summary = runner.poll_once()?;
        eprintln!("  {} bars, {} days closed", summary.bars, summary.days_closed);
        Ok(())
    } else {
        runner.run(settings.poll_interval(), None)
    }
}

pub fn run_summary(config_path: &Path, output_override: Option<&Path>) -> Result<(), OrtraderError> {
    let adapter = load_config(config_path)?;
    let config = build_engine_config(&adapter)?;
    let settings = build_backtest_settings(&adapter)?;
    let store = open_store(&adapter)?.ok_or_else(|| OrtraderError::ConfigMissing {
        section: "storage".into(),
        key: "sqlite_path".into(),
    })?;

    let ledger = Ledger::from_outcomes(config.initial_capital, store.load_outcomes()?)?;
    let metrics = Metrics::compute(&ledger, settings.risk_free_rate);
    print_summary(&config, &metrics);

    if let Some(dir) = output_dir(&adapter, output_override) {
        CsvReportAdapter::new().write(&ledger, &metrics, &dir)?;
        eprintln!("\nReports written to: {}", dir.display());
    }
    Ok(())
}

fn output_dir(adapter: &dyn ConfigPort, output_override: Option<&Path>) -> Option<PathBuf> {
    output_override.map(Path::to_path_buf).or_else(|| {
        adapter
            .get_string("report", "output_dir")
            .filter(|s| !s.trim().is_empty())
            .map(|s| PathBuf::from(s.trim()))
    })
}

/// Opens the trade store when `[storage] sqlite_path` is set.
#[cfg(feature = "sqlite")]
pub fn open_store(adapter: &dyn ConfigPort) -> Result<Option<Box<dyn TradeStore>>, OrtraderError> {
    use crate::adapters::sqlite_adapter::SqliteTradeStore;

    if adapter
        .get_string("storage", "sqlite_path")
        .is_none_or(|s| s.trim().is_empty())
    {
        return Ok(None);
    }
    let store = SqliteTradeStore::from_config(adapter)?;
    store.initialize_schema()?;
    Ok(Some(Box::new(store)))
}

#[cfg(not(feature = "sqlite"))]
pub fn open_store(adapter: &dyn ConfigPort) -> Result<Option<Box<dyn TradeStore>>, OrtraderError> {
    match adapter.get_string("storage", "sqlite_path") {
        Some(s) if !s.trim().is_empty() => Err(OrtraderError::Storage {
            reason: "sqlite feature is required for [storage] sqlite_path".into(),
        }),
        _ => Ok(None),
    }
}

pub fn print_summary(config: &EngineConfig, m: &Metrics) {
    eprintln!("\n=== {} Opening Range Results ===", config.session.instrument);
    eprintln!(
        "Days:             {} evaluated, {} traded, {} no trade, {} excluded",
        m.days_evaluated, m.days_traded, m.days_no_trade, m.days_excluded
    );
    eprintln!(
        "Trades:           {} won, {} lost, {} breakeven",
        m.trades_won, m.trades_lost, m.trades_breakeven
    );
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Net P&L:          ${:.2} ({:.2} points)", m.net_pnl, m.net_points);
    eprintln!("Avg Win / Loss:   ${:.2} / ${:.2}", m.avg_win, m.avg_loss);
    eprintln!("Expectancy:       ${:.2} per trade", m.expectancy);
    match m.profit_factor {
        Some(pf) => eprintln!("Profit Factor:    {pf:.2}"),
        None => eprintln!("Profit Factor:    n/a"),
    }
    eprintln!("Largest Win/Loss: ${:.2} / ${:.2}", m.largest_win, m.largest_loss);
    eprintln!(
        "Exits:            {} stop, {} target, {} hard exit",
        m.stop_exits, m.target_exits, m.hard_exits
    );
    eprintln!("Avg MFE / MAE:    {:.2} / {:.2} points", m.avg_mfe_points, m.avg_mae_points);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!(
        "Max Drawdown:     ${:.2} ({:.1}%, {} days)",
        m.max_drawdown,
        m.max_drawdown_pct * 100.0,
        m.max_drawdown_duration
    );
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
}
