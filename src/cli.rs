//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    backtest_config, date_range, execution_config, required_string, validate_backtest_config,
};
use crate::domain::error::BarstepError;
use crate::domain::metrics::ReturnMetrics;
use crate::domain::ohlcv::AlignedBars;
use crate::domain::time_axis::TimeAxis;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::strategies::pair::{self, PairParams};

#[derive(Parser, Debug)]
#[command(name = "barstep", about = "Event-stepped multi-instrument backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pair strategy described by a config file
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Validate config and data location without running
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a config file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the configured data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest { config, dry_run } => run_backtest(&config, dry_run),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BarstepError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Everything the pair backtest needs from the config file, validated.
#[derive(Debug)]
pub struct BacktestPlan {
    pub params: PairParams,
    pub data_dir: PathBuf,
}

pub fn plan_backtest(config: &dyn ConfigPort) -> Result<BacktestPlan, BarstepError> {
    validate_backtest_config(config)?;
    let params = PairParams::from_config(config)?;
    let data_dir = PathBuf::from(required_string(config, "data", "dir")?);
    Ok(BacktestPlan { params, data_dir })
}

fn run_validate(config_path: &Path) -> Result<(), BarstepError> {
    let adapter = load_config(config_path)?;
    let plan = plan_backtest(&adapter)?;
    println!(
        "Config OK: pair {}/{} window {}, data in {}",
        plan.params.left,
        plan.params.right,
        plan.params.window,
        plan.data_dir.display()
    );
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), BarstepError> {
    let adapter = load_config(config_path)?;
    let dir = required_string(&adapter, "data", "dir")?;
    for symbol in CsvAdapter::new(PathBuf::from(dir)).list_symbols()? {
        println!("{symbol}");
    }
    Ok(())
}

fn run_backtest(config_path: &Path, dry_run: bool) -> Result<(), BarstepError> {
    let adapter = load_config(config_path)?;
    let plan = plan_backtest(&adapter)?;
    if dry_run {
        if !plan.data_dir.is_dir() {
            return Err(BarstepError::Data {
                reason: format!("data directory {} does not exist", plan.data_dir.display()),
            });
        }
        println!(
            "Dry run OK: would backtest {}/{} from {}",
            plan.params.left,
            plan.params.right,
            plan.data_dir.display()
        );
        return Ok(());
    }

    let data = CsvAdapter::new(plan.data_dir.clone());
    let metrics = run_pair_backtest(&adapter, &data, plan.params)?;
    print_metrics(&metrics);
    Ok(())
}

/// Load both legs, run the pair strategy and evaluate it.
pub fn run_pair_backtest(
    config: &dyn ConfigPort,
    data: &dyn DataPort,
    params: PairParams,
) -> Result<ReturnMetrics, BarstepError> {
    let bt_config = backtest_config(config)?;
    let execution = execution_config(config)?;
    let (start, end) = date_range(config)?;

    let left_bars = data.fetch_bars(&params.left, start, end)?;
    let right_bars = data.fetch_bars(&params.right, start, end)?;
    eprintln!(
        "Loaded {} bars for {}, {} bars for {}",
        left_bars.len(),
        params.left,
        right_bars.len(),
        params.right
    );

    let axis = TimeAxis::union(&[left_bars.as_slice(), right_bars.as_slice()])?;
    let left = AlignedBars::align(&axis, &left_bars);
    let right = AlignedBars::align(&axis, &right_bars);

    let mut strategy = pair::build(params, axis, &left, &right, bt_config, execution)?;
    strategy.run()?;
    strategy.evaluate_returns()
}

fn print_metrics(m: &ReturnMetrics) {
    println!("start equity   {:>14.2}", m.start_equity);
    println!("end equity     {:>14.2}", m.end_equity);
    println!("total return   {:>14.6}", m.total_return);
    println!("gmean          {:>14.6}", m.gmean);
    println!("amean          {:>14.6}", m.amean);
    println!("std            {:>14.6}", m.std);
    println!("sharpe         {:>14.6}", m.sharpe);
    println!("sortino        {:>14.6}", m.sortino);
    println!("mdd pct        {:>14.6}", m.mdd_pct);
    println!("mdd            {:>14.2}", m.mdd);
    println!("periods        {:>14}", m.periods);
}
