//! AlgoTrader CLI: download, backtest, resample, sync and live commands.
//!
//! Commands:
//! - `download`: fetch bars from Dukascopy and save to Parquet or Postgres
//! - `backtest`: replay a strategy over stored bars and report metrics
//! - `resample`: aggregate a stored Parquet file to a coarser timeframe
//! - `sync`: copy terminal bars into the bar database
//! - `live`: evaluate the strategy once and send an order to a terminal

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use algotrader_core::data::download::{download, DownloadOptions, DownloadOutcome, SyncRange};
use algotrader_core::data::normalize::normalize;
use algotrader_core::data::parquet_store::{read_frame, write_frame};
use algotrader_core::data::{
    frame_to_series, resample_frame, sync_terminal, BarStore, DukascopyProvider, FetchRequest,
    OfferSide, PostgresStore, Purpose, SaveMode, Timeframe,
};
use algotrader_core::domain::BarSeries;
use algotrader_core::engine::SettlementPolicy;
use algotrader_core::live::{run_live_once, LiveDecision, PaperTerminal};
use algotrader_runner::data_loader::LoadSource;
use algotrader_runner::export::{export_json, save_artifacts};
use algotrader_runner::runner::run_single_backtest;
use algotrader_runner::{init_tracing, AppConfig, BacktestResult, LogFormat, StrategyConfig};

#[derive(Parser)]
#[command(
    name = "algotrader",
    about = "AlgoTrader CLI: bar data, backtests and live signals"
)]
struct Cli {
    /// TOML config file. Every section is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter when ALGOTRADER_LOG is unset (e.g. info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output: text or json.
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download bars from Dukascopy.
    Download {
        #[arg(long, default_value = "XAUUSD")]
        symbol: String,

        /// Bar timeframe (e.g. 5min, 1h, 1d).
        #[arg(long, default_value = "5min")]
        timeframe: String,

        /// bid or ask.
        #[arg(long, default_value = "bid")]
        offer_side: String,

        /// First server-local date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        from: String,

        /// Last server-local date (YYYY-MM-DD), exclusive.
        #[arg(long)]
        to: String,

        /// parquet, postgres or dataframe.
        #[arg(long, default_value = "parquet")]
        save: String,

        /// Table name (postgres) or file stem (parquet).
        #[arg(long)]
        table: Option<String>,

        /// Output directory for parquet files. Overrides the config.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Replay a strategy over stored bars.
    Backtest {
        /// Parquet file with bars.
        #[arg(long, conflicts_with = "table")]
        data: Option<PathBuf>,

        /// Postgres table with bars.
        #[arg(long)]
        table: Option<String>,

        #[arg(long, default_value = "XAUUSD")]
        symbol: String,

        /// Resample before replaying.
        #[arg(long)]
        timeframe: Option<String>,

        /// sma-cross or buy-and-hold.
        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        fast: Option<usize>,

        #[arg(long)]
        slow: Option<usize>,

        /// Units per entry, or a fraction of equity when below 1.
        #[arg(long)]
        size: Option<f64>,

        #[arg(long)]
        cash: Option<f64>,

        #[arg(long)]
        commission: Option<f64>,

        #[arg(long, default_value_t = false)]
        trade_on_close: bool,

        /// Keep positions open after the last bar instead of closing them.
        #[arg(long, default_value_t = false)]
        leave_open: bool,

        /// Print the full result as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Save manifest, trades, equity and report under this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Resample a Parquet file to a coarser timeframe.
    Resample {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        timeframe: String,

        /// Timeframe the input was recorded at. Without it the smallest gap
        /// between bars is taken as the input granularity.
        #[arg(long)]
        source_timeframe: Option<String>,
    },
    /// Copy terminal bars into `{symbol}.ohlc_{tf}` in the bar database.
    Sync {
        /// Serve terminal bars from this Parquet file.
        #[arg(long)]
        paper: PathBuf,

        #[arg(long, default_value = "XAUUSD")]
        symbol: String,

        #[arg(long, default_value = "M5")]
        timeframe: String,

        /// Explicit range start (RFC 3339). Without it the sync is incremental.
        #[arg(long, requires = "to")]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// Bars to take when the table is empty.
        #[arg(long, default_value_t = 1000)]
        count: usize,
    },
    /// Evaluate the strategy on the latest bars and send one order.
    Live {
        /// Serve terminal bars from this Parquet file and record orders in memory.
        #[arg(long)]
        paper: PathBuf,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long)]
        lot: Option<f64>,

        #[arg(long)]
        timeframe: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.parse::<LogFormat>()?;
    }
    init_tracing(&config.logging);
    tracing::debug!(config = ?cli.config, config_id = %config.run_id(), "configuration loaded");

    match cli.command {
        Commands::Download {
            symbol,
            timeframe,
            offer_side,
            from,
            to,
            save,
            table,
            data_dir,
        } => {
            if let Some(dir) = data_dir {
                config.data.data_dir = dir;
            }
            let request = FetchRequest {
                symbol,
                timeframe: timeframe.parse()?,
                offer_side: offer_side.parse::<OfferSide>()?,
                start: parse_date(&from)?,
                end: parse_date(&to)?,
            };
            run_download(&config, &request, save.parse()?, table)
        }
        Commands::Backtest {
            data,
            table,
            symbol,
            timeframe,
            strategy,
            fast,
            slow,
            size,
            cash,
            commission,
            trade_on_close,
            leave_open,
            json,
            output_dir,
        } => {
            let source = match (data, table) {
                (Some(path), None) => LoadSource::Parquet(path),
                (None, Some(table)) => LoadSource::Postgres {
                    config: config.database.clone(),
                    table,
                },
                _ => bail!("one of --data or --table is required"),
            };
            if let Some(tf) = timeframe {
                config.backtest.timeframe = Some(tf.parse()?);
            }
            if let Some(cash) = cash {
                config.backtest.cash = cash;
            }
            if let Some(commission) = commission {
                config.backtest.commission = commission;
            }
            config.backtest.trade_on_close |= trade_on_close;
            if leave_open {
                config.backtest.settlement = SettlementPolicy::LeaveOpen;
            }
            config.strategy =
                strategy_override(&config.strategy, strategy.as_deref(), fast, slow, size)?;
            config.validate()?;

            tracing::info!(
                source = %source.describe(),
                %symbol,
                strategy = config.strategy.name(),
                "running backtest"
            );
            let result = run_single_backtest(&config, &source, &symbol)?;
            if json {
                println!("{}", export_json(&result)?);
            } else {
                print_summary(&result);
            }
            if let Some(dir) = output_dir {
                let run_dir = save_artifacts(&result, &dir)?;
                println!("Artifacts saved to: {}", run_dir.display());
            }
            Ok(())
        }
        Commands::Resample {
            input,
            output,
            timeframe,
            source_timeframe,
        } => {
            let source: Option<Timeframe> = source_timeframe.map(|tf| tf.parse()).transpose()?;
            run_resample(&input, &output, source, timeframe.parse()?)
        }
        Commands::Sync {
            paper,
            symbol,
            timeframe,
            from,
            to,
            count,
        } => {
            let range = match (from, to) {
                (Some(from), Some(to)) => SyncRange::Explicit {
                    from: parse_instant(&from)?,
                    to: parse_instant(&to)?,
                },
                _ => SyncRange::Incremental { n: count },
            };
            let terminal = PaperTerminal::new(load_parquet_series(&paper, &symbol)?);
            let mut store = PostgresStore::connect(&config.database)?;
            let rows = sync_terminal(&terminal, &mut store, &symbol, timeframe.parse()?, range)?;
            println!("Synced {rows} bars for {symbol}");
            Ok(())
        }
        Commands::Live {
            paper,
            symbol,
            lot,
            timeframe,
        } => {
            if let Some(symbol) = symbol {
                config.live.symbol = symbol;
            }
            if let Some(lot) = lot {
                config.live.lot = lot;
            }
            if let Some(tf) = timeframe {
                config.live.timeframe = tf.parse()?;
            }
            run_live(&config, &paper)
        }
    }
}

fn run_download(
    config: &AppConfig,
    request: &FetchRequest,
    save_mode: SaveMode,
    table: Option<String>,
) -> Result<()> {
    if request.end <= request.start {
        bail!("--to must be after --from");
    }
    let provider = DukascopyProvider::new(config.data.server_utc_offset_hours)?;
    let options = DownloadOptions {
        save_mode,
        table,
        data_dir: config.data.data_dir.clone(),
    };

    let mut store = match save_mode {
        SaveMode::Postgres => Some(PostgresStore::connect(&config.database)?),
        _ => None,
    };
    let store_ref = store.as_mut().map(|s| s as &mut dyn BarStore);

    match download(&provider, request, &options, store_ref)? {
        DownloadOutcome::Parquet { path, rows } => {
            println!("Saved {rows} bars to {}", path.display());
        }
        DownloadOutcome::Postgres { table, rows } => {
            println!("Upserted {rows} bars into {table}");
        }
        DownloadOutcome::Frame(df) => println!("{df}"),
    }
    Ok(())
}

fn run_resample(
    input: &Path,
    output: &Path,
    source: Option<Timeframe>,
    timeframe: Timeframe,
) -> Result<()> {
    let raw = read_frame(input)?;
    let canonical = normalize(&raw, Purpose::Backtest, None)?;
    let mut resampled = resample_frame(&canonical, source, timeframe)?;
    write_frame(&mut resampled, output)?;
    println!(
        "Resampled {} rows to {} {timeframe} bars: {}",
        raw.height(),
        resampled.height(),
        output.display()
    );
    Ok(())
}

fn run_live(config: &AppConfig, paper: &Path) -> Result<()> {
    let series = load_parquet_series(paper, &config.live.symbol)?;
    let mut terminal = PaperTerminal::new(series);
    let mut strategy = config.strategy.build()?;

    match run_live_once(&mut terminal, &mut strategy, &config.live)? {
        LiveDecision::NoAction => println!("No action for {}", config.live.symbol),
        LiveDecision::Sent { request, outcome } => println!(
            "{:?} {} {} lots at {:.5} (ticket {}, magic {}, \"{}\")",
            request.direction,
            request.symbol,
            outcome.volume,
            outcome.price,
            outcome.ticket,
            request.magic,
            request.comment
        ),
    }
    Ok(())
}

fn strategy_override(
    current: &StrategyConfig,
    name: Option<&str>,
    fast: Option<usize>,
    slow: Option<usize>,
    size: Option<f64>,
) -> Result<StrategyConfig> {
    let base = match name {
        None => current.clone(),
        Some("sma-cross" | "sma_cross") => match current {
            StrategyConfig::SmaCross { .. } => current.clone(),
            _ => StrategyConfig::default(),
        },
        Some("buy-and-hold" | "buy_and_hold") => StrategyConfig::BuyAndHold { size: None },
        Some(other) => bail!("unknown strategy '{other}'. Valid: sma-cross, buy-and-hold"),
    };
    Ok(match base {
        StrategyConfig::SmaCross {
            n_fast,
            n_slow,
            size: current_size,
        } => StrategyConfig::SmaCross {
            n_fast: fast.unwrap_or(n_fast),
            n_slow: slow.unwrap_or(n_slow),
            size: size.or(current_size),
        },
        StrategyConfig::BuyAndHold { size: current_size } => {
            if fast.is_some() || slow.is_some() {
                bail!("--fast/--slow only apply to sma-cross");
            }
            StrategyConfig::BuyAndHold {
                size: size.or(current_size),
            }
        }
    })
}

fn load_parquet_series(path: &Path, symbol: &str) -> Result<BarSeries> {
    let raw = read_frame(path)?;
    frame_to_series(&raw, symbol).with_context(|| format!("reading bars from {}", path.display()))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    Ok(parse_date(s)?.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {}", result.symbol);
    println!("Strategy:       {}", result.strategy.name());
    println!(
        "Period:         {} to {}",
        result.start.as_deref().unwrap_or("-"),
        result.end.as_deref().unwrap_or("-")
    );
    println!("Bars:           {}", result.bar_count);
    println!("Trades:         {}", m.trade_count);
    let short_id = &result.run_id[..12.min(result.run_id.len())];
    println!("Run Id:         {short_id}");
    println!();
    println!("--- Performance ---");
    println!("Final Equity:   {:.2}", m.final_equity);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Exposure:       {:.1}%", m.exposure * 100.0);
    println!("Avg Bars Held:  {:.1}", m.avg_bars_held);
    if !result.final_position.is_flat() {
        println!();
        println!(
            "Open position:  {} units @ {:.5} (unrealized {:.2})",
            result.final_position.size,
            result.final_position.entry_price,
            result.final_position.unrealized_pl
        );
    }
    println!();
}
