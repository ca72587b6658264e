//! AlgoTrader chart - terminal candle chart over stored bar files.
//!
//! Keys:
//! - `/` search symbol, Enter to load, Esc to cancel
//! - `t` / `T` next / previous timeframe
//! - `[` / `]` previous / next day
//! - `r` reset to the full range
//! - `q` quit

use std::io::{self, stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use algotrader_core::data::Timeframe;
use algotrader_runner::AppConfig;
use algotrader_tui::{handle_key, ui, ChartApp, Theme};

#[derive(Parser)]
#[command(name = "algotrader-chart", about = "Candle chart for stored bar files")]
struct Args {
    /// TOML config file; `[data]` sets the data directory and start date.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "XAUUSD")]
    symbol: String,

    #[arg(long, default_value = "5min")]
    timeframe: Timeframe,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    let mut app = ChartApp::new(config.chart_config(), &args.symbol, args.timeframe);
    let theme = Theme::default();

    // Restore the terminal before printing a panic.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stderr(), LeaveAlternateScreen);
        default_hook(info);
    }));

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;

    let result = run_app(&mut terminal, &mut app, &theme);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut ChartApp,
    theme: &Theme,
) -> Result<()> {
    while app.running {
        terminal.draw(|f| ui::draw(f, app, theme))?;
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                handle_key(app, key);
            }
        }
    }
    Ok(())
}
