//! livedash - terminal front end for the live brokerage dashboard
//!
//! # Usage
//! ```sh
//! MODE=alpaca cargo run -- dashboard --symbols AAPL,MSFT
//! cargo run -- order --symbol AAPL --qty 3 --side buy
//! ```
//!
//! Logs go to stderr at `warn`; a valid `RUST_LOG` replaces that filter.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use livedash::application::client::{
    AccountView, DashboardClient, LivePricesView, Notice, NoticeLevel,
};
use livedash::application::market_data::feed_client::FeedState;
use livedash::application::system::Dashboard;
use livedash::config::Config;
use livedash::domain::market::timeframe::Timeframe;
use livedash::domain::trading::portfolio::HistoryPeriod;
use livedash::domain::trading::types::OrderForm;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Live brokerage dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show open positions
    Positions,
    /// Show the portfolio equity curve
    History {
        /// Lookback window, e.g. 1D, 2W, 1M, 1A
        #[arg(long)]
        period: Option<HistoryPeriod>,

        /// Resolution (1Min, 5Min, 15Min, 1H, 1D)
        #[arg(long)]
        timeframe: Option<Timeframe>,
    },
    /// Submit a good-till-cancelled order
    Order {
        #[arg(short, long)]
        symbol: String,

        #[arg(short, long, allow_negative_numbers = true)]
        qty: i64,

        /// buy or sell
        #[arg(long)]
        side: String,

        /// market or limit
        #[arg(long = "type", default_value = "market")]
        order_type: String,

        #[arg(long)]
        limit_price: Option<Decimal>,
    },
    /// Cancel an open order by id
    Cancel { order_id: String },
    /// Close every open position
    Liquidate,
    /// Stream live prices until Ctrl+C
    Watch {
        /// Comma-separated symbols (defaults to SYMBOLS)
        #[arg(short, long)]
        symbols: Option<String>,

        #[arg(long, default_value = "2")]
        refresh_secs: u64,
    },
    /// Account overview followed by live prices
    Dashboard {
        #[arg(short, long)]
        symbols: Option<String>,

        #[arg(long, default_value = "2")]
        refresh_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(log_filter(std::env::var("RUST_LOG").ok()))
        .with(stderr_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "livedash {} starting: Mode={:?}, Symbols={:?}",
        env!("CARGO_PKG_VERSION"),
        config.mode,
        config.dashboard.symbols
    );

    let dashboard = Dashboard::build(config);
    let outcome = run(cli.command, &dashboard).await;
    dashboard.shutdown().await;
    outcome
}

/// `RUST_LOG` when it parses, `warn` otherwise.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

async fn run(command: Commands, dashboard: &Dashboard) -> Result<()> {
    let client = &dashboard.client;
    let defaults = &dashboard.config.dashboard;
    match command {
        Commands::Positions => {
            let view = client.refresh().await;
            print_positions(&view);
            report_notices(&view.notices)
        }
        Commands::History { period, timeframe } => {
            let view = client
                .refresh_with(
                    period.unwrap_or(defaults.history_period),
                    timeframe.unwrap_or(defaults.history_timeframe),
                )
                .await;
            print_history(&view);
            report_notices(&view.notices)
        }
        Commands::Order {
            symbol,
            qty,
            side,
            order_type,
            limit_price,
        } => {
            let form = OrderForm {
                symbol,
                quantity: qty,
                side,
                order_type,
                limit_price,
            };
            finish(client.place_order(form).await)
        }
        Commands::Cancel { order_id } => finish(client.cancel_order(&order_id).await),
        Commands::Liquidate => finish(client.liquidate_all().await),
        Commands::Watch {
            symbols,
            refresh_secs,
        } => watch(client, symbols, refresh_secs).await,
        Commands::Dashboard {
            symbols,
            refresh_secs,
        } => {
            let view = client.refresh().await;
            print_positions(&view);
            print_history(&view);
            for notice in &view.notices {
                eprintln!("{}", notice);
            }
            watch(client, symbols, refresh_secs).await
        }
    }
}

async fn watch(client: &DashboardClient, symbols: Option<String>, refresh_secs: u64) -> Result<()> {
    if let Some(symbols) = symbols {
        let notice = client.watch_symbols(&symbols).await;
        if notice.is_error() {
            bail!("{}", notice);
        }
        println!("{}", notice);
    }

    let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => print_prices(&client.live_prices()),
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                println!("\nStopping price feed...");
                return Ok(());
            }
        }
    }
}

fn finish(notice: Notice) -> Result<()> {
    match notice.level {
        NoticeLevel::Success => {
            println!("{}", notice);
            Ok(())
        }
        NoticeLevel::Error => bail!("{}", notice),
    }
}

fn report_notices(notices: &[Notice]) -> Result<()> {
    match notices.iter().find(|n| n.is_error()) {
        Some(first) => {
            for notice in notices.iter().skip(1) {
                eprintln!("{}", notice);
            }
            bail!("{}", first)
        }
        None => Ok(()),
    }
}

fn print_positions(view: &AccountView) {
    println!("\n{}", "=".repeat(80));
    println!(
        "{:<10} {:>10} {:>14} {:>14} {:>14} {:>12}",
        "Symbol", "Qty", "Market Value", "Cost Basis", "Unrealized", "Avg Entry"
    );
    println!("{}", "-".repeat(80));
    if view.positions.is_empty() {
        println!("(no open positions)");
    }
    for p in &view.positions {
        println!(
            "{:<10} {:>10} {:>14.2} {:>14.2} {:>14.2} {:>12.2}",
            p.symbol.as_str(),
            p.quantity,
            p.market_value,
            p.cost_basis,
            p.unrealized_pl,
            p.avg_entry_price
        );
    }
}

fn print_history(view: &AccountView) {
    println!("\n{}", "=".repeat(80));
    println!("{:<25} {:>16}", "Time", "Equity");
    println!("{}", "-".repeat(80));
    if view.equity_curve.is_empty() {
        println!("(no history)");
    }
    for point in &view.equity_curve {
        println!(
            "{:<25} {:>16.2}",
            point.time.format("%Y-%m-%d %H:%M").to_string(),
            point.equity
        );
    }
}

fn print_prices(view: &LivePricesView) {
    let state = match &view.feed_state {
        FeedState::Idle => "idle".to_string(),
        FeedState::Connecting => "connecting".to_string(),
        FeedState::Streaming { since } => format!("streaming since {}", since.format("%H:%M:%S")),
        FeedState::Interrupted { reason, .. } => format!("interrupted: {}", reason),
        FeedState::Stopped => "stopped".to_string(),
    };
    let last_updated = view
        .snapshot
        .last_updated()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    println!("\n{}", "=".repeat(60));
    println!(
        "Live prices [{}] last updated {}{}",
        state,
        last_updated,
        if view.stale { " (STALE)" } else { "" }
    );
    println!("{}", "-".repeat(60));
    if view.snapshot.is_empty() {
        println!("(waiting for prices)");
    }
    for (symbol, price) in &view.snapshot.prices {
        let marker = if view.stale_symbols.contains(symbol) { " *" } else { "" };
        println!(
            "{:<10} {:>12.2}  {}{}",
            symbol.as_str(),
            price.price,
            price.received_at.format("%H:%M:%S"),
            marker
        );
    }
}
