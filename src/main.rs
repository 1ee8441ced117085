mod coingecko;
mod config;
mod dashboard;
mod market;
mod models;
mod table;
mod utils;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    coingecko::{CoinGeckoClient, ListingsQuery},
    config::Settings,
    market::top_gainers_losers,
    models::ChangeWindow,
    table::{history_table, listings_table},
    utils::{format_percent, ATTRIBUTION},
};

#[derive(Debug, Parser)]
#[command(name = "coindash", version, about = "Cryptocurrency market dashboard backed by CoinGecko")]
struct Cli {
    /// Override DASHBOARD_HOST
    #[arg(long, global = true)]
    host: Option<String>,

    /// Override DASHBOARD_PORT
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the web dashboard (default)
    Serve {
        /// Open the dashboard in a browser once it is listening
        #[arg(long)]
        open: bool,
    },
    /// Print current market listings as a table
    Listings {
        /// Only print the first N rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print daily price history for one coin
    History {
        /// CoinGecko coin id, e.g. `bitcoin`
        #[arg(long, conflicts_with = "symbol", required_unless_present = "symbol")]
        coin: Option<String>,

        /// Ticker symbol, e.g. `BTC` (resolved via /coins/list)
        #[arg(long)]
        symbol: Option<String>,

        /// Window in days, 1..=365
        #[arg(long, allow_negative_numbers = true)]
        days: Option<i64>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(h) = cli.host {
        settings.dashboard_host = h;
    }
    if let Some(p) = cli.port {
        settings.dashboard_port = p;
    }

    let client = CoinGeckoClient::from_settings(&settings).context("build coingecko client")?;
    log::info!(
        "app.start upstream={} vs_currency={} per_page={}",
        client.base_url(),
        settings.vs_currency,
        settings.listings_per_page
    );

    match cli.command.unwrap_or(Command::Serve { open: false }) {
        Command::Serve { open } => {
            if open || settings.dashboard_open_browser {
                let url = settings.dashboard_url();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(650)).await;
                    if let Err(e) = std::process::Command::new("xdg-open").arg(&url).spawn() {
                        log::warn!("dashboard.open_browser failed url={} err={}", url, e);
                    }
                });
            }
            dashboard::serve_dashboard(settings, client).await?;
        }
        Command::Listings { limit } => {
            let query = ListingsQuery::from_settings(&settings);
            let mut rows = client.fetch_listings(&query).await?;
            if let Some(n) = limit {
                rows.truncate(n);
            }
            let table = listings_table(&rows);
            if table.is_empty() {
                println!("no listings returned");
            } else {
                print!("{}", table.render());
                let (gainers, losers) = top_gainers_losers(&rows, 5, ChangeWindow::H24);
                for (title, movers) in [("gainers", gainers), ("losers", losers)] {
                    let line = movers
                        .iter()
                        .map(|m| format!("{} {}", m.symbol, format_percent(Some(m.percent_change), true)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("top {title} ({}): {line}", ChangeWindow::H24.label());
                }
            }
            println!("\n{ATTRIBUTION}");
        }
        Command::History { coin, symbol, days } => {
            let coin_id = match (coin, symbol) {
                (Some(c), _) => c,
                (None, Some(s)) => client.resolve_coin_id(&s).await?,
                (None, None) => anyhow::bail!("either --coin or --symbol is required"),
            };
            let days = days.unwrap_or(i64::from(settings.default_history_days));
            let points = client
                .fetch_history(&coin_id, days)
                .await
                .with_context(|| format!("history coin={coin_id} days={days}"))?;
            let table = history_table(&points);
            println!("{coin_id} • last {days} days • {} points", table.len());
            print!("{}", table.render());
            println!("\n{ATTRIBUTION}");
        }
    }
    Ok(())
}
