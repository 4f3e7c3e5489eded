mod config;
mod models;
mod pipeline;
mod scraper;
mod signal;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::signal::{LogNotifier, SignalJob, SignalOutcome};
use crate::storage::ExportKind;

#[derive(Parser)]
#[command(
    name = "market-watch",
    about = "HK IPO listing scraper and index pullback signal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape listed HK IPOs across the configured page range into a CSV file
    Ipo {
        #[arg(long, env = "MARKET_WATCH_FIRST_PAGE")]
        first_page: Option<u32>,

        #[arg(long, env = "MARKET_WATCH_LAST_PAGE")]
        last_page: Option<u32>,

        /// Directory for the CSV output (default: output/)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Evaluate the pullback / VIX / PE signal and notify when a rule fires
    Signal,

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "market_watch=info,warn",
        1 => "market_watch=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let mut config = AppConfig::load().context("Failed to load configuration")?;

    match command {
        Command::Ipo {
            first_page,
            last_page,
            out_dir,
        } => {
            if let Some(p) = first_page {
                config.scraper.first_page = p;
            }
            if let Some(p) = last_page {
                config.scraper.last_page = p;
            }
            if let Some(dir) = out_dir {
                config.output.dir = dir;
            }

            let _t = utils::Timer::start("HK IPO scrape");
            let stats = Pipeline::new(config).run().await?;
            match stats.kind {
                ExportKind::Data => info!(
                    "Done: {} listings from {} pages → {}",
                    stats.listings,
                    stats.pages_attempted,
                    stats.output.display()
                ),
                ExportKind::Sample => info!(
                    "No listings scraped; sample format written to {}",
                    stats.output.display()
                ),
            }
        }

        Command::Signal => {
            let _t = utils::Timer::start("Market signal");
            let outcome = SignalJob::new(config.signal, LogNotifier).run().await?;
            match outcome {
                SignalOutcome::InsufficientData { points, needed } => {
                    info!("Skipped: {} closes available, {} needed", points, needed)
                }
                SignalOutcome::Evaluated { advice, .. } => info!("Advice: {}", advice.text),
            }
        }

        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
