use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use basefill_core::index::IndexClient;
use basefill_core::{AppConfig, LicenseNormalizer, PipelineError, TableLicenseNormalizer};
use basefill_scrape::{HtmlPageScraper, PageClient, PageScraper, scrape_targets_in_parallel};

mod driver;
mod logging;

use driver::Pipeline;
use logging::LoggingConfig;

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "basefill",
    about = "Find open full-text links for search index records and write them back",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Which records to enrich.
    #[arg(long, value_enum, default_value_t = Mode::Sampled)]
    mode: Mode,

    /// Search index base URL. Falls back to BASE_URL, then the config file.
    #[arg(long)]
    url: Option<String>,

    /// Concurrent bulk requests.
    #[arg(long)]
    threads: Option<usize>,

    /// Actions per bulk request.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Concurrent page scrapes (0 = one per CPU).
    #[arg(long)]
    workers: Option<usize>,

    /// Config file (default: ~/.config/basefill/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `basefill_scrape=debug,info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log one JSON object per line.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Scrape random pages of never-enriched records.
    Sampled,
    /// Stamp `oa=1` records from the URLs they already carry.
    Backfill,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the given URLs once and print what was found, without
    /// touching the index.
    Probe {
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Flag > environment > config file > defaults.
fn resolve_config(cli: &Cli, env_url: Option<String>) -> basefill_core::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if let Some(url) = cli.url.clone().or(env_url).filter(|u| !u.trim().is_empty()) {
        config.index.url = url;
    }
    if let Some(threads) = cli.threads {
        config.bulk.threads = threads;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.bulk.chunk_size = chunk_size;
    }
    if let Some(workers) = cli.workers {
        config.scrape.workers = workers;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_json {
        config.logging.json = true;
    }

    if config.bulk.threads == 0 {
        return Err(PipelineError::Config("threads must be at least 1".to_string()));
    }
    if config.bulk.chunk_size == 0 {
        return Err(PipelineError::Config("chunk size must be at least 1".to_string()));
    }
    Ok(config)
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match resolve_config(&cli, std::env::var("BASE_URL").ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("basefill: {e}");
            std::process::exit(e.exit_code() as i32);
        }
    };

    logging::init(&LoggingConfig::new(
        config.logging.level.clone(),
        config.logging.json,
    ))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, letting in-flight scrapes finish");
            on_signal.cancel();
        }
    });

    let normalizer: Arc<dyn LicenseNormalizer> = Arc::new(TableLicenseNormalizer);
    let page_client = PageClient::new(
        &config.scrape.user_agent,
        config.scrape.max_retries,
        config.scrape.record_timeout(),
    )?;
    let scraper: Arc<dyn PageScraper> =
        Arc::new(HtmlPageScraper::new(page_client, Arc::clone(&normalizer)));

    if let Some(Commands::Probe { urls }) = cli.command {
        return probe(scraper, &urls, config.scrape.fanout_deadline()).await;
    }

    let outcome = match IndexClient::new(&config.index) {
        Ok(client) => {
            tracing::info!(url = config.index.url.as_str(), mode = ?cli.mode, "basefill starting");
            let pipeline = Pipeline::new(client, scraper, normalizer, config, cancel);
            match cli.mode {
                Mode::Sampled => pipeline.run_sampled().await,
                Mode::Backfill => pipeline.run_backfill().await,
            }
        }
        Err(e) => Err(PipelineError::from(e)),
    };

    match outcome {
        Ok(summary) => {
            tracing::info!(
                cycles = summary.cycles,
                scrape_failures = summary.scrape_failures,
                write_failures = summary.write_failures,
                cancelled = summary.cancelled,
                "done: {} records processed, {} saved",
                summary.scraped,
                summary.saved
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("fatal: {e}");
            std::process::exit(e.exit_code() as i32);
        }
    }
}

async fn probe(scraper: Arc<dyn PageScraper>, urls: &[String], deadline: Duration) -> Result<()> {
    let gathered = scrape_targets_in_parallel(scraper, urls, deadline).await;

    let results: Vec<_> = gathered
        .finished
        .iter()
        .map(|(url, result)| match result {
            Ok(page) => serde_json::json!({ "url": url, "status": "ok", "data": page }),
            Err(e) => serde_json::json!({ "url": url, "status": "error", "error": e.to_string() }),
        })
        .collect();

    print_json(&serde_json::json!({
        "status": if gathered.is_complete() { "ok" } else { "partial" },
        "data": { "items": results, "dropped": gathered.dropped, "crashed": gathered.crashed },
    }))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
