use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listing_harvester::config::parse_max_items;
use listing_harvester::crawler::models::ListingReference;
use listing_harvester::crawler::ListingOutcome;
use listing_harvester::{Config, HttpFetcher, Progress, RunReport, ScrapingService};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Number of listings to take from the catalog
    #[arg(short = 'n', long, global = true)]
    max_items: Option<String>,

    /// Fetch listings again even if they are in the history
    #[arg(long, global = true)]
    no_skip: bool,

    /// Directory holding the dataset, history and images
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest new listings (default)
    Run,
    /// Forget every processed listing id
    ResetHistory {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Show history and dataset sizes
    Status,
}

/// Progress lines for the terminal.
struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn begin(&mut self, total: usize) {
        info!("{total} listing URLs found");
    }

    fn listing(
        &mut self,
        index: usize,
        total: usize,
        reference: &ListingReference,
        outcome: &ListingOutcome,
    ) {
        let pct = index as f64 * 100.0 / total as f64;
        let state = match outcome {
            ListingOutcome::Skipped => format!("skipped {}", reference.id()),
            ListingOutcome::Extracted(r) => format!("{} ({} images)", r.id, r.image_count),
            ListingOutcome::Failed(_) => format!("failed {}", reference.url),
        };
        info!("[{index}/{total}] {pct:.1}% {state}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = build_config(&cli)?;

    let fetcher = HttpFetcher::new().context("failed to build HTTP client")?;
    let mut service = ScrapingService::new(cfg.clone(), fetcher)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let token = service.cancel_token();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if token.cancel() {
                        warn!("Second stop request, exiting now");
                        std::process::exit(130);
                    }
                    warn!("Stop requested, finishing the current listing (Ctrl-C again to quit)");
                }
            });

            let report = service.run(&mut ConsoleProgress).await;
            print_summary(&report, &cfg.image_path());

            if !report.is_success() {
                bail!("run failed: {:?}", report.status);
            }
        }
        Command::ResetHistory { yes } => {
            if !yes {
                bail!("refusing to clear history without --yes");
            }
            service.reset_history();
            println!("History cleared");
        }
        Command::Status => {
            let rows = service.store().load()?.len();
            println!("processed listings: {}", service.history().len());
            println!("dataset rows:       {rows}");
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = Config::from_env()?;

    if let Some(raw) = &cli.max_items {
        cfg.max_items = parse_max_items(raw)?;
    }
    if cli.no_skip {
        cfg.skip_processed = false;
    }
    if let Some(dir) = &cli.output_dir {
        cfg = cfg.with_output_dir(dir);
    }

    Ok(cfg)
}

fn print_summary(report: &RunReport, image_dir: &Path) {
    println!("status:    {:?}", report.status);
    println!("new:       {}", report.new);
    println!("skipped:   {}", report.skipped);
    println!("failed:    {}", report.failed);
    match report.total_rows {
        Some(n) => println!("total:     {n} (CSV/JSON)"),
        None => println!("total:     unchanged"),
    }
    println!("processed: {}", report.history_size);

    if let Ok(entries) = std::fs::read_dir(image_dir) {
        println!("images:    {} files in {}", entries.count(), image_dir.display());
    }
}
