//! Notion-Harvest main entry point
//!
//! This is the command-line interface for mirroring a Notion workspace and
//! enriching its notes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use notion_harvest::config::{load_config_with_hash, Config};
use notion_harvest::crawler::{run_crawl, run_refresh, CrawlMode};
use notion_harvest::enrich::{load_outputs, run_analysis, sync_questions};
use notion_harvest::export::integrate;
use notion_harvest::output::{load_statistics, print_statistics};
use notion_harvest::state::parse_timestamp;
use notion_harvest::storage::{open_storage, SqliteStorage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Notion-Harvest: incremental Notion mirror with LLM enrichment
///
/// Notion-Harvest copies a Notion page tree into a local SQLite store,
/// skipping subtrees that have not changed since the last run, and then
/// answers a versioned question set about every stored note with Gemini.
#[derive(Parser, Debug)]
#[command(name = "notion-harvest")]
#[command(version)]
#[command(about = "Incremental Notion mirror with LLM enrichment", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror the tree below a page or database
    Crawl {
        /// Page or database id to start from
        #[arg(value_name = "ROOT_ID")]
        root_id: String,

        /// Skip pages already stored under the same parent
        #[arg(long)]
        resume_incomplete: bool,
    },

    /// Load page bodies from the Markdown export directory
    Integrate,

    /// Integrate the export, then fetch metadata for nodes missing it
    Reset,

    /// Copy question set files into the store
    SyncQuestions {
        /// Only sync this version
        #[arg(long)]
        version: Option<String>,

        /// Replace versions that are already stored
        #[arg(long)]
        force: bool,
    },

    /// Answer a question set for every stored note
    Analyze {
        /// Question set version (defaults to the latest stored)
        #[arg(long)]
        questions_version: Option<String>,

        /// Only notes created or edited on or after this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        since: Option<String>,
    },

    /// Load enrichment result files into the store
    LoadOutputs,

    /// Show statistics from the database and exit
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let mut storage = open_database(&config)?;

    match cli.command {
        Command::Crawl {
            root_id,
            resume_incomplete,
        } => handle_crawl(&config, &mut storage, &root_id, resume_incomplete).await,
        Command::Integrate => handle_integrate(&config, &mut storage),
        Command::Reset => handle_reset(&config, &mut storage).await,
        Command::SyncQuestions { version, force } => {
            handle_sync_questions(&config, &mut storage, version.as_deref(), force)
        }
        Command::Analyze {
            questions_version,
            since,
        } => {
            handle_analyze(
                &config,
                &mut storage,
                questions_version.as_deref(),
                since.as_deref(),
            )
            .await
        }
        Command::LoadOutputs => handle_load_outputs(&config, &mut storage),
        Command::Stats => handle_stats(&config, &storage),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("notion_harvest=info,warn"),
            1 => EnvFilter::new("notion_harvest=debug,info"),
            2 => EnvFilter::new("notion_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.storage.database_path);
    open_storage(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Handles the crawl command
async fn handle_crawl(
    config: &Config,
    storage: &mut SqliteStorage,
    root_id: &str,
    resume_incomplete: bool,
) -> anyhow::Result<()> {
    let mode = CrawlMode::from_resume_flag(resume_incomplete);
    tracing::info!("Starting {} crawl from {}", mode, root_id);

    let report = run_crawl(&config.notion, storage, root_id, mode)
        .await
        .with_context(|| format!("Crawl from {} failed", root_id))?;

    tracing::info!("Crawl completed: {}", report);
    Ok(())
}

/// Handles the integrate command
fn handle_integrate(config: &Config, storage: &mut SqliteStorage) -> anyhow::Result<()> {
    let dir = &config.paths.exports_dir;
    let added = integrate(storage, dir)
        .with_context(|| format!("Failed to integrate export {}", dir.display()))?;
    println!("✓ Integrated {} notes from {}", added, dir.display());
    Ok(())
}

/// Handles the reset command: export integration followed by a metadata refresh
async fn handle_reset(config: &Config, storage: &mut SqliteStorage) -> anyhow::Result<()> {
    handle_integrate(config, storage)?;

    tracing::info!("Fetching metadata for nodes that lack it");
    let report = run_refresh(&config.notion, storage)
        .await
        .context("Metadata refresh failed")?;

    tracing::info!("Refresh completed: {}", report);
    Ok(())
}

/// Handles the sync-questions command
fn handle_sync_questions(
    config: &Config,
    storage: &mut SqliteStorage,
    version: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    let dir = &config.paths.questions_dir;
    let written = sync_questions(storage, dir, version, force)
        .with_context(|| format!("Failed to sync question sets from {}", dir.display()))?;
    println!("✓ Stored {} question sets", written);
    Ok(())
}

/// Handles the analyze command
async fn handle_analyze(
    config: &Config,
    storage: &mut SqliteStorage,
    questions_version: Option<&str>,
    since: Option<&str>,
) -> anyhow::Result<()> {
    let since = since
        .map(|s| {
            parse_timestamp(s)
                .with_context(|| format!("Invalid --since date {:?}; use YYYY-MM-DD or RFC 3339", s))
        })
        .transpose()?;

    match run_analysis(config, storage, questions_version, since).await {
        Ok(report) => {
            tracing::info!("Analysis completed: {}", report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Analysis stopped: {}", e);
            Err(e.into())
        }
    }
}

/// Handles the load-outputs command
fn handle_load_outputs(config: &Config, storage: &mut SqliteStorage) -> anyhow::Result<()> {
    let dir = &config.paths.outputs_dir;
    let loaded = load_outputs(storage, dir)
        .with_context(|| format!("Failed to load results from {}", dir.display()))?;
    println!("✓ Loaded {} results from {}", loaded, dir.display());
    Ok(())
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config, storage: &SqliteStorage) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let stats = load_statistics(storage)?;
    print_statistics(&stats);

    Ok(())
}
