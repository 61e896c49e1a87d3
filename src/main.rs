//! # HN Lake CLI (`hnlake`)
//!
//! The `hnlake` binary drives the three pipeline stages. Each stage is
//! an independent command over one ingestion-date partition, so a
//! failed stage can be re-run without repeating its predecessors.
//!
//! ## Usage
//!
//! ```bash
//! hnlake --config ./config/hnlake.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hnlake ingest` | Fetch stories and comments into the raw layer |
//! | `hnlake process` | Normalize and validate into the processed layer |
//! | `hnlake transform` | Enrich into the analysis-ready output layer |
//!
//! Every command takes an optional `--date YYYY-MM-DD` (defaulting to
//! today, UTC) selecting the partition it operates on.
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Configuration, network, or storage error |
//! | 2 | A critical quality gate failed (reports are in the lake) |

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hn_lake::config::{load_config, Config};
use hn_lake::ingest::run_ingest;
use hn_lake::lake::{LakeLoader, LakeWriter};
use hn_lake::process::Processor;
use hn_lake::quality_runner::QualityGateError;
use hn_lake::store::create_store;
use hn_lake::transform::Transformer;

/// HN Lake CLI — a Hacker News data-lake pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/hnlake.example.toml` for a full
/// example.
#[derive(Parser)]
#[command(
    name = "hnlake",
    about = "HN Lake — a Hacker News data-lake pipeline",
    version,
    long_about = "HN Lake fetches Hacker News stories and comments into a layered \
    object-store lake and refines them through validated processing and temporal \
    enrichment. Stages run independently per ingestion date."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hnlake.toml")]
    config: PathBuf,

    /// Ingestion date to operate on (YYYY-MM-DD). Defaults to today, UTC.
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch stories and comments into the raw layer.
    ///
    /// Re-fetches every story in the tracking window, pulls the
    /// current top stories from the last week, walks their comment
    /// trees, and lands everything under `raw/` for the target date.
    Ingest,

    /// Normalize and validate raw data into the processed layer.
    ///
    /// Projects raw items onto fixed schemas, deduplicates repeated
    /// observations, drops orphaned comments, and runs the
    /// post-processing quality batteries. Aborts with exit code 2 if
    /// a critical check fails; the quality reports are written to the
    /// lake either way.
    Process,

    /// Enrich processed data into the output layer.
    ///
    /// Computes velocity and peak metrics over a multi-day window,
    /// extracts title topics via TF-IDF, scores comment sentiment,
    /// and runs the post-enrichment quality batteries.
    Transform,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let date = cli.date.unwrap_or_else(|| Utc::now().date_naive());

    if let Err(e) = run(&cli, date).await {
        if let Some(gate) = e.downcast_ref::<QualityGateError>() {
            eprintln!("Quality gate failed: {}", gate);
            eprintln!("Reports for this run are in the lake's quality_reports partitions.");
            std::process::exit(2);
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, date: NaiveDate) -> Result<()> {
    let cfg: Config = load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest => {
            let stats = run_ingest(&cfg, date).await?;
            println!("Ingestion complete for {}:", date);
            println!("  Tracked re-fetched:  {}", stats.tracked_refetched);
            println!("  Newly discovered:    {}", stats.newly_discovered);
            println!("  Now tracking:        {}", stats.active_tracked);
            println!("  Stories written:     {}", stats.stories_written);
            println!(
                "  Comments written:    {} ({} files)",
                stats.comments_written, stats.comment_files
            );
        }
        Commands::Process => {
            let store = create_store(&cfg.lake)?;
            let processor = Processor::new(
                LakeLoader::new(store.clone()),
                LakeWriter::new(store),
            );
            let stats = processor.run(date).await?;
            println!("Processing complete for {}:", date);
            println!(
                "  Raw loaded:          {} stories, {} comments",
                stats.raw_stories, stats.raw_comments
            );
            println!(
                "  Dropped (identity):  {} stories, {} comments",
                stats.dropped_stories, stats.dropped_comments
            );
            println!("  Orphaned comments:   {}", stats.orphaned_comments);
            println!(
                "  Written:             {} stories, {} comments",
                stats.stories_written, stats.comments_written
            );
        }
        Commands::Transform => {
            let store = create_store(&cfg.lake)?;
            let transformer = Transformer::new(
                LakeLoader::new(store.clone()),
                LakeWriter::new(store),
                cfg.transform.window_days,
                cfg.transform.top_n_topics,
            );
            let stats = transformer.run(date).await?;
            println!("Enrichment complete for {}:", date);
            println!("  Window stories:      {}", stats.window_stories);
            println!("  Comments loaded:     {}", stats.comments_loaded);
            println!(
                "  Written:             {} stories, {} comments",
                stats.stories_written, stats.comments_written
            );
        }
    }

    Ok(())
}
