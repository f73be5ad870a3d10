use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tracing::error;

use gig_catalog::config::Config;
use gig_catalog::error::Result;
use gig_catalog::notify::LogNotifier;
use gig_catalog::orchestrator::BatchProcessor;
use gig_catalog::storage::{InMemoryStorage, JsonFileStorage, Storage};
use gig_catalog::types::NormalizedRecord;
use gig_catalog::{logging, metrics};

#[derive(Parser)]
#[command(name = "gig_catalog")]
#[command(about = "Cross-source event catalog deduplication and merge engine")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one dedup batch from a JSON file of normalized records
    Dedupe {
        /// Path to the JSON batch (array of records, or {"events": [...], "sourceName": "..."})
        input: String,
        /// Source label for records that do not carry one
        #[arg(long, default_value = "")]
        source: String,
        /// Catalog file to dedupe against (in-memory catalog when omitted)
        #[arg(long)]
        catalog: Option<String>,
    },
    /// Print per-source counts for a catalog file
    Stats {
        #[arg(long)]
        catalog: String,
    },
}

/// Accepted batch shapes: a bare array of records, or the wrapped form the
/// scraper jobs emit.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchInput {
    Wrapped {
        events: Vec<NormalizedRecord>,
        #[serde(rename = "sourceName")]
        source_name: Option<String>,
    },
    Plain(Vec<NormalizedRecord>),
}

fn load_batch(path: &str) -> Result<(Vec<NormalizedRecord>, Option<String>)> {
    let content = fs::read_to_string(path)?;
    let input: BatchInput = serde_json::from_str(&content)?;
    Ok(match input {
        BatchInput::Wrapped {
            events,
            source_name,
        } => (events, source_name),
        BatchInput::Plain(events) => (events, None),
    })
}

fn open_storage(catalog: Option<&str>) -> Result<Arc<dyn Storage>> {
    Ok(match catalog {
        Some(path) => Arc::new(JsonFileStorage::open(path)?),
        None => Arc::new(InMemoryStorage::new()),
    })
}

async fn run_dedupe(input: &str, source: &str, catalog: Option<&str>) -> Result<()> {
    let config = Config::load()?;
    let (events, batch_source) = load_batch(input)?;
    let source_name = batch_source.unwrap_or_else(|| source.to_string());

    let storage = open_storage(catalog)?;
    let processor = BatchProcessor::with_config(storage, Arc::new(LogNotifier), config.matcher);

    let stats = processor.process_batch(events, &source_name).await?;
    println!("\n📊 Batch results for {}:", source_name);
    println!("   Inserted:      {}", stats.inserted);
    println!("   Updated:       {}", stats.updated);
    println!("   Merged:        {}", stats.merged);
    println!("   Skipped:       {}", stats.skipped);
    println!("   Notifications: {}", stats.notifications);
    Ok(())
}

async fn run_stats(catalog: &str) -> Result<()> {
    let storage = open_storage(Some(catalog))?;
    let events = storage.fetch_all().await?;

    let mut per_source: BTreeMap<String, usize> = BTreeMap::new();
    for event in &events {
        for source in &event.sources {
            *per_source.entry(source.clone()).or_default() += 1;
        }
    }

    println!("📒 {} canonical events", events.len());
    for (source, count) in per_source {
        println!("   {:<20} {}", source, count);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dedupe {
            input,
            source,
            catalog,
        } => run_dedupe(&input, &source, catalog.as_deref()).await,
        Commands::Stats { catalog } => run_stats(&catalog).await,
    };

    // Per-record skips are already accounted for in the stats; only a fatal
    // failure that prevented the batch from running exits non-zero.
    if let Err(e) = result {
        error!("Fatal: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}
