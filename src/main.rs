// ==============================================================================
// main.rs - Cohort Analysis Orchestrator Entry Point
// ==============================================================================
// Description: Runs gene analyses for a cohort against a fixture backend
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use cohort_orchestrator::cache::{CacheStore, MemoryCache, SqliteCache};
use cohort_orchestrator::config::OrchestratorConfig;
use cohort_orchestrator::filters::ActiveFilters;
use cohort_orchestrator::fixtures::FixtureBackend;
use cohort_orchestrator::models::{AnalysisOptions, GeneAnalysisRequest};
use cohort_orchestrator::parsers::bookmarks::BookmarkFormat;
use cohort_orchestrator::sample::SampleDescriptor;
use cohort_orchestrator::CohortOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Orchestrator configuration (JSON)
    #[arg(short, long, env = "COHORT_CONFIG")]
    config: Option<PathBuf>,

    /// Fixture document served in place of remote services (JSON)
    #[arg(long, env = "COHORT_FIXTURES")]
    fixtures: PathBuf,

    /// Sample descriptors (JSON array)
    #[arg(long)]
    cohort: PathBuf,

    /// Active filters (JSON); defaults when omitted
    #[arg(long)]
    filters: Option<PathBuf>,

    /// Genes to analyze
    #[arg(short, long, required = true)]
    gene: Vec<String>,

    /// Transcript id; the canonical transcript when omitted or not found
    #[arg(short, long)]
    transcript: Option<String>,

    /// Jointly call variants from the alignments after loading
    #[arg(long)]
    joint_call: bool,

    /// SQLite cache file; an in-memory cache when omitted
    #[arg(long, env = "COHORT_CACHE_DB")]
    cache_db: Option<PathBuf>,

    /// Bookmarks to import before analysis (.csv or .json)
    #[arg(long)]
    import_bookmarks: Option<PathBuf>,

    /// Write the flagged variants here after analysis (.csv or .json)
    #[arg(long)]
    export_bookmarks: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cohort_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Cohort orchestrator starting...");

    let args = Args::parse();

    // Configuration: file (or defaults), then COHORT_* overrides
    let config = match &args.config {
        Some(path) => OrchestratorConfig::from_json_file(path)?,
        None => OrchestratorConfig::default(),
    }
    .with_env_overrides()?;

    let filters = match &args.filters {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read filters from {}", path.display()))?;
            serde_json::from_str::<ActiveFilters>(&content)?
        }
        None => ActiveFilters::default(),
    };

    let cache: Arc<dyn CacheStore> = match &args.cache_db {
        Some(path) => Arc::new(SqliteCache::open(path)?),
        None => Arc::new(MemoryCache::new()),
    };

    let backend = Arc::new(FixtureBackend::from_json_file(&args.fixtures)?);
    let services = backend.services(filters, config.danger_ruleset.clone(), cache);
    let mut orchestrator = CohortOrchestrator::new(config, services);

    // Cohort
    let content = std::fs::read_to_string(&args.cohort)
        .with_context(|| format!("Failed to read cohort from {}", args.cohort.display()))?;
    let descriptors: Vec<SampleDescriptor> = serde_json::from_str(&content)?;
    orchestrator.init_cohort(&descriptors).await?;

    if let Some(path) = &args.import_bookmarks {
        let format = BookmarkFormat::from_path(path)?;
        let data = std::fs::read_to_string(path)?;
        let report = orchestrator.import_flagged(format, &data).await?;
        info!(
            "Imported {} bookmarks ({} matched, {} unresolved)",
            report.imported,
            report.matched,
            report.unresolved.len()
        );
        for unresolved in &report.unresolved {
            warn!("Unresolved bookmark: {}", unresolved);
        }
    }

    // Per-gene analysis; one gene's failure does not stop the rest
    for gene_name in &args.gene {
        let locus = match orchestrator.resolve_gene(gene_name).await {
            Ok(locus) => locus,
            Err(e) => {
                warn!("Skipping {}: {}", gene_name, e);
                continue;
            }
        };

        let requested = args.transcript.as_deref().and_then(|id| locus.transcript(id));
        let Some(transcript) = requested.or_else(|| locus.canonical_transcript()).cloned() else {
            warn!("Skipping {}: no transcripts", gene_name);
            continue;
        };

        let request = GeneAnalysisRequest::new(locus.clone(), transcript.clone());
        if let Err(e) = orchestrator.load_gene(&request).await {
            warn!("Analysis of {} failed: {}", gene_name, e);
            continue;
        }

        if args.joint_call && orchestrator.has_alignments() {
            let options = AnalysisOptions::default();
            if let Err(e) = orchestrator.joint_call(&locus, &transcript, None, &options).await {
                warn!("Joint calling for {} failed: {}", gene_name, e);
            }
        }
    }

    // Most dangerous genes first
    let summaries: Vec<_> = orchestrator
        .genes_by_priority(&args.gene)
        .iter()
        .filter_map(|gene| orchestrator.danger_summary(gene))
        .collect();
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    if let Some(path) = &args.export_bookmarks {
        let format = BookmarkFormat::from_path(path)?;
        let exported = orchestrator.export_flagged(format)?;
        std::fs::write(path, exported)
            .with_context(|| format!("Failed to write bookmarks to {}", path.display()))?;
        info!(
            "Exported {} flagged variants to {}",
            orchestrator.flagged_variants().len(),
            path.display()
        );
    }

    Ok(())
}
