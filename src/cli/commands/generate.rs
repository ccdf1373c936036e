//! Generate Command
//!
//! Extract units, index the paper corpus, and document every unit.
//!
//! Usage:
//!   paperdoc generate [--source DIR] [--papers DIR] [--output DIR]
//!                     [--provider NAME] [--model NAME] [--concurrency N]
//!                     [--top-k N] [--report FILE] [--dry-run]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::{info, warn};

use super::{Overrides, load_config};
use crate::ai::{Composer, ProviderConfig, create_provider};
use crate::analyzer::UnitExtractor;
use crate::cli::Output;
use crate::config::Config;
use crate::corpus::{CorpusIndex, IndexBuilder};
use crate::pipeline::{CancellationToken, Orchestrator, RunOutcome};
use crate::retrieval::{RetrievalResult, query_for, retrieve_text};
use crate::types::{PaperdocError, Result};

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub config: Option<PathBuf>,
    pub overrides: Overrides,
    /// Report path, overriding `output.report_file`
    pub report: Option<PathBuf>,
    /// Extract, index and compose only; no provider calls
    pub dry_run: bool,
    pub quiet: bool,
}

/// Run the command; the outcome decides the exit status
pub fn run(options: GenerateOptions) -> Result<RunOutcome> {
    let config = load_config(options.config.as_deref(), &options.overrides)?;
    let out = Output::quiet(options.quiet);
    let rt = Runtime::new()?;

    if options.dry_run {
        rt.block_on(dry_run(&config, &out))?;
        return Ok(RunOutcome::Complete);
    }

    let report_path = options
        .report
        .clone()
        .unwrap_or_else(|| config.output.report_path());
    rt.block_on(generate(&config, &report_path, &out))
}

async fn generate(config: &Config, report_path: &Path, out: &Output) -> Result<RunOutcome> {
    let units = UnitExtractor::new(&config.sources).units()?;
    let index = Arc::new(IndexBuilder::new(&config.corpus).build().await?);
    let provider = create_provider(&ProviderConfig::from_config(
        &config.llm,
        &config.prompt.system_prompt,
    ))?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight units");
            interrupt.cancel();
        }
    });

    let orchestrator =
        Orchestrator::from_config(config, index, provider)?.with_cancellation(cancel);
    let (units, extraction) = units.spawn(orchestrator.concurrency() * 2);
    let report = orchestrator.run_stream(units).await;
    let drained = extraction.await.map_err(|e| PaperdocError::SourceTree {
        path: config.sources.root.display().to_string(),
        message: format!("extraction task failed: {}", e),
    })?;
    let report = report.with_skipped(drained.skipped().to_vec());

    report.write(report_path)?;
    info!(path = %report_path.display(), "Run report written");

    out.run_summary(&report);
    out.info(&format!("Report: {}", report_path.display()));
    Ok(report.outcome)
}

/// Show what each unit's prompt would look like without calling a provider
async fn dry_run(config: &Config, out: &Output) -> Result<()> {
    let extractor = UnitExtractor::new(&config.sources);
    let extraction = tokio::task::spawn_blocking(move || extractor.extract_all())
        .await
        .map_err(|e| PaperdocError::SourceTree {
            path: config.sources.root.display().to_string(),
            message: format!("extraction task failed: {}", e),
        })??;
    let index = IndexBuilder::new(&config.corpus).build().await?;
    let composer = Composer::from_config(&config.prompt)?;

    out.section("Dry run");
    out.field("Units", extraction.units.len());
    out.field("Files read", extraction.files_read);
    out.field("Skipped files", extraction.skipped.len());
    out.field(
        "Index",
        format!(
            "{} papers, {} chunks ({})",
            index.stats().papers,
            index.stats().chunks,
            index.stats().representation
        ),
    );
    out.field("Budget", format!("{} {}", composer.budget(), config.prompt.budget_unit.as_str()));

    let mut too_large = 0usize;
    for unit in &extraction.units {
        let retrieval = dry_retrieve(config, &index, &query_for(unit)).await;
        match composer.compose(unit, &retrieval) {
            Ok(prompt) => out.field(
                "",
                format!(
                    "{}: {} chunks, {} chars",
                    unit.id,
                    prompt.chunks.len(),
                    prompt.text.chars().count()
                ),
            ),
            Err(e) => {
                too_large += 1;
                out.warning(&e.to_string());
            }
        }
    }

    if too_large == 0 {
        out.success("Every unit fits the prompt budget");
    } else {
        out.warning(&format!("{} units exceed the prompt budget", too_large));
    }
    Ok(())
}

async fn dry_retrieve(config: &Config, index: &CorpusIndex, query: &str) -> RetrievalResult {
    match retrieve_text(query, index, config.retrieval.top_k, config.retrieval.min_score).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Retrieval failed");
            RetrievalResult::ungrounded(index.id())
        }
    }
}
