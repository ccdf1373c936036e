//! Index Command
//!
//! Build the paper index, print corpus statistics, and optionally rank
//! chunks against a free-text query.

use std::path::PathBuf;

use tokio::runtime::Runtime;

use super::{Overrides, load_config};
use crate::cli::Output;
use crate::config::Config;
use crate::corpus::IndexBuilder;
use crate::retrieval::retrieve_text;
use crate::types::Result;

/// Characters of chunk text shown per hit
const HIT_PREVIEW_CHARS: usize = 160;

pub fn run(
    config: Option<PathBuf>,
    papers: Option<PathBuf>,
    query: Option<String>,
    top_k: usize,
) -> Result<()> {
    let overrides = Overrides {
        papers,
        ..Default::default()
    };
    let config = load_config(config.as_deref(), &overrides)?;
    let rt = Runtime::new()?;
    rt.block_on(show_index(&config, query, top_k))
}

async fn show_index(config: &Config, query: Option<String>, top_k: usize) -> Result<()> {
    let out = Output::new();
    let index = IndexBuilder::new(&config.corpus).build().await?;
    let stats = index.stats();

    out.section("Paper index");
    out.field("Directory", config.corpus.dir.display());
    out.field("Papers", stats.papers);
    out.field("Chunks", stats.chunks);
    out.field("Representation", &stats.representation);
    out.field("Dimensions", stats.dimensions);
    out.field("Algorithm chunks", stats.algorithm_chunks);
    out.field("Equation chunks", stats.formula_chunks);
    if stats.embedded + stats.cached > 0 {
        out.field("Embedded", stats.embedded);
        out.field("From cache", stats.cached);
    }
    out.field("Build time", format!("{} ms", stats.build_ms));
    for skipped in &stats.skipped {
        out.warning(&format!("Skipped {}: {}", skipped.path, skipped.reason));
    }

    let Some(query) = query else {
        return Ok(());
    };

    let result = retrieve_text(&query, &index, top_k, f32::NEG_INFINITY).await?;
    out.section(&format!("Top {} for \"{}\"", top_k, query));
    if result.is_empty() {
        out.info("No chunks");
    }
    for (rank, hit) in result.hits.iter().enumerate() {
        let preview: String = hit
            .chunk
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(HIT_PREVIEW_CHARS)
            .collect();
        println!(
            "{:>2}. {:.4}  {} (p. {}{})",
            rank + 1,
            hit.score,
            hit.chunk.id,
            hit.chunk.page,
            hit.chunk
                .section
                .as_deref()
                .map(|s| format!(", {}", s))
                .unwrap_or_default()
        );
        println!("    {}", preview);
    }
    Ok(())
}
