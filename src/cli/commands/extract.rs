//! Extract Command
//!
//! Dump the documentable units of the source tree as JSON.

use std::path::PathBuf;

use serde::Serialize;

use super::{Overrides, load_config};
use crate::analyzer::{SkippedFile, UnitExtractor};
use crate::constants::extraction::BODY_PREVIEW_CHARS;
use crate::types::{Result, SourceUnit, UnitId};

/// One unit as shown in the dump; the body is cut to a preview
#[derive(Debug, Serialize)]
struct UnitSummary<'a> {
    id: &'a UnitId,
    name: &'a str,
    signature: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_type: Option<&'a str>,
    parameters: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_name: Option<&'a str>,
    algorithm_keywords: &'a [String],
    uses_math: bool,
    has_doc_comment: bool,
    body_preview: String,
}

impl<'a> UnitSummary<'a> {
    fn new(unit: &'a SourceUnit) -> Self {
        Self {
            id: &unit.id,
            name: &unit.name,
            signature: &unit.signature,
            return_type: unit.return_type.as_deref(),
            parameters: unit.parameter_list(),
            namespace: unit.namespace.as_deref(),
            class_name: unit.class_name.as_deref(),
            algorithm_keywords: &unit.algorithm_keywords,
            uses_math: unit.uses_math,
            has_doc_comment: unit.doc_comment.is_some(),
            body_preview: unit.body.chars().take(BODY_PREVIEW_CHARS).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExtractionDump<'a> {
    files_read: usize,
    unit_count: usize,
    units: Vec<UnitSummary<'a>>,
    skipped: &'a [SkippedFile],
}

pub fn run(config: Option<PathBuf>, source: Option<PathBuf>) -> Result<()> {
    let overrides = Overrides {
        source,
        ..Default::default()
    };
    let config = load_config(config.as_deref(), &overrides)?;
    let extraction = UnitExtractor::new(&config.sources).extract_all()?;

    let dump = ExtractionDump {
        files_read: extraction.files_read,
        unit_count: extraction.units.len(),
        units: extraction.units.iter().map(UnitSummary::new).collect(),
        skipped: &extraction.skipped,
    };
    println!("{}", serde_json::to_string_pretty(&dump)?);
    Ok(())
}
