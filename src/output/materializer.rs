//! Documentation Materializer
//!
//! Writes one markdown artifact per documented unit under
//! `<root>/functions/<source path>/<qualified name>__<hash>.md`.
//!
//! The path is a pure function of the unit identity: every component is
//! sanitized the same way and a short sha256 of the full identity keeps
//! overloads and same-named units apart. Content is deterministic, so
//! re-materializing an unchanged unit leaves the artifact byte-identical.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::ai::GenerationResult;
use crate::config::OutputConfig;
use crate::constants::output::{FUNCTIONS_DIR, IDENTITY_HASH_HEX, MAX_NAME_CHARS};
use crate::types::{ChunkId, FailureKind, PaperdocError, Result, SourceUnit, UnitId};

/// What happened to a unit's artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "path", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// New or changed content written
    Written(PathBuf),
    /// Identical artifact already present
    Unchanged(PathBuf),
    /// Failure placeholder written
    Placeholder(PathBuf),
    /// Nothing written
    Skipped,
}

impl WriteOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Written(p) | Self::Unchanged(p) | Self::Placeholder(p) => Some(p),
            Self::Skipped => None,
        }
    }
}

/// Writes unit artifacts under an output root
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    write_placeholder: bool,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>, write_placeholder: bool) -> Self {
        Self {
            root: root.into(),
            write_placeholder,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.dir, config.write_failure_placeholder)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute artifact path for `id`
    pub fn artifact_path(&self, id: &UnitId) -> PathBuf {
        self.root.join(artifact_relative_path(id))
    }

    /// Persist the outcome of one unit's generation.
    ///
    /// `chunks` are the paper chunks the prompt was grounded on.
    pub fn materialize(
        &self,
        unit: &SourceUnit,
        result: &GenerationResult,
        chunks: &[ChunkId],
    ) -> Result<WriteOutcome> {
        match result {
            GenerationResult::Success(generation) => {
                let content = render_artifact(
                    unit,
                    &generation.text,
                    chunks,
                    &format!("{}/{}", generation.provider, generation.model),
                );
                let path = self.artifact_path(&unit.id);
                if write_if_changed(&path, &content)? {
                    debug!(unit = %unit.id, path = %path.display(), "Artifact written");
                    Ok(WriteOutcome::Written(path))
                } else {
                    debug!(unit = %unit.id, "Artifact unchanged");
                    Ok(WriteOutcome::Unchanged(path))
                }
            }
            GenerationResult::Failure(failure) => self.write_placeholder(unit, failure.kind),
            GenerationResult::Cancelled { .. } => Ok(WriteOutcome::Skipped),
        }
    }

    /// Placeholder for a failed unit, when enabled
    pub fn write_placeholder(&self, unit: &SourceUnit, kind: FailureKind) -> Result<WriteOutcome> {
        if !self.write_placeholder {
            return Ok(WriteOutcome::Skipped);
        }
        let path = self.artifact_path(&unit.id);
        write_if_changed(&path, &render_placeholder(unit, kind))?;
        warn!(unit = %unit.id, kind = %kind, "Wrote failure placeholder");
        Ok(WriteOutcome::Placeholder(path))
    }
}

/// Artifact path relative to the output root
pub fn artifact_relative_path(id: &UnitId) -> PathBuf {
    let mut path = PathBuf::from(FUNCTIONS_DIR);
    for component in id.file.split(['/', '\\']).filter(|c| !c.is_empty()) {
        path.push(sanitize_component(component));
    }
    let name = sanitize_component(&id.qualified_name.replace("::", "."));
    path.push(format!("{}__{}.md", name, identity_hash(id)));
    path
}

/// Short hex digest of every identity field
fn identity_hash(id: &UnitId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.file.as_bytes());
    hasher.update([0]);
    hasher.update(id.qualified_name.as_bytes());
    hasher.update([0]);
    for n in [id.start_line, id.end_line, id.start_byte, id.end_byte] {
        hasher.update((n as u64).to_le_bytes());
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(IDENTITY_HASH_HEX);
    hex
}

/// Keep `[A-Za-z0-9._-]`, map everything else to `_`, never yield `.`/`..`
fn sanitize_component(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();
    if out.is_empty() || out.chars().all(|c| c == '.') {
        out = out.replace('.', "_");
        if out.is_empty() {
            out.push('_');
        }
    }
    out
}

fn render_artifact(unit: &SourceUnit, text: &str, chunks: &[ChunkId], generator: &str) -> String {
    let mut content = String::new();
    content.push_str(text.trim());
    content.push_str("\n\n---\n\n");
    content.push_str(&provenance(unit, chunks));
    content.push_str(&format!("- Generated by: `{}`\n", generator));
    content
}

fn render_placeholder(unit: &SourceUnit, kind: FailureKind) -> String {
    format!(
        "# {}\n\nDocumentation unavailable: `failed:{}`\n\n---\n\n{}",
        unit.qualified_name(),
        kind,
        provenance(unit, &[])
    )
}

fn provenance(unit: &SourceUnit, chunks: &[ChunkId]) -> String {
    let papers = if chunks.is_empty() {
        "none (ungrounded)".to_string()
    } else {
        chunks
            .iter()
            .map(|c| format!("`{}`", c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "- Source: `{}` lines {}-{}\n- Function: `{}`\n- Paper chunks: {}\n",
        unit.file(),
        unit.id.start_line,
        unit.id.end_line,
        unit.qualified_name(),
        papers
    )
}

/// Write via temp file + rename; returns false when content is already there
fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    let fail = |e: std::io::Error| PaperdocError::Materialization {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Ok(existing) = std::fs::read(path)
        && existing == content.as_bytes()
    {
        return Ok(false);
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(fail)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, content).map_err(fail)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(fail(e));
    }
    Ok(true)
}
