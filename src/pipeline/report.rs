//! Run report
//!
//! The only mutable state shared between unit pipelines. Each unit is
//! recorded exactly once; a second record for the same unit is rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Serialize, Serializer};

use crate::analyzer::SkippedFile;
use crate::corpus::CorpusStats;
use crate::types::{ChunkId, FailureKind, IndexId, PaperdocError, Result, UnitId};

/// Terminal status of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Done,
    Failed(FailureKind),
    Cancelled,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Failed(kind) => write!(f, "failed:{}", kind),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl Serialize for UnitStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What the run recorded for one unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitRecord {
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Provider calls made for the documentation prompt
    pub attempts: u32,
    /// Chunks the prompt was grounded on
    pub chunks: Vec<ChunkId>,
    pub latency_ms: u64,
}

impl UnitRecord {
    pub fn new(status: UnitStatus) -> Self {
        Self {
            status,
            message: None,
            artifact: None,
            attempts: 0,
            chunks: Vec::new(),
            latency_ms: 0,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_grounded(&self) -> bool {
        !self.chunks.is_empty()
    }
}

/// One report entry, serialized flat
#[derive(Debug, Clone, Serialize)]
pub struct UnitEntry {
    pub unit: UnitId,
    #[serde(flatten)]
    pub record: UnitRecord,
}

/// Overall verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every unit done
    Complete,
    /// Some units done, some not
    Partial,
    /// No unit done
    Failed,
    /// Nothing to document
    Empty,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Empty => "empty",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Done units whose prompt carried paper context
    pub grounded: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
}

impl RunSummary {
    fn from_entries(entries: &[UnitEntry]) -> Self {
        let mut summary = Self {
            total: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            match entry.record.status {
                UnitStatus::Done => {
                    summary.done += 1;
                    if entry.record.is_grounded() {
                        summary.grounded += 1;
                    }
                }
                UnitStatus::Failed(kind) => {
                    summary.failed += 1;
                    *summary.failures_by_kind.entry(kind).or_default() += 1;
                }
                UnitStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.total == 0 {
            RunOutcome::Empty
        } else if self.done == self.total {
            RunOutcome::Complete
        } else if self.done == 0 {
            RunOutcome::Failed
        } else {
            RunOutcome::Partial
        }
    }
}

/// Concurrent append-once collector
#[derive(Debug)]
pub struct ReportBuilder {
    started_at: DateTime<Utc>,
    entries: DashMap<UnitId, UnitRecord>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            entries: DashMap::new(),
        }
    }

    /// Record a unit's terminal state. Fails if the unit is already recorded.
    pub fn record(&self, unit: UnitId, record: UnitRecord) -> Result<()> {
        match self.entries.entry(unit) {
            Entry::Occupied(existing) => Err(PaperdocError::InvalidTransition {
                unit: existing.key().to_string(),
                from: existing.get().status.to_string(),
                to: record.status.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self, meta: RunMeta) -> RunReport {
        let mut units: Vec<UnitEntry> = self
            .entries
            .into_iter()
            .map(|(unit, record)| UnitEntry { unit, record })
            .collect();
        units.sort_by(|a, b| a.unit.cmp(&b.unit));

        let summary = RunSummary::from_entries(&units);
        let finished_at = Utc::now();
        RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: self.started_at,
            finished_at,
            duration_ms: (finished_at - self.started_at).num_milliseconds().max(0) as u64,
            outcome: summary.outcome(),
            provider: meta.provider,
            model: meta.model,
            index: meta.index,
            corpus: meta.corpus,
            skipped_files: Vec::new(),
            summary,
            units,
        }
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Run-level context stamped onto the report
#[derive(Debug, Clone, Default)]
pub struct RunMeta {
    pub provider: String,
    pub model: String,
    pub index: Option<IndexId>,
    pub corpus: CorpusStats,
}

/// Final outcome of a run, ordered by unit identity
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexId>,
    pub corpus: CorpusStats,
    /// Source files that contributed no units
    pub skipped_files: Vec<SkippedFile>,
    pub summary: RunSummary,
    pub units: Vec<UnitEntry>,
}

impl RunReport {
    pub fn with_skipped(mut self, skipped: Vec<SkippedFile>) -> Self {
        self.skipped_files = skipped;
        self
    }

    /// Terminal status for `unit`, if it was part of the run
    pub fn status_of(&self, unit: &UnitId) -> Option<UnitStatus> {
        self.units
            .binary_search_by(|e| e.unit.cmp(unit))
            .ok()
            .map(|i| self.units[i].record.status)
    }

    /// Unit identity to terminal status
    pub fn statuses(&self) -> BTreeMap<&UnitId, UnitStatus> {
        self.units
            .iter()
            .map(|e| (&e.unit, e.record.status))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as JSON, creating parent directories
    pub fn write(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::unit::fixtures;

    fn id(name: &str) -> UnitId {
        fixtures::unit("a.cpp", name, "{}").id
    }

    fn done(grounded: bool) -> UnitRecord {
        let mut record = UnitRecord::new(UnitStatus::Done);
        if grounded {
            record.chunks.push(ChunkId::new("p", 0));
        }
        record
    }

    #[test]
    fn test_append_once() {
        let builder = ReportBuilder::new();
        builder.record(id("f"), done(false)).unwrap();
        let err = builder
            .record(id("f"), UnitRecord::new(UnitStatus::Cancelled))
            .unwrap_err();
        assert!(matches!(err, PaperdocError::InvalidTransition { .. }));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_entries_sorted_by_identity() {
        let builder = ReportBuilder::new();
        builder.record(id("zeta"), done(false)).unwrap();
        builder.record(id("alpha"), done(true)).unwrap();
        builder.record(id("mid"), done(false)).unwrap();

        let report = builder.finish(RunMeta::default());
        let names: Vec<_> = report
            .units
            .iter()
            .map(|e| e.unit.qualified_name.as_str())
            .collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
        assert_eq!(report.summary.grounded, 1);
        assert_eq!(report.status_of(&id("mid")), Some(UnitStatus::Done));
        assert_eq!(report.status_of(&id("missing")), None);
    }

    #[test]
    fn test_outcomes() {
        let empty = ReportBuilder::new().finish(RunMeta::default());
        assert_eq!(empty.outcome, RunOutcome::Empty);

        let builder = ReportBuilder::new();
        builder.record(id("a"), done(false)).unwrap();
        builder
            .record(
                id("b"),
                UnitRecord::new(UnitStatus::Failed(FailureKind::UnitTooLarge)),
            )
            .unwrap();
        let partial = builder.finish(RunMeta::default());
        assert_eq!(partial.outcome, RunOutcome::Partial);
        assert_eq!(
            partial.summary.failures_by_kind.get(&FailureKind::UnitTooLarge),
            Some(&1)
        );

        let builder = ReportBuilder::new();
        builder
            .record(id("a"), UnitRecord::new(UnitStatus::Cancelled))
            .unwrap();
        assert_eq!(builder.finish(RunMeta::default()).outcome, RunOutcome::Failed);
    }

    #[test]
    fn test_status_strings_in_json() {
        let builder = ReportBuilder::new();
        builder.record(id("a"), done(false)).unwrap();
        builder
            .record(
                id("b"),
                UnitRecord::new(UnitStatus::Failed(FailureKind::ProviderTransient))
                    .with_message("retries exhausted"),
            )
            .unwrap();
        builder
            .record(id("c"), UnitRecord::new(UnitStatus::Cancelled))
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&builder.finish(RunMeta::default()).to_json().unwrap()).unwrap();
        assert_eq!(json["outcome"], "partial");
        assert_eq!(json["units"][0]["status"], "done");
        assert_eq!(json["units"][1]["status"], "failed:ProviderTransient");
        assert_eq!(json["units"][2]["status"], "cancelled");
        assert_eq!(json["units"][0]["unit"]["qualified_name"], "a");
        assert_eq!(json["summary"]["failures_by_kind"]["ProviderTransient"], 1);
    }

    #[test]
    fn test_write_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/report.json");
        ReportBuilder::new()
            .finish(RunMeta::default())
            .write(&path)
            .unwrap();
        assert!(path.exists());
    }
}
