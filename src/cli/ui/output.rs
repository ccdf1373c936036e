use console::style;

use crate::pipeline::{RunOutcome, RunReport, UnitStatus};

pub struct Output {
    quiet: bool,
}

impl Output {
    pub fn new() -> Self {
        Self { quiet: false }
    }

    /// Suppress everything except errors
    pub fn quiet(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✓").green(), message);
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    pub fn section(&self, message: &str) {
        if !self.quiet {
            println!("\n{}", style(message).bold());
            println!("{}", "─".repeat(40));
        }
    }

    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        if !self.quiet {
            println!("  {:<14} {}", style(key).dim(), value);
        }
    }

    /// Colored end-of-run summary
    pub fn run_summary(&self, report: &RunReport) {
        let summary = &report.summary;
        self.section("Documentation run");
        self.field("Provider", format!("{} ({})", report.provider, report.model));
        self.field(
            "Papers",
            format!(
                "{} papers, {} chunks",
                report.corpus.papers, report.corpus.chunks
            ),
        );
        self.field("Units", summary.total);
        self.field("Done", style(summary.done).green());
        self.field("Grounded", summary.grounded);
        if summary.failed > 0 {
            self.field("Failed", style(summary.failed).red());
            for (kind, count) in &summary.failures_by_kind {
                self.field("", format!("{}: {}", kind, count));
            }
        }
        if summary.cancelled > 0 {
            self.field("Cancelled", style(summary.cancelled).yellow());
        }
        if !report.skipped_files.is_empty() {
            self.field("Skipped files", report.skipped_files.len());
        }
        self.field("Duration", format!("{:.1}s", report.duration_ms as f64 / 1000.0));

        if !self.quiet {
            for entry in &report.units {
                if let UnitStatus::Failed(_) = entry.record.status {
                    println!(
                        "  {} {} {}",
                        style("✗").red(),
                        entry.unit,
                        style(entry.record.message.as_deref().unwrap_or_default()).dim()
                    );
                }
            }
        }

        match report.outcome {
            RunOutcome::Complete => self.success("All units documented"),
            RunOutcome::Partial => self.warning("Run finished with failures"),
            RunOutcome::Failed => self.error("No unit was documented"),
            RunOutcome::Empty => self.info("No documentable units found"),
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
