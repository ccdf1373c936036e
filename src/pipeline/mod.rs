//! Documentation Pipeline
//!
//! Per-unit state machine, bounded-concurrency orchestration, and the
//! run report every unit ends up in.

mod cancel;
pub mod orchestrator;
pub mod report;
pub mod state;

pub use cancel::CancellationToken;
pub use orchestrator::Orchestrator;
pub use report::{
    ReportBuilder, RunMeta, RunOutcome, RunReport, RunSummary, UnitEntry, UnitRecord, UnitStatus,
};
pub use state::{UnitMachine, UnitState};
