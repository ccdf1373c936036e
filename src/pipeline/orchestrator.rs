//! Run Orchestrator
//!
//! Drives every unit through retrieve → compose → generate → materialize
//! with at most `concurrency` unit pipelines in flight. Units are pulled
//! lazily from the extractor, and each one ends in exactly one report entry.

use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use super::cancel::CancellationToken;
use super::report::{ReportBuilder, RunMeta, RunReport, UnitRecord, UnitStatus};
use super::state::{UnitMachine, UnitState};
use crate::ai::{Composer, Gateway, GenerationResult, SharedProvider};
use crate::config::{Config, QueryMode, RetrievalConfig};
use crate::constants::prompt::{AUX_MAX_OUTPUT_TOKENS, NOT_RELEVANT_MARKER};
use crate::corpus::CorpusIndex;
use crate::output::Materializer;
use crate::retrieval::{RetrievalResult, query_for, retrieve_text};
use crate::types::{FailureKind, PaperdocError, Result, SourceUnit};

/// Owns the shared read-only stages of one run
pub struct Orchestrator {
    index: Arc<CorpusIndex>,
    composer: Arc<Composer>,
    gateway: Gateway,
    materializer: Arc<Materializer>,
    retrieval: RetrievalConfig,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        index: Arc<CorpusIndex>,
        composer: Composer,
        gateway: Gateway,
        materializer: Materializer,
    ) -> Self {
        let cancel = CancellationToken::new();
        Self {
            index,
            composer: Arc::new(composer),
            gateway: gateway.with_cancellation(cancel.clone()),
            materializer: Arc::new(materializer),
            retrieval: RetrievalConfig::default(),
            concurrency: 1,
            cancel,
        }
    }

    pub fn from_config(
        config: &Config,
        index: Arc<CorpusIndex>,
        provider: SharedProvider,
    ) -> Result<Self> {
        Ok(Self::new(
            index,
            Composer::from_config(&config.prompt)?,
            Gateway::from_config(provider, &config.llm),
            Materializer::from_config(&config.output),
        )
        .with_retrieval(config.retrieval.clone())
        .with_concurrency(config.pipeline.concurrency))
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Share an externally owned cancellation token (e.g. Ctrl-C)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.gateway = self.gateway.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every unit to a terminal state and build the report.
    ///
    /// Never fails as a whole: per-unit failures land in the report, and
    /// units still queued when cancellation fires are recorded as cancelled.
    pub async fn run<I>(&self, units: I) -> RunReport
    where
        I: IntoIterator<Item = SourceUnit>,
    {
        self.run_stream(futures::stream::iter(units)).await
    }

    /// [`Self::run`] over units produced asynchronously, e.g. by
    /// [`UnitStream::spawn`](crate::analyzer::UnitStream::spawn).
    #[instrument(skip_all, fields(concurrency = self.concurrency, index = %self.index.id()))]
    pub async fn run_stream<S>(&self, units: S) -> RunReport
    where
        S: Stream<Item = SourceUnit>,
    {
        info!(
            provider = self.gateway.provider_name(),
            model = self.gateway.model(),
            chunks = self.index.len(),
            "Starting documentation run"
        );

        let report = ReportBuilder::new();
        let report_ref = &report;
        {
            let mut pipelines = std::pin::pin!(
                units
                    .map(move |unit| self.process(unit, report_ref))
                    .buffer_unordered(self.concurrency)
            );
            while pipelines.next().await.is_some() {}
        }

        let report = report.finish(RunMeta {
            provider: self.gateway.provider_name().to_string(),
            model: self.gateway.model().to_string(),
            index: Some(self.index.id()),
            corpus: self.index.stats().clone(),
        });

        info!(
            outcome = %report.outcome,
            total = report.summary.total,
            done = report.summary.done,
            failed = report.summary.failed,
            cancelled = report.summary.cancelled,
            grounded = report.summary.grounded,
            duration_ms = report.duration_ms,
            "Documentation run finished"
        );
        report
    }

    async fn process(&self, unit: SourceUnit, report: &ReportBuilder) {
        let started = Instant::now();
        let mut machine = UnitMachine::new(unit.id.clone());

        let mut record = match self.drive(&unit, &mut machine).await {
            Ok(record) => record,
            Err(e) => {
                error!(unit = %unit.id, error = %e, "Unit pipeline error");
                UnitRecord::new(UnitStatus::Failed(e.failure_kind())).with_message(e.to_string())
            }
        };
        record.latency_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = report.record(unit.id, record) {
            error!(error = %e, "Unit reported twice");
        }
    }

    #[instrument(skip_all, fields(unit = %unit.id))]
    async fn drive(&self, unit: &SourceUnit, machine: &mut UnitMachine) -> Result<UnitRecord> {
        if self.cancel.is_cancelled() {
            machine.advance(UnitState::Cancelled)?;
            return Ok(UnitRecord::new(UnitStatus::Cancelled));
        }

        machine.advance(UnitState::Retrieving)?;
        let retrieval = self.retrieve(unit).await;

        machine.advance(UnitState::Composing)?;
        let prompt = match self.composer.compose(unit, &retrieval) {
            Ok(prompt) => prompt,
            Err(e) => return self.fail_before_generation(unit, machine, e),
        };

        if self.cancel.is_cancelled() {
            machine.advance(UnitState::Cancelled)?;
            return Ok(UnitRecord::new(UnitStatus::Cancelled));
        }

        machine.advance(UnitState::Generating)?;
        let result = self.gateway.generate(&prompt).await;

        let mut record = match &result {
            GenerationResult::Cancelled { attempts } => {
                machine.advance(UnitState::Cancelled)?;
                let mut record = UnitRecord::new(UnitStatus::Cancelled);
                record.attempts = *attempts;
                return Ok(record);
            }
            GenerationResult::Success(_) => UnitRecord::new(UnitStatus::Done),
            GenerationResult::Failure(failure) => {
                UnitRecord::new(UnitStatus::Failed(failure.kind))
                    .with_message(failure.message.clone())
            }
        };
        record.attempts = result.attempts();
        record.chunks = prompt.chunks.clone();

        machine.advance(UnitState::Materializing)?;
        match self.materializer.materialize(unit, &result, &prompt.chunks) {
            Ok(outcome) => {
                record.artifact = outcome.path().map(|p| p.to_path_buf());
            }
            Err(e) => {
                warn!(error = %e, "Materialization failed");
                record.status = UnitStatus::Failed(FailureKind::MaterializationFailure);
                record.message = Some(e.to_string());
                record.artifact = None;
            }
        }

        match record.status {
            UnitStatus::Done => machine.advance(UnitState::Done)?,
            UnitStatus::Failed(kind) => machine.advance(UnitState::Failed(kind))?,
            UnitStatus::Cancelled => machine.advance(UnitState::Cancelled)?,
        }
        debug!(state = %machine.state(), attempts = record.attempts, "Unit finished");
        Ok(record)
    }

    fn fail_before_generation(
        &self,
        unit: &SourceUnit,
        machine: &mut UnitMachine,
        err: PaperdocError,
    ) -> Result<UnitRecord> {
        let kind = err.failure_kind();
        warn!(kind = %kind, error = %err, "Unit skipped");
        machine.advance(UnitState::Failed(kind))?;

        let mut record = UnitRecord::new(UnitStatus::Failed(kind)).with_message(err.to_string());
        match self.materializer.write_placeholder(unit, kind) {
            Ok(outcome) => record.artifact = outcome.path().map(|p| p.to_path_buf()),
            Err(e) => warn!(error = %e, "Could not write failure placeholder"),
        }
        Ok(record)
    }

    /// Retrieval never fails a unit: any problem degrades it to ungrounded
    async fn retrieve(&self, unit: &SourceUnit) -> RetrievalResult {
        let ungrounded = || RetrievalResult::ungrounded(self.index.id());
        if self.retrieval.top_k == 0 || self.index.is_empty() {
            return ungrounded();
        }

        let query = match self.retrieval.query_mode {
            QueryMode::Code => query_for(unit),
            QueryMode::Described => self.describe(unit).await,
        };

        let result = match retrieve_text(
            &query,
            &self.index,
            self.retrieval.top_k,
            self.retrieval.min_score,
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Query encoding failed; generating without paper context");
                return ungrounded();
            }
        };

        if self.retrieval.relevance_gate && !result.is_empty() && !self.is_relevant(unit, &result).await {
            debug!(hits = result.len(), "Context judged not relevant");
            return ungrounded();
        }
        result
    }

    /// Short description used as the query in `described` mode
    async fn describe(&self, unit: &SourceUnit) -> String {
        let prompt = self.composer.describe_prompt(unit);
        match self.gateway.ask(&prompt, AUX_MAX_OUTPUT_TOKENS).await {
            Ok(description) if !description.trim().is_empty() => description,
            Ok(_) => query_for(unit),
            Err(e) => {
                warn!(error = %e, "Description failed; querying with code");
                query_for(unit)
            }
        }
    }

    async fn is_relevant(&self, unit: &SourceUnit, result: &RetrievalResult) -> bool {
        let prompt = self.composer.relevance_prompt(unit, result);
        match self.gateway.ask(&prompt, AUX_MAX_OUTPUT_TOKENS).await {
            Ok(answer) => !answer.to_uppercase().contains(NOT_RELEVANT_MARKER),
            Err(e) => {
                warn!(error = %e, "Relevance check failed; keeping context");
                true
            }
        }
    }
}
