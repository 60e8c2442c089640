//! Research orchestration state machine
//!
//! A single logical worker drives the cycle loop: generate queries ->
//! search -> fetch -> evaluate -> extract -> merge -> checkpoint -> decide
//! continue/stop. Page fetches run with bounded, order-preserving
//! concurrency; all LLM calls are serialized because the shared local
//! model cannot serve concurrent requests. Findings merge in source
//! acceptance order, so identical inputs always produce identical state.

use super::checkpoint::CheckpointStore;
use super::evaluator::{EvaluatorSettings, SourceEvaluator};
use super::extraction::ExtractionAdapter;
use super::prompts::PromptLibrary;
use super::query::{normalize_query, QueryGenerator};
use super::store::FindingStore;
use super::types::{
    CandidateSource, Checkpoint, Cycle, ResearchOutcome, ResearchStatus, SourceDecision,
    CHECKPOINT_VERSION,
};
use crate::{EngineError, EngineResult};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use leadify_core::{
    Assignment, EngineConfig, FetchedPage, LanguageModel, LeadifyConfig, LeadifyError,
    PageFetcher, RetryConfig, SearchHit, SearchProvider,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// External control signal, checked between sources within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Run,
    Pause,
    Abort,
}

/// Handle for pausing, resuming or aborting a running orchestrator
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: watch::Sender<ControlSignal>,
}

impl ControlHandle {
    pub fn pause(&self) {
        let _ = self.tx.send(ControlSignal::Pause);
    }

    pub fn resume(&self) {
        let _ = self.tx.send(ControlSignal::Run);
    }

    pub fn abort(&self) {
        let _ = self.tx.send(ControlSignal::Abort);
    }
}

/// Create a control handle and the receiver an orchestrator watches
pub fn control_channel() -> (ControlHandle, watch::Receiver<ControlSignal>) {
    let (tx, rx) = watch::channel(ControlSignal::Run);
    (ControlHandle { tx }, rx)
}

/// Collaborator-facing knobs the orchestrator needs beyond `EngineConfig`
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub engine: EngineConfig,
    /// Search results requested per query
    pub results_per_query: usize,
    /// Concurrent page fetches within a cycle
    pub fetch_concurrency: usize,
}

impl OrchestratorOptions {
    pub fn from_config(config: &LeadifyConfig) -> Self {
        Self {
            engine: config.engine.clone(),
            results_per_query: config.search.results_per_query,
            fetch_concurrency: config.fetch.concurrency,
        }
    }
}

/// The cycle state machine. Owns the finding store and the checkpoint
/// lifecycle; nothing else writes either.
pub struct ResearchOrchestrator {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    queries: QueryGenerator,
    evaluator: SourceEvaluator,
    extractor: ExtractionAdapter,
    checkpoints: CheckpointStore,
    options: OrchestratorOptions,
    control: watch::Receiver<ControlSignal>,
    consecutive_llm_failures: usize,
}

/// Mutable per-run state threaded through the cycle loop
struct RunState {
    assignment: Assignment,
    signature: String,
    status: ResearchStatus,
    store: FindingStore,
    cycles: Vec<Cycle>,
    issued_queries: Vec<String>,
    issued_normalized: HashSet<String>,
    visited_urls: HashSet<String>,
    zero_yield_streak: usize,
    base_elapsed_secs: u64,
    run_started: Instant,
}

impl RunState {
    fn fresh(assignment: Assignment, signature: String) -> Self {
        Self {
            assignment,
            signature,
            status: ResearchStatus::Init,
            store: FindingStore::new(),
            cycles: Vec::new(),
            issued_queries: Vec::new(),
            issued_normalized: HashSet::new(),
            visited_urls: HashSet::new(),
            zero_yield_streak: 0,
            base_elapsed_secs: 0,
            run_started: Instant::now(),
        }
    }

    fn resume(checkpoint: Checkpoint, signature: String) -> Self {
        let issued_normalized = checkpoint
            .issued_queries
            .iter()
            .map(|q| normalize_query(q))
            .collect();
        let visited_urls = checkpoint
            .cycles
            .iter()
            .flat_map(|c| c.visited_urls.iter().cloned())
            .collect();

        // Recompute the diminishing-returns streak from the tail of the
        // cycle history so a resumed run stops exactly where an
        // uninterrupted one would.
        let zero_yield_streak = checkpoint
            .cycles
            .iter()
            .rev()
            .take_while(|c| c.yield_count() == 0)
            .count();

        let mut store = FindingStore::from_entities(checkpoint.entities);
        store.restore_source_tallies(
            checkpoint.cycles.iter().map(|c| c.sources_accepted).sum(),
            checkpoint.cycles.iter().map(|c| c.sources_rejected).sum(),
        );

        Self {
            assignment: checkpoint.assignment,
            signature,
            status: ResearchStatus::Init,
            store,
            cycles: checkpoint.cycles,
            issued_queries: checkpoint.issued_queries,
            issued_normalized,
            visited_urls,
            zero_yield_streak,
            base_elapsed_secs: checkpoint.elapsed_secs,
            run_started: Instant::now(),
        }
    }

    fn elapsed_secs(&self) -> u64 {
        self.base_elapsed_secs + self.run_started.elapsed().as_secs()
    }

    fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            signature: self.signature.clone(),
            assignment: self.assignment.clone(),
            status: self.status,
            cycles: self.cycles.clone(),
            entities: self.store.entities().cloned().collect(),
            issued_queries: self.issued_queries.clone(),
            elapsed_secs: self.elapsed_secs(),
            updated_at: Utc::now(),
        }
    }

    fn outcome(&self) -> ResearchOutcome {
        let elapsed = self.elapsed_secs();
        ResearchOutcome {
            status: self.status,
            snapshot: self
                .store
                .snapshot(&self.assignment.objective, self.cycles.len(), elapsed),
            cycles_run: self.cycles.len(),
            elapsed_secs: elapsed,
        }
    }
}

/// How a cycle ended
enum CycleEnd {
    Completed,
    Aborted,
}

impl ResearchOrchestrator {
    /// Build an orchestrator around collaborator implementations.
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        options: OrchestratorOptions,
        checkpoints: CheckpointStore,
        control: watch::Receiver<ControlSignal>,
    ) -> EngineResult<Self> {
        let prompts = Arc::new(PromptLibrary::new()?);

        let evaluator = SourceEvaluator::new(
            llm.clone(),
            prompts.clone(),
            EvaluatorSettings {
                accept_threshold: options.engine.accept_threshold,
                lenient_threshold: options.engine.lenient_threshold,
                lenient_sources: options.engine.lenient_sources.clone(),
                preview_chars: options.engine.evaluation_preview_chars,
            },
        );
        let extractor = ExtractionAdapter::new(
            llm.clone(),
            prompts.clone(),
            options.engine.extraction_token_budget,
        );
        let queries = QueryGenerator::new(llm, prompts);

        Ok(Self {
            search,
            fetcher,
            queries,
            evaluator,
            extractor,
            checkpoints,
            options,
            control,
            consecutive_llm_failures: 0,
        })
    }

    /// Run an assignment to a terminal state (or to the per-run cycle cap).
    ///
    /// Resumes from an existing checkpoint when one matches the
    /// assignment's signature and is not complete. On any exit path a
    /// checkpoint reflecting every fully processed source has been written.
    pub async fn run(&mut self, assignment: Assignment) -> EngineResult<ResearchOutcome> {
        assignment.validate().map_err(|e| {
            let field = match &e {
                LeadifyError::Validation { field, .. } => field.clone(),
                _ => None,
            };
            EngineError::InvalidAssignment {
                message: e.to_string(),
                field,
            }
        })?;

        let signature = assignment.signature();

        let mut state = match self.checkpoints.load_latest(&signature).await? {
            Some(checkpoint) if checkpoint.status == ResearchStatus::Complete => {
                info!(signature = %signature, "Assignment already complete, returning checkpointed result");
                let state = RunState::resume(checkpoint, signature);
                let mut outcome = state.outcome();
                outcome.status = ResearchStatus::Complete;
                return Ok(outcome);
            }
            Some(checkpoint) => {
                info!(
                    signature = %signature,
                    completed_cycles = checkpoint.cycles.len(),
                    entities = checkpoint.entities.len(),
                    "Resuming from checkpoint"
                );
                RunState::resume(checkpoint, signature)
            }
            None => {
                info!(signature = %signature, objective = %assignment.objective, "Starting new research run");
                RunState::fresh(assignment, signature)
            }
        };

        state.status = ResearchStatus::Running;
        let mut cycles_this_run = 0usize;

        loop {
            match self.wait_for_go(&mut state).await {
                ControlSignal::Abort => {
                    state.status = ResearchStatus::Aborted;
                    break;
                }
                _ => {}
            }

            if state.store.len() >= state.assignment.target_count {
                info!(
                    entities = state.store.len(),
                    target = state.assignment.target_count,
                    "Target entity count reached"
                );
                state.status = ResearchStatus::Complete;
                break;
            }
            if state.cycles.len() >= state.assignment.max_cycles {
                info!(cycles = state.cycles.len(), "Cycle budget exhausted");
                state.status = ResearchStatus::Complete;
                break;
            }
            if state.zero_yield_streak >= 2 {
                info!("Two consecutive cycles without new findings, stopping");
                state.status = ResearchStatus::Complete;
                break;
            }
            if let Some(cap) = self.options.engine.cycles_per_run {
                if cycles_this_run >= cap {
                    info!(cap = cap, "Per-run cycle cap reached, suspending");
                    // Not terminal: the next run resumes from checkpoint.
                    break;
                }
            }

            let end = match self.run_cycle(&mut state).await {
                Ok(end) => end,
                Err(e @ EngineError::CollaboratorUnavailable { .. }) => {
                    state.status = ResearchStatus::Failed;
                    self.checkpoints.save(&state.to_checkpoint()).await?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            cycles_this_run += 1;

            if matches!(end, CycleEnd::Aborted) {
                state.status = ResearchStatus::Aborted;
            }
            self.checkpoints.save(&state.to_checkpoint()).await?;

            if matches!(end, CycleEnd::Aborted) {
                break;
            }
        }

        self.checkpoints.save(&state.to_checkpoint()).await?;

        info!(
            status = %state.status,
            cycles = state.cycles.len(),
            entities = state.store.len(),
            "Research run finished"
        );

        Ok(state.outcome())
    }

    /// Execute one cycle: queries -> search -> fetch -> evaluate ->
    /// extract -> merge. Returns whether an abort landed mid-cycle.
    async fn run_cycle(&mut self, state: &mut RunState) -> EngineResult<CycleEnd> {
        let cycle_index = state.cycles.len();
        let started_at = Utc::now();
        info!(cycle = cycle_index, "Starting research cycle");

        // Query generation
        let batch = self
            .queries
            .generate(
                &state.assignment,
                cycle_index,
                &state.store,
                &state.issued_normalized,
            )
            .await?;
        if batch.llm_failed {
            self.note_llm_failure()?;
        } else {
            self.consecutive_llm_failures = 0;
        }
        for query in &batch.queries {
            state.issued_normalized.insert(normalize_query(query));
            state.issued_queries.push(query.clone());
        }

        // Search dispatch, bounded by the per-cycle source budget
        let budget = state.assignment.sources_per_cycle;
        let mut candidates: Vec<(SearchHit, String)> = Vec::new();
        for query in &batch.queries {
            if candidates.len() >= budget {
                break;
            }
            match self.search.search(query, self.options.results_per_query).await {
                Ok(hits) => {
                    for hit in hits {
                        if candidates.len() >= budget {
                            break;
                        }
                        if state.visited_urls.contains(&hit.url)
                            || candidates.iter().any(|(h, _)| h.url == hit.url)
                        {
                            continue;
                        }
                        candidates.push((hit, query.clone()));
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Search failed, skipping query");
                }
            }
        }

        // Concurrent fetch, order preserving so merges stay deterministic
        let retries = self.options.engine.fetch_retries;
        let fetcher = self.fetcher.clone();
        let fetched: Vec<(SearchHit, String, Result<FetchedPage, LeadifyError>)> =
            stream::iter(candidates)
                .map(|(hit, query)| {
                    let fetcher = fetcher.clone();
                    async move {
                        let result = fetch_with_retries(fetcher, hit.url.clone(), retries).await;
                        (hit, query, result)
                    }
                })
                .buffered(self.options.fetch_concurrency.max(1))
                .collect()
                .await;

        // Sequential evaluate/extract/merge in acceptance order
        let mut cycle = Cycle {
            index: cycle_index,
            queries: batch.queries.clone(),
            visited_urls: Vec::new(),
            sources_accepted: 0,
            sources_rejected: 0,
            new_entities: 0,
            updated_entities: 0,
            summary: String::new(),
            started_at,
            finished_at: started_at,
        };
        let mut aborted = false;

        for (hit, query, fetch_result) in fetched {
            // Pause/abort lands between sources, never mid-call
            if matches!(self.wait_for_go(state).await, ControlSignal::Abort) {
                aborted = true;
                break;
            }

            state.visited_urls.insert(hit.url.clone());
            cycle.visited_urls.push(hit.url.clone());

            let page = match fetch_result {
                Ok(page) => page,
                Err(e) => {
                    debug!(url = %hit.url, error = %e, "Source rejected: fetch failed");
                    cycle.sources_rejected += 1;
                    state.store.note_source(false);
                    continue;
                }
            };

            let evaluation = match self
                .evaluator
                .evaluate(&page, &query, &state.assignment)
                .await
            {
                Ok(evaluation) => {
                    self.consecutive_llm_failures = 0;
                    evaluation
                }
                Err(e) => {
                    self.handle_collaborator_error(&e)?;
                    cycle.sources_rejected += 1;
                    state.store.note_source(false);
                    continue;
                }
            };

            // The candidate itself is discarded after this source is
            // processed; only extracted facts survive into the store.
            let candidate = CandidateSource {
                url: page.url.clone(),
                title: page.title.clone(),
                query: query.clone(),
                score: evaluation.score,
                decision: if evaluation.accepted {
                    SourceDecision::Accepted
                } else {
                    SourceDecision::Rejected {
                        reason: evaluation.reason.clone().unwrap_or_default(),
                    }
                },
            };
            debug!(
                url = %candidate.url,
                query = %candidate.query,
                score = candidate.score,
                decision = ?candidate.decision,
                "Source evaluated"
            );

            if !evaluation.accepted {
                cycle.sources_rejected += 1;
                state.store.note_source(false);
                continue;
            }

            cycle.sources_accepted += 1;
            state.store.note_source(true);

            let records = match self
                .extractor
                .extract(&page, &state.assignment, cycle_index)
                .await
            {
                Ok(records) => {
                    self.consecutive_llm_failures = 0;
                    records
                }
                Err(e) => {
                    self.handle_collaborator_error(&e)?;
                    continue;
                }
            };

            for record in records {
                match state.store.merge(record) {
                    super::types::MergeOutcome::Created => cycle.new_entities += 1,
                    super::types::MergeOutcome::Updated => cycle.updated_entities += 1,
                    super::types::MergeOutcome::Unchanged => {}
                }
            }
        }

        cycle.finished_at = Utc::now();
        cycle.summary = format!(
            "{} new entities, {} updated; {} sources accepted, {} rejected",
            cycle.new_entities,
            cycle.updated_entities,
            cycle.sources_accepted,
            cycle.sources_rejected
        );

        if cycle.yield_count() == 0 {
            state.zero_yield_streak += 1;
        } else {
            state.zero_yield_streak = 0;
        }

        info!(
            cycle = cycle_index,
            summary = %cycle.summary,
            total_entities = state.store.len(),
            "Cycle closed"
        );
        state.cycles.push(cycle);

        Ok(if aborted {
            CycleEnd::Aborted
        } else {
            CycleEnd::Completed
        })
    }

    /// Wait while paused; return the first non-pause signal.
    async fn wait_for_go(&mut self, state: &mut RunState) -> ControlSignal {
        loop {
            let signal = *self.control.borrow_and_update();
            match signal {
                ControlSignal::Run => return ControlSignal::Run,
                ControlSignal::Abort => return ControlSignal::Abort,
                ControlSignal::Pause => {
                    if state.status != ResearchStatus::Paused {
                        info!("Research paused");
                        state.status = ResearchStatus::Paused;
                    }
                    if self.control.changed().await.is_err() {
                        // Controller gone; treat as abort
                        return ControlSignal::Abort;
                    }
                    if *self.control.borrow() != ControlSignal::Pause {
                        info!("Research resumed");
                        state.status = ResearchStatus::Running;
                    }
                }
            }
        }
    }

    /// Track consecutive collaborator transport failures; escalate once
    /// the budget is exhausted. Non-LLM errors stay source-scoped.
    fn handle_collaborator_error(&mut self, error: &LeadifyError) -> EngineResult<()> {
        warn!(error = %error, "Collaborator call failed, source rejected");
        if matches!(error, LeadifyError::Llm { .. }) {
            self.note_llm_failure()?;
        }
        Ok(())
    }

    fn note_llm_failure(&mut self) -> EngineResult<()> {
        self.consecutive_llm_failures += 1;
        if self.consecutive_llm_failures >= self.options.engine.llm_failure_budget {
            return Err(EngineError::CollaboratorUnavailable {
                consecutive_failures: self.consecutive_llm_failures,
            });
        }
        Ok(())
    }
}

/// Fetch one URL with the per-source retry budget. Non-retryable failures
/// return immediately.
async fn fetch_with_retries(
    fetcher: Arc<dyn PageFetcher>,
    url: String,
    retries: usize,
) -> Result<FetchedPage, LeadifyError> {
    let retry_config = RetryConfig::per_source(retries + 1);
    let mut attempt = 0;
    let mut delay_ms = retry_config.initial_delay_ms;

    loop {
        attempt += 1;
        match fetcher.fetch(&url).await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_recoverable() && attempt < retry_config.max_attempts => {
                debug!(url = %url, attempt = attempt, error = %e, "Retrying fetch");
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                delay_ms = ((delay_ms as f64) * retry_config.backoff_multiplier) as u64;
                delay_ms = delay_ms.min(retry_config.max_delay_ms);
            }
            Err(e) => return Err(e),
        }
    }
}
