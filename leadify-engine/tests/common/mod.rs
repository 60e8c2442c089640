//! Deterministic mock collaborators for engine integration tests
//!
//! The mocks derive every response from their inputs alone, so repeated
//! runs over identical state produce identical results. That property is
//! what the resume-equivalence tests lean on.

use leadify_core::{
    async_trait, Assignment, AssignmentConstraints, EngineConfig, FetchedPage, LanguageModel,
    LeadifyResult, PageFetcher, ResearchDepth, SearchHit, SearchProvider,
};
use leadify_engine::research::orchestrator::{
    control_channel, ControlHandle, OrchestratorOptions, ResearchOrchestrator,
};
use leadify_engine::research::CheckpointStore;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Reduce arbitrary text to a stable [a-z0-9-] token
pub fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Search stub: every query deterministically yields `limit` URLs derived
/// from the query text.
pub struct StubSearch;

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, query: &str, limit: usize) -> LeadifyResult<Vec<SearchHit>> {
        let base = slug(query);
        Ok((0..limit)
            .map(|i| SearchHit {
                url: format!("https://{}.test/doc{}", base, i),
                title: format!("Result {} for {}", i, query),
                snippet: "stub snippet".to_string(),
            })
            .collect())
    }
}

/// Fetch stub: every URL yields a page embedding a company marker derived
/// from the URL, so each distinct URL surfaces a distinct entity.
pub struct StubFetcher;

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> LeadifyResult<FetchedPage> {
        let token = slug(url.trim_start_matches("https://"));
        Ok(FetchedPage {
            url: url.to_string(),
            title: Some(format!("Page {}", token)),
            text: format!(
                "Profile of company-{}. Mid-size manufacturer, hiring, concrete facts inside.",
                token
            ),
        })
    }
}

/// What the extraction branch of the LLM stub should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Return one record named after the company marker in the source text
    FromMarker,
    /// Always report "no relevant entity"
    Empty,
    /// Never produce valid structure
    Malformed,
}

/// Deterministic LLM stub covering the engine's three prompt kinds
pub struct ResearchLlm {
    pub eval_score: f64,
    pub extraction_mode: ExtractionMode,
    /// Fail every call at the transport level when set
    pub fail_transport: bool,
    pub calls: AtomicUsize,
}

impl ResearchLlm {
    pub fn new(eval_score: f64, extraction_mode: ExtractionMode) -> Arc<Self> {
        Arc::new(Self {
            eval_score,
            extraction_mode,
            fail_transport: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            eval_score: 9.0,
            extraction_mode: ExtractionMode::FromMarker,
            fail_transport: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn marker_record(prompt: &str) -> String {
        match prompt.split("company-").nth(1) {
            Some(rest) => {
                let token: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                    .collect();
                format!(
                    r#"[{{"name": "Company {token}", "location": "Osaka",
                        "need_signals": ["hiring English instructors"],
                        "confidence": 0.9}}]"#
                )
            }
            None => "[]".to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for ResearchLlm {
    async fn generate(&self, _system: &str, user: &str) -> LeadifyResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_transport {
            return Err(leadify_core::llm_error!("connection refused", "test_llm"));
        }

        if user.contains("JSON array of strings") {
            // Query generation: a fixed batch; later cycles filter these as
            // repeats and fall back to the engine's own templates.
            return Ok(r#"["alpha query", "beta query", "gamma query", "delta query"]"#
                .to_string());
        }

        if user.contains("scale of 0-10") {
            return Ok(format!(
                r#"{{"score": {}, "reason": "stub evaluation"}}"#,
                self.eval_score
            ));
        }

        // Extraction
        Ok(match self.extraction_mode {
            ExtractionMode::FromMarker => Self::marker_record(user),
            ExtractionMode::Empty => "[]".to_string(),
            ExtractionMode::Malformed => "I am unable to respond in that format.".to_string(),
        })
    }
}

/// Baseline assignment used across the orchestrator tests
pub fn assignment(target_count: usize, max_cycles: usize, sources_per_cycle: usize) -> Assignment {
    Assignment {
        objective: "find manufacturers needing English training".to_string(),
        target_count,
        depth: ResearchDepth::Comprehensive,
        constraints: AssignmentConstraints {
            geography: Some("Osaka".to_string()),
            size_range: None,
            exclusions: vec![],
        },
        max_cycles,
        sources_per_cycle,
    }
}

/// Engine config tuned for tests: tiny budgets, no real thresholds crossed
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        fetch_retries: 1,
        llm_failure_budget: 3,
        accept_threshold: 7.0,
        lenient_threshold: 5.0,
        lenient_sources: vec![],
        extraction_token_budget: 400,
        evaluation_preview_chars: 400,
        cycles_per_run: None,
    }
}

/// Build an orchestrator over the stubs with a checkpoint dir
pub fn orchestrator(
    llm: Arc<dyn LanguageModel>,
    checkpoint_dir: &Path,
    engine: EngineConfig,
) -> (ResearchOrchestrator, ControlHandle) {
    let (handle, control) = control_channel();
    let orchestrator = ResearchOrchestrator::new(
        llm,
        Arc::new(StubSearch),
        Arc::new(StubFetcher),
        OrchestratorOptions {
            engine,
            results_per_query: 2,
            fetch_concurrency: 2,
        },
        CheckpointStore::new(checkpoint_dir).unwrap(),
        control,
    )
    .unwrap();
    (orchestrator, handle)
}
