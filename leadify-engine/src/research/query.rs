//! Search-query generation
//!
//! Produces each cycle's batch of distinct queries across three axes:
//! entity discovery, attribute gap-filling, and corroboration. Cycle one
//! biases discovery; later cycles shift toward gap-filling and
//! corroboration, which is what separates this engine from single-pass
//! search. Queries never repeat across cycles of the same assignment.

use super::prompts::PromptLibrary;
use super::store::FindingStore;
use crate::EngineResult;
use leadify_core::{Assignment, LanguageModel, LeadifyError};
use leadify_llm::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A cycle's worth of queries plus how they were obtained
#[derive(Debug, Clone)]
pub struct QueryBatch {
    pub queries: Vec<String>,
    /// True when the LLM call failed at the transport level and the batch
    /// came from templates; feeds the orchestrator's failure budget.
    pub llm_failed: bool,
}

/// Normalized form used for cross-cycle repetition checks
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Generates a diverse, non-repeating query batch per cycle
pub struct QueryGenerator {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptLibrary>,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// Generate up to `sources_per_cycle` distinct queries for this cycle.
    ///
    /// The batch may come up short when the issued-query history has
    /// exhausted the space; the orchestrator's diminishing-returns stop
    /// handles that case.
    pub async fn generate(
        &self,
        assignment: &Assignment,
        cycle_index: usize,
        store: &FindingStore,
        issued: &HashSet<String>,
    ) -> EngineResult<QueryBatch> {
        let budget = assignment.sources_per_cycle;
        let discovery_bias = cycle_index == 0;
        let gaps = store.gap_summary().describe();

        // Only the most recent history goes into the prompt; the full
        // normalized set still backs the repetition filter below.
        let issued_recent: Vec<String> = issued.iter().cloned().take(40).collect();

        let prompt = self.prompts.query_generation(
            assignment,
            cycle_index,
            store.len(),
            &store.identity_keys(),
            &gaps,
            &issued_recent,
            discovery_bias,
        )?;

        let mut llm_failed = false;
        let mut queries: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        match self.llm.generate(self.prompts.system(), &prompt).await {
            Ok(response) => match json::extract_string_array(&response) {
                Some(candidates) => {
                    for candidate in candidates {
                        push_query(&mut queries, &mut seen, issued, candidate, budget);
                    }
                }
                None => {
                    debug!("Query generation response had no JSON array, using templates");
                }
            },
            Err(e) => {
                if matches!(e, LeadifyError::Llm { .. }) {
                    llm_failed = true;
                }
                warn!(error = %e, "Query generation LLM call failed, using templates");
            }
        }

        if queries.len() < budget {
            for candidate in self.fallback_queries(assignment, cycle_index, store) {
                if queries.len() >= budget {
                    break;
                }
                push_query(&mut queries, &mut seen, issued, candidate, budget);
            }
        }

        debug!(
            cycle = cycle_index,
            count = queries.len(),
            budget = budget,
            "Query batch generated"
        );

        Ok(QueryBatch { queries, llm_failed })
    }

    /// Template-based queries used when the LLM output is unusable or too
    /// short. Ordered by the cycle's axis bias.
    fn fallback_queries(
        &self,
        assignment: &Assignment,
        cycle_index: usize,
        store: &FindingStore,
    ) -> Vec<String> {
        let mut discovery = self.discovery_queries(assignment);
        let mut refinement = self.refinement_queries(store);

        let mut out = Vec::new();
        if cycle_index == 0 {
            out.append(&mut discovery);
            out.append(&mut refinement);
        } else {
            out.append(&mut refinement);
            out.append(&mut discovery);
        }
        out
    }

    /// Axis 1: direct entity discovery from the objective and constraints
    fn discovery_queries(&self, assignment: &Assignment) -> Vec<String> {
        let objective = assignment.objective.trim();
        let constraint = assignment.constraints.describe();

        let mut queries = vec![
            objective.to_string(),
            format!("{} list", objective),
            format!("{} directory", objective),
            format!("{} news", objective),
            format!("companies {}", objective),
        ];
        if !constraint.is_empty() {
            queries.push(format!("{} {}", objective, constraint));
        }
        if let Some(ref geo) = assignment.constraints.geography {
            queries.push(format!("{} {}", objective, geo));
            queries.push(format!("{} industry association {}", objective, geo));
        }
        queries
    }

    /// Axes 2 and 3: gap-filling for specific entities, then corroboration
    fn refinement_queries(&self, store: &FindingStore) -> Vec<String> {
        let mut gap_queries = Vec::new();
        let mut corroboration = Vec::new();

        for entity in store.entities() {
            let mut subject = format!("\"{}\"", entity.name);
            if let Some(ref loc) = entity.location {
                subject.push(' ');
                subject.push_str(loc);
            }

            for field in super::types::fields::REQUIRED_FOR_HOT {
                if entity.attribute(field).is_none() {
                    let need = match field {
                        super::types::fields::DECISION_MAKERS => "management team",
                        super::types::fields::CONTACTS => "contact email",
                        _ => "hiring plans",
                    };
                    gap_queries.push(format!("{} {}", subject, need));
                }
            }

            corroboration.push(format!("{} employee reviews", subject));
            corroboration.push(format!("{} company profile", subject));
        }

        gap_queries.extend(corroboration);
        gap_queries
    }
}

fn push_query(
    queries: &mut Vec<String>,
    seen: &mut HashSet<String>,
    issued: &HashSet<String>,
    candidate: String,
    budget: usize,
) {
    if queries.len() >= budget {
        return;
    }
    let candidate = candidate.trim().to_string();
    if candidate.is_empty() {
        return;
    }
    let normalized = normalize_query(&candidate);
    if issued.contains(&normalized) || !seen.insert(normalized) {
        return;
    }
    queries.push(candidate);
}
