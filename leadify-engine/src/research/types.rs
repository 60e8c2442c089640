//! Types for the research orchestration engine

use chrono::{DateTime, Utc};
use leadify_core::Assignment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute names used across extraction, merging and tiering
pub mod fields {
    pub const INDUSTRY: &str = "industry";
    pub const SIZE: &str = "size";
    pub const WEBSITE: &str = "website";
    pub const DECISION_MAKERS: &str = "decision_makers";
    pub const NEED_SIGNALS: &str = "need_signals";
    pub const CONTACTS: &str = "contacts";

    /// List-valued attributes that must all be present (with location and
    /// corroboration) for an entity to classify as Hot
    pub const REQUIRED_FOR_HOT: [&str; 3] = [DECISION_MAKERS, NEED_SIGNALS, CONTACTS];

    /// Every attribute the extraction instruction asks for
    pub const ALL: [&str; 6] = [
        INDUSTRY,
        SIZE,
        WEBSITE,
        DECISION_MAKERS,
        NEED_SIGNALS,
        CONTACTS,
    ];
}

/// Orchestrator state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Init,
    Running,
    Paused,
    Complete,
    Aborted,
    Failed,
}

impl ResearchStatus {
    /// Terminal states never transition again within a run; only Complete
    /// also blocks resumption.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResearchStatus::Complete | ResearchStatus::Aborted | ResearchStatus::Failed
        )
    }
}

impl std::fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResearchStatus::Init => "init",
            ResearchStatus::Running => "running",
            ResearchStatus::Paused => "paused",
            ResearchStatus::Complete => "complete",
            ResearchStatus::Aborted => "aborted",
            ResearchStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One closed research cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    /// 0-based ordinal within the assignment
    pub index: usize,
    /// Queries issued this cycle, in dispatch order
    pub queries: Vec<String>,
    /// URLs visited this cycle, in acceptance-check order
    pub visited_urls: Vec<String>,
    pub sources_accepted: usize,
    pub sources_rejected: usize,
    /// Entities created by this cycle's merges
    pub new_entities: usize,
    /// Existing entities enriched by this cycle's merges
    pub updated_entities: usize,
    pub summary: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Cycle {
    /// Merge activity this cycle produced; two consecutive zero-yield
    /// cycles trigger the diminishing-returns stop.
    pub fn yield_count(&self) -> usize {
        self.new_entities + self.updated_entities
    }
}

/// Accept/reject decision for an evaluated source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceDecision {
    Accepted,
    Rejected { reason: String },
}

/// A fetched page under evaluation. Discarded after extraction; only the
/// extracted facts survive into the store.
#[derive(Debug, Clone)]
pub struct CandidateSource {
    pub url: String,
    pub title: Option<String>,
    pub query: String,
    pub score: f64,
    pub decision: SourceDecision,
}

/// Result of scoring a source against the evaluation rubric
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Quality score in [0, 10]
    pub score: f64,
    pub accepted: bool,
    /// Rejection reason, or the model's stated rationale
    pub reason: Option<String>,
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Text(s) => s.trim().is_empty(),
            AttributeValue::List(items) => items.is_empty(),
        }
    }
}

/// An attribute with the extraction confidence that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub value: AttributeValue,
    pub confidence: f64,
}

/// Where a fact came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub url: String,
    pub cycle: usize,
    pub confidence: f64,
}

/// A deduplicated, merged entity in the finding store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
    #[serde(default)]
    pub first_seen_cycle: usize,
}

impl EntityRecord {
    /// Non-empty attribute lookup
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name).filter(|a| !a.value.is_empty())
    }

    /// Count of distinct source URLs backing this entity
    pub fn distinct_sources(&self) -> usize {
        let mut urls: Vec<&str> = self.provenance.iter().map(|p| p.url.as_str()).collect();
        urls.sort_unstable();
        urls.dedup();
        urls.len()
    }

    /// Classify by completeness and strength of evidence
    pub fn tier(&self) -> Tier {
        let identity = self.location.is_some();
        let required_present = fields::REQUIRED_FOR_HOT
            .iter()
            .all(|f| self.attribute(f).is_some());

        if identity && required_present && self.distinct_sources() >= 2 {
            return Tier::Hot;
        }

        let any_substance = fields::ALL.iter().any(|f| self.attribute(f).is_some());
        if identity && any_substance {
            return Tier::Warm;
        }

        Tier::Cold
    }
}

/// Evidence tier for report segmentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// All required fields present with corroborating sources
    Hot,
    /// Core identity known, some fields missing
    Warm,
    /// Weak signal only
    Cold,
}

/// Outcome of merging one candidate record into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Per-field completeness gaps, read by the query generator
#[derive(Debug, Clone, Default)]
pub struct GapSummary {
    pub total_entities: usize,
    /// Attribute name -> number of entities missing it
    pub missing: BTreeMap<String, usize>,
}

impl GapSummary {
    /// Render gaps as prompt-friendly lines, worst first
    pub fn describe(&self) -> String {
        if self.total_entities == 0 {
            return String::new();
        }
        let mut entries: Vec<(&String, &usize)> = self
            .missing
            .iter()
            .filter(|(_, count)| **count > 0)
            .collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        entries
            .iter()
            .map(|(field, count)| {
                let pct = **count * 100 / self.total_entities;
                format!("{} missing for {}% ({}/{})", field, pct, count, self.total_entities)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Durable snapshot of orchestration state, written at the end of every
/// cycle. New fields must carry `#[serde(default)]` so older checkpoints
/// stay readable; unknown fields are ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "default_checkpoint_version")]
    pub version: u32,
    pub signature: String,
    pub assignment: Assignment,
    pub status: ResearchStatus,
    pub cycles: Vec<Cycle>,
    pub entities: Vec<EntityRecord>,
    /// Every query issued across all cycles, in order
    #[serde(default)]
    pub issued_queries: Vec<String>,
    #[serde(default)]
    pub elapsed_secs: u64,
    pub updated_at: DateTime<Utc>,
}

pub const CHECKPOINT_VERSION: u32 = 1;

fn default_checkpoint_version() -> u32 {
    CHECKPOINT_VERSION
}

/// Read-only view of the final store, segmented for the report compiler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub objective: String,
    pub hot: Vec<EntityRecord>,
    pub warm: Vec<EntityRecord>,
    pub cold: Vec<EntityRecord>,
    pub cycles_run: usize,
    pub sources_accepted: usize,
    pub sources_rejected: usize,
    pub elapsed_secs: u64,
    pub generated_at: DateTime<Utc>,
}

impl ReportSnapshot {
    pub fn total_entities(&self) -> usize {
        self.hot.len() + self.warm.len() + self.cold.len()
    }
}

/// What a finished (or suspended) run hands back to the caller
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub status: ResearchStatus,
    pub snapshot: ReportSnapshot,
    pub cycles_run: usize,
    pub elapsed_secs: u64,
}
