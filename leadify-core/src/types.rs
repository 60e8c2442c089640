//! Core data type definitions

use crate::error::{ErrorContext, LeadifyError, LeadifyResult};
use crate::validation_error;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Research depth setting for an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    /// Fewer cycles, discovery-heavy, accept first good answer
    Quick,
    /// Full cycle budget with gap-filling and corroboration passes
    #[default]
    Comprehensive,
}

/// Optional constraints narrowing an assignment's search space
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentConstraints {
    /// Geographic focus, e.g. "Tokyo" or "DACH region"
    #[serde(default)]
    pub geography: Option<String>,
    /// Inclusive employee-count range (min, max)
    #[serde(default)]
    pub size_range: Option<(u32, u32)>,
    /// Terms or names to exclude from queries and findings
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl AssignmentConstraints {
    /// Render constraints as a short clause for prompts and queries
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref geo) = self.geography {
            parts.push(format!("located in {}", geo));
        }
        if let Some((lo, hi)) = self.size_range {
            parts.push(format!("{}-{} employees", lo, hi));
        }
        if !self.exclusions.is_empty() {
            parts.push(format!("excluding {}", self.exclusions.join(", ")));
        }
        parts.join("; ")
    }
}

/// A research assignment. Immutable once created; every cycle reads it,
/// nothing mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// Natural-language objective, e.g.
    /// "find 10 mid-size manufacturers needing English training"
    pub objective: String,
    /// Number of distinct entities to find before stopping
    pub target_count: usize,
    /// Research depth setting
    #[serde(default)]
    pub depth: ResearchDepth,
    /// Optional narrowing constraints
    #[serde(default)]
    pub constraints: AssignmentConstraints,
    /// Maximum number of research cycles
    pub max_cycles: usize,
    /// Source budget per cycle (also the query batch size)
    pub sources_per_cycle: usize,
}

/// Wrapper table so assignment files read as `[assignment]` TOML documents
#[derive(Debug, Deserialize)]
struct AssignmentDocument {
    assignment: Assignment,
}

impl Assignment {
    /// Load and validate an assignment from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> LeadifyResult<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| LeadifyError::Config {
            message: format!("Failed to read assignment file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("assignment")
                .with_operation("read_file")
                .with_suggestion("Check if the assignment file exists and is readable"),
        })?;

        let document: AssignmentDocument =
            toml::from_str(&content).map_err(|e| LeadifyError::Config {
                message: format!("Failed to parse assignment: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("assignment")
                    .with_operation("parse_toml")
                    .with_suggestion("Assignment files need an [assignment] table"),
            })?;

        document.assignment.validate()?;
        Ok(document.assignment)
    }

    /// Validate the assignment before any cycle starts
    pub fn validate(&self) -> LeadifyResult<()> {
        if self.objective.trim().is_empty() {
            return Err(validation_error!(
                "Assignment objective must not be empty",
                "objective",
                "assignment"
            ));
        }
        if self.target_count == 0 {
            return Err(validation_error!(
                "target_count must be greater than 0",
                "target_count",
                "assignment"
            ));
        }
        if self.max_cycles == 0 {
            return Err(validation_error!(
                "max_cycles must be greater than 0",
                "max_cycles",
                "assignment"
            ));
        }
        if self.sources_per_cycle == 0 {
            return Err(validation_error!(
                "sources_per_cycle must be greater than 0",
                "sources_per_cycle",
                "assignment"
            ));
        }
        if let Some((lo, hi)) = self.constraints.size_range {
            if lo > hi {
                return Err(validation_error!(
                    "size_range minimum exceeds maximum",
                    "constraints.size_range",
                    "assignment"
                ));
            }
        }
        Ok(())
    }

    /// Stable signature keying checkpoints to this assignment.
    ///
    /// Incorporates objective, constraints, target and depth so an unrelated
    /// assignment never resumes from a stale checkpoint.
    pub fn signature(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.objective.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.constraints.describe().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.target_count.to_le_bytes());
        hasher.update([match self.depth {
            ResearchDepth::Quick => 0u8,
            ResearchDepth::Comprehensive => 1u8,
        }]);
        format!("{:x}", hasher.finalize())
    }
}

/// A single result returned by the search collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Plain-text page content returned by the fetch collaborator
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub title: Option<String>,
    /// Extracted plain text, bounded by the fetcher's content limit
    pub text: String,
}

/// Configuration for the LLM collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "ollama", "openai" or "anthropic"
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Configuration for the web-search collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Results requested per query
    pub results_per_query: usize,
    pub timeout_secs: u64,
    /// Minimum interval between API calls in milliseconds
    pub min_interval_ms: u64,
}

/// Configuration for the page fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Upper bound on extracted text length per page
    pub max_content_chars: usize,
    /// Concurrent fetches within a cycle
    pub concurrency: usize,
    pub user_agent: String,
}

/// Engine-level tuning knobs (defaults for values an assignment may override)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retries per source fetch before the source is rejected
    pub fetch_retries: usize,
    /// Consecutive LLM transport failures tolerated before the run fails
    pub llm_failure_budget: usize,
    /// Acceptance threshold for source quality scores, [0, 10]
    pub accept_threshold: f64,
    /// Lower threshold applied to hosts matching `lenient_sources`
    pub lenient_threshold: f64,
    /// Host fragments (e.g. "glassdoor", "linkedin") that are historically
    /// high-yield and evaluated against the lenient threshold
    #[serde(default)]
    pub lenient_sources: Vec<String>,
    /// Token budget for text handed to the extraction prompt
    pub extraction_token_budget: usize,
    /// Characters of page text shown to the evaluation rubric
    pub evaluation_preview_chars: usize,
    /// Optional cap on cycles executed in a single process run; the run
    /// suspends (resumable from checkpoint) once the cap is reached
    #[serde(default)]
    pub cycles_per_run: Option<usize>,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub checkpoint_dir: String,
    pub output_dir: String,
    /// Directory watched for dropped assignment files
    pub input_dir: String,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadifyConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub fetch: FetchConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> Assignment {
        Assignment {
            objective: "find mid-size manufacturers needing English training".to_string(),
            target_count: 10,
            depth: ResearchDepth::Comprehensive,
            constraints: AssignmentConstraints {
                geography: Some("Osaka".to_string()),
                size_range: Some((50, 500)),
                exclusions: vec!["staffing agencies".to_string()],
            },
            max_cycles: 5,
            sources_per_cycle: 8,
        }
    }

    #[test]
    fn valid_assignment_passes() {
        assert!(assignment().validate().is_ok());
    }

    #[test]
    fn empty_objective_rejected() {
        let mut a = assignment();
        a.objective = "   ".to_string();
        let err = a.validate().unwrap_err();
        match err {
            LeadifyError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("objective"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn zero_budgets_rejected() {
        for field in ["target_count", "max_cycles", "sources_per_cycle"] {
            let mut a = assignment();
            match field {
                "target_count" => a.target_count = 0,
                "max_cycles" => a.max_cycles = 0,
                _ => a.sources_per_cycle = 0,
            }
            assert!(a.validate().is_err(), "{} = 0 should fail", field);
        }
    }

    #[test]
    fn inverted_size_range_rejected() {
        let mut a = assignment();
        a.constraints.size_range = Some((500, 50));
        assert!(a.validate().is_err());
    }

    #[test]
    fn signature_stable_and_distinct() {
        let a = assignment();
        assert_eq!(a.signature(), assignment().signature());

        let mut b = assignment();
        b.objective = "a different objective".to_string();
        assert_ne!(a.signature(), b.signature());

        let mut c = assignment();
        c.constraints.geography = Some("Nagoya".to_string());
        assert_ne!(a.signature(), c.signature());
    }

    #[test]
    fn signature_ignores_objective_formatting() {
        let a = assignment();
        let mut b = assignment();
        b.objective = format!("  {}  ", a.objective.to_uppercase());
        assert_eq!(a.signature(), b.signature());
    }
}
