//! Leadify Engine - Cycle-based research orchestration
//!
//! The core of the system: a resumable state machine that turns a research
//! assignment into a deduplicated, tiered set of entity findings by
//! iteratively searching, fetching, evaluating, extracting and merging.
//!
//! ## Architecture
//!
//! - **Collaborators** (leadify-llm, leadify-web): language model, web
//!   search, page fetching, reached only through leadify-core traits
//! - **Engine** (this crate): query generation, source evaluation,
//!   extraction, the finding store, checkpoints, and the orchestrator
//! - **Presentation** (leadify-cli): assignment intake and report rendering

pub mod research;

pub use research::{
    control_channel, Checkpoint, CheckpointStore, ControlHandle, ControlSignal, Cycle,
    EntityRecord, FindingStore, MergeOutcome, OrchestratorOptions, ReportSnapshot,
    ResearchOrchestrator, ResearchOutcome, ResearchStatus, Tier,
};

/// Engine-level error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Core error: {0}")]
    Core(#[from] leadify_core::LeadifyError),

    #[error("Invalid assignment: {message}")]
    InvalidAssignment {
        message: String,
        field: Option<String>,
    },

    #[error("Collaborator unavailable after {consecutive_failures} consecutive failures")]
    CollaboratorUnavailable { consecutive_failures: usize },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Research error: {message}")]
    Research { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Create a research error
    pub fn research<S: Into<String>>(message: S) -> Self {
        Self::Research {
            message: message.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint<S: Into<String>>(message: S) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }
}
