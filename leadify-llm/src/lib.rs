//! Leadify LLM - Language-model collaborator built on siumai
//!
//! Provides the production `LanguageModel` implementation plus the
//! response-parsing and token-budget utilities every LLM-facing adapter
//! in the engine relies on.

pub mod client;
pub mod json;
pub mod token_budget;

pub use client::LeadifyLlmClient;
pub use token_budget::TokenBudget;
