//! Collaborator trait definitions
//!
//! The engine talks to its external collaborators (language model, web
//! search, page fetcher) exclusively through these traits. Production
//! implementations live in leadify-llm and leadify-web; tests supply
//! deterministic mocks.

use crate::error::LeadifyResult;
use crate::types::{FetchedPage, SearchHit};
use async_trait::async_trait;

/// Text-in/text-out language model collaborator.
///
/// Callers may ask for structured (JSON-shaped) responses, but must treat
/// the output as untrusted: the model is free to violate the requested
/// shape, and adapters are expected to degrade gracefully when it does.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for a system + user prompt pair
    async fn generate(&self, system: &str, user: &str) -> LeadifyResult<String>;
}

/// Web-search collaborator: query in, ranked URL list out.
///
/// Implementations must tolerate empty result sets and malformed entries
/// (missing scheme, empty URL) without failing the caller's cycle.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> LeadifyResult<Vec<SearchHit>>;
}

/// Page-fetching collaborator: URL in, extracted plain text out.
///
/// A failed or timed-out fetch is reported per URL via `LeadifyError::Fetch`
/// with its `retryable` flag set; it never takes down a whole cycle.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> LeadifyResult<FetchedPage>;
}
