//! Leadify Web - Search and page-fetch collaborators
//!
//! Production implementations of the core `SearchProvider` and `PageFetcher`
//! traits: Brave Search for discovery, a bounded reqwest fetcher with
//! HTML-to-text extraction for page content.

pub mod fetch;
pub mod html;
pub mod search;

pub use fetch::HttpPageFetcher;
pub use search::BraveSearchClient;
