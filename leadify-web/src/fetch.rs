//! Page-fetching collaborator
//!
//! URL in, bounded plain text out. HTML is stripped to readable text; other
//! text content types pass through. Every failure mode is reported per URL
//! with a `retryable` flag so the orchestrator can apply its per-source
//! retry budget.

use crate::html;
use leadify_core::{
    async_trait, fetch_error, ErrorContext, FetchConfig, FetchedPage, LeadifyError,
    LeadifyResult, PageFetcher,
};
use std::time::Duration;
use tracing::debug;

/// HTTP page fetcher with text extraction
pub struct HttpPageFetcher {
    http: reqwest::Client,
    max_content_chars: usize,
}

impl HttpPageFetcher {
    /// Create a new fetcher
    pub fn new(config: &FetchConfig) -> LeadifyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| LeadifyError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("page_fetcher").with_operation("build_client"),
            })?;

        Ok(Self {
            http,
            max_content_chars: config.max_content_chars,
        })
    }

    /// Bound text length at a char boundary
    fn bound_text(&self, text: String) -> String {
        if text.len() <= self.max_content_chars {
            return text;
        }
        let mut cut = self.max_content_chars;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text[..cut].to_string()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> LeadifyResult<FetchedPage> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(fetch_error!(
                "URL must start with http:// or https://",
                url,
                false,
                "page_fetcher"
            ));
        }

        debug!(url = url, "Fetching page");

        let response = self.http.get(url).send().await.map_err(|e| {
            // Connection-level failures are worth retrying; the flag drives
            // the orchestrator's per-source retry budget.
            let retryable = e.is_timeout() || e.is_connect() || e.is_request();
            fetch_error!(format!("Fetch failed: {}", e), url, retryable, "page_fetcher")
        })?;

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(fetch_error!(
                format!("HTTP {} fetching page", status),
                url,
                retryable,
                "page_fetcher"
            ));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.is_empty()
            && !content_type.contains("text/")
            && !content_type.contains("xhtml")
            && !content_type.contains("json")
        {
            return Err(fetch_error!(
                format!("Unsupported content type: {}", content_type),
                url,
                false,
                "page_fetcher"
            ));
        }

        let body = response.text().await.map_err(|e| {
            fetch_error!(
                format!("Failed to read response body: {}", e),
                url,
                true,
                "page_fetcher"
            )
        })?;

        let (title, text) =
            if content_type.contains("text/html") || content_type.contains("xhtml") {
                (html::html_title(&body), html::html_to_text(&body))
            } else {
                (None, body)
            };

        Ok(FetchedPage {
            url: url.to_string(),
            title,
            text: self.bound_text(text),
        })
    }
}
