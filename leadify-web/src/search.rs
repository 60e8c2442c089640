//! Web-search collaborator backed by the Brave Search API
//!
//! Query in, ranked `{url, title, snippet}` list out. Responses are treated
//! as untrusted input: missing fields, malformed URLs and empty result sets
//! all degrade to shorter (possibly empty) hit lists rather than errors.

use leadify_core::{
    async_trait, ErrorContext, LeadifyError, LeadifyResult, RateLimiter, SearchConfig,
    SearchHit, SearchProvider,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Brave Search client
pub struct BraveSearchClient {
    http: reqwest::Client,
    config: SearchConfig,
    limiter: RateLimiter,
}

impl BraveSearchClient {
    /// Create a new search client
    pub fn new(config: SearchConfig) -> LeadifyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LeadifyError::Search {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("brave_search").with_operation("build_client"),
            })?;

        // Free-tier Brave allows one request per second; serialize calls
        // and space them out.
        let limiter = RateLimiter::new(1, config.min_interval_ms);

        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    /// Parse a Brave web-search response body into hits.
    ///
    /// Entries without a parseable http(s) URL are skipped, not fatal.
    fn parse_results(body: &Value, limit: usize) -> Vec<SearchHit> {
        let results = body
            .pointer("/web/results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut hits = Vec::new();
        for entry in results {
            if hits.len() >= limit {
                break;
            }

            let Some(raw_url) = entry.get("url").and_then(Value::as_str) else {
                continue;
            };
            let Ok(parsed) = Url::parse(raw_url) else {
                debug!(url = raw_url, "Skipping unparseable search result URL");
                continue;
            };
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                debug!(url = raw_url, "Skipping non-http search result");
                continue;
            }

            hits.push(SearchHit {
                url: raw_url.to_string(),
                title: entry
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                snippet: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            });
        }
        hits
    }
}

#[async_trait]
impl SearchProvider for BraveSearchClient {
    async fn search(&self, query: &str, limit: usize) -> LeadifyResult<Vec<SearchHit>> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            LeadifyError::Config {
                message: "Brave Search API key not configured".to_string(),
                source: None,
                context: ErrorContext::new("brave_search")
                    .with_operation("search")
                    .with_suggestion("Set search.api_key or BRAVE_API_KEY"),
            }
        })?;

        let _guard = self.limiter.acquire().await?;

        let count = limit.min(self.config.results_per_query).max(1);
        let request_url = format!(
            "{}?q={}&count={}",
            self.config.endpoint,
            urlencoding::encode(query),
            count
        );

        debug!(query = query, count = count, "Dispatching web search");

        let response = self
            .http
            .get(&request_url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await
            .map_err(|e| LeadifyError::Search {
                message: format!("Search request failed: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("brave_search")
                    .with_operation("search")
                    .with_suggestion("Check network connectivity"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadifyError::Search {
                message: format!("Search API returned HTTP {}", status),
                source: None,
                context: ErrorContext::new("brave_search")
                    .with_operation("search")
                    .with_suggestion("Verify the API key and request quota"),
            });
        }

        let body: Value = response.json().await.map_err(|e| LeadifyError::Search {
            message: format!("Failed to parse search response: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("brave_search").with_operation("parse_response"),
        })?;

        let hits = Self::parse_results(&body, limit);
        if hits.is_empty() {
            warn!(query = query, "Search returned no usable results");
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_well_formed_results() {
        let body = json!({
            "web": {
                "results": [
                    {"url": "https://example.com/a", "title": "A", "description": "first"},
                    {"url": "https://example.com/b", "title": "B", "description": "second"},
                ]
            }
        });
        let hits = BraveSearchClient::parse_results(&body, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://example.com/a");
        assert_eq!(hits[1].snippet, "second");
    }

    #[test]
    fn skips_malformed_entries() {
        let body = json!({
            "web": {
                "results": [
                    {"title": "no url at all"},
                    {"url": "not a url", "title": "bad"},
                    {"url": "ftp://example.com/file", "title": "wrong scheme"},
                    {"url": "https://example.com/ok", "title": "good"},
                ]
            }
        });
        let hits = BraveSearchClient::parse_results(&body, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://example.com/ok");
    }

    #[test]
    fn empty_and_missing_results_tolerated() {
        assert!(BraveSearchClient::parse_results(&json!({}), 5).is_empty());
        assert!(
            BraveSearchClient::parse_results(&json!({"web": {"results": []}}), 5).is_empty()
        );
    }

    #[test]
    fn respects_limit() {
        let results: Vec<Value> = (0..10)
            .map(|i| json!({"url": format!("https://example.com/{}", i), "title": "t"}))
            .collect();
        let body = json!({"web": {"results": results}});
        let hits = BraveSearchClient::parse_results(&body, 3);
        assert_eq!(hits.len(), 3);
    }
}
