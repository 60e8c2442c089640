//! Source quality evaluation
//!
//! Scores a fetched page against the assignment before any extraction
//! budget is spent on it. Sources below threshold are rejected outright;
//! that bound is what keeps a cycle inside its time budget on constrained
//! hardware. Hosts on the configurable lenient list (employer-review
//! sites, professional networks) get a lower bar because they are
//! empirically higher-yield per signal.

use super::prompts::PromptLibrary;
use super::types::Evaluation;
use leadify_core::{Assignment, FetchedPage, LanguageModel, LeadifyResult};
use leadify_llm::json;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Threshold and allow-list settings for the evaluator
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    /// Default acceptance threshold, [0, 10]
    pub accept_threshold: f64,
    /// Threshold applied to hosts matching `lenient_sources`
    pub lenient_threshold: f64,
    /// Host fragments granted the lenient threshold; configuration input,
    /// never hard-coded
    pub lenient_sources: Vec<String>,
    /// Characters of page text shown to the rubric
    pub preview_chars: usize,
}

/// Scores fetched pages for relevance and concreteness
pub struct SourceEvaluator {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptLibrary>,
    settings: EvaluatorSettings,
}

impl SourceEvaluator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        prompts: Arc<PromptLibrary>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            llm,
            prompts,
            settings,
        }
    }

    /// Evaluate a fetched page against its originating query.
    ///
    /// LLM transport failures propagate (they feed the orchestrator's
    /// failure budget); an unparseable score degrades to the midpoint.
    pub async fn evaluate(
        &self,
        page: &FetchedPage,
        query: &str,
        assignment: &Assignment,
    ) -> LeadifyResult<Evaluation> {
        if page.text.trim().is_empty() {
            return Ok(Evaluation {
                score: 0.0,
                accepted: false,
                reason: Some("empty page content".to_string()),
            });
        }

        let preview = preview(&page.text, self.settings.preview_chars);
        let title = page.title.as_deref().unwrap_or("(untitled)");
        let prompt = match self
            .prompts
            .source_evaluation(assignment, query, title, &preview)
        {
            Ok(prompt) => prompt,
            Err(e) => {
                // Template failure is an engine bug, not a source problem;
                // reject the source rather than poison the cycle.
                return Ok(Evaluation {
                    score: 0.0,
                    accepted: false,
                    reason: Some(format!("evaluation prompt error: {}", e)),
                });
            }
        };

        let response = self.llm.generate(self.prompts.system(), &prompt).await?;

        let score = json::parse_score(&response)
            .unwrap_or(5.0)
            .clamp(0.0, 10.0);
        let stated_reason = json::extract_json_value(&response)
            .and_then(|v| json::string_field(&v, "reason"));

        let threshold = self.threshold_for(&page.url);
        let accepted = score >= threshold;

        debug!(
            url = %page.url,
            score = score,
            threshold = threshold,
            accepted = accepted,
            "Source evaluated"
        );

        let reason = if accepted {
            stated_reason
        } else {
            Some(match stated_reason {
                Some(r) => format!("score {:.1} below threshold {:.1}: {}", score, threshold, r),
                None => format!("score {:.1} below threshold {:.1}", score, threshold),
            })
        };

        Ok(Evaluation {
            score,
            accepted,
            reason,
        })
    }

    /// Pick the threshold for a URL's host
    fn threshold_for(&self, url: &str) -> f64 {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase));

        if let Some(host) = host {
            let lenient = self
                .settings
                .lenient_sources
                .iter()
                .any(|fragment| !fragment.is_empty() && host.contains(&fragment.to_lowercase()));
            if lenient {
                return self.settings.lenient_threshold;
            }
        }

        self.settings.accept_threshold
    }
}

/// Truncate preview text on a char boundary
fn preview(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut cut = max_chars;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadify_core::{async_trait, AssignmentConstraints, LeadifyResult, ResearchDepth};

    struct FixedLlm(String);

    #[async_trait]
    impl LanguageModel for FixedLlm {
        async fn generate(&self, _system: &str, _user: &str) -> LeadifyResult<String> {
            Ok(self.0.clone())
        }
    }

    fn assignment() -> Assignment {
        Assignment {
            objective: "find manufacturers".to_string(),
            target_count: 5,
            depth: ResearchDepth::Quick,
            constraints: AssignmentConstraints::default(),
            max_cycles: 3,
            sources_per_cycle: 4,
        }
    }

    fn settings() -> EvaluatorSettings {
        EvaluatorSettings {
            accept_threshold: 7.0,
            lenient_threshold: 5.0,
            lenient_sources: vec!["glassdoor".to_string(), "linkedin".to_string()],
            preview_chars: 500,
        }
    }

    fn page(url: &str) -> FetchedPage {
        FetchedPage {
            url: url.to_string(),
            title: Some("Some page".to_string()),
            text: "Concrete facts about a manufacturer in Osaka.".to_string(),
        }
    }

    fn evaluator(response: &str) -> SourceEvaluator {
        SourceEvaluator::new(
            Arc::new(FixedLlm(response.to_string())),
            Arc::new(PromptLibrary::new().unwrap()),
            settings(),
        )
    }

    #[tokio::test]
    async fn accepts_above_threshold() {
        let eval = evaluator(r#"{"score": 8, "reason": "very relevant"}"#)
            .evaluate(&page("https://example.com/a"), "query", &assignment())
            .await
            .unwrap();
        assert!(eval.accepted);
        assert_eq!(eval.score, 8.0);
        assert_eq!(eval.reason.as_deref(), Some("very relevant"));
    }

    #[tokio::test]
    async fn rejects_below_threshold_with_reason() {
        let eval = evaluator(r#"{"score": 4, "reason": "thin content"}"#)
            .evaluate(&page("https://example.com/a"), "query", &assignment())
            .await
            .unwrap();
        assert!(!eval.accepted);
        let reason = eval.reason.unwrap();
        assert!(reason.contains("below threshold"));
        assert!(reason.contains("thin content"));
    }

    #[tokio::test]
    async fn lenient_host_uses_lower_threshold() {
        // Score 6 fails the default 7.0 bar but passes the lenient 5.0 bar
        let response = r#"{"score": 6, "reason": "employee chatter"}"#;

        let normal = evaluator(response)
            .evaluate(&page("https://example.com/a"), "query", &assignment())
            .await
            .unwrap();
        assert!(!normal.accepted);

        let lenient = evaluator(response)
            .evaluate(
                &page("https://www.glassdoor.com/Reviews/acme"),
                "query",
                &assignment(),
            )
            .await
            .unwrap();
        assert!(lenient.accepted);
    }

    #[tokio::test]
    async fn unparseable_score_degrades_to_midpoint() {
        let eval = evaluator("this page seems fine to me")
            .evaluate(&page("https://example.com/a"), "query", &assignment())
            .await
            .unwrap();
        assert_eq!(eval.score, 5.0);
        assert!(!eval.accepted);
    }

    #[tokio::test]
    async fn loose_numeric_response_is_parsed() {
        let eval = evaluator("9")
            .evaluate(&page("https://example.com/a"), "query", &assignment())
            .await
            .unwrap();
        assert_eq!(eval.score, 9.0);
        assert!(eval.accepted);
    }

    #[tokio::test]
    async fn empty_page_rejected_without_llm_call() {
        let mut p = page("https://example.com/a");
        p.text = "   ".to_string();
        let eval = evaluator(r#"{"score": 10}"#)
            .evaluate(&p, "query", &assignment())
            .await
            .unwrap();
        assert!(!eval.accepted);
        assert_eq!(eval.reason.as_deref(), Some("empty page content"));
    }
}
