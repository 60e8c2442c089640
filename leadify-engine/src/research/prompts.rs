//! Prompt templates for the research engine
//!
//! All LLM-facing prompts live here, rendered through tera so the cycle
//! code stays free of string assembly. Every prompt that expects structure
//! ends with an explicit shape instruction; the adapters still tolerate
//! responses that ignore it.

use crate::{EngineError, EngineResult};
use leadify_core::Assignment;
use tera::{Context, Tera};

const SYSTEM_PROMPT: &str = "You are a meticulous research assistant compiling verified, \
structured facts about companies. You only state what the provided material supports, and \
you respond in exactly the shape each instruction asks for.";

const QUERY_GENERATION: &str = r#"You are planning web searches for an ongoing research task.

Objective: {{ objective }}
{% if constraints %}Constraints: {{ constraints }}
{% endif %}Cycle {{ cycle_number }} of {{ max_cycles }}. Entities found so far: {{ found_count }} of {{ target_count }}.
{% if known_entities %}Already discovered (do not rediscover): {{ known_entities }}
{% endif %}{% if gaps %}Attribute gaps in the current findings: {{ gaps }}
{% endif %}{% if issued %}Queries already used in earlier cycles, never repeat any of them:
{{ issued }}
{% endif %}
Generate {{ budget }} distinct web search queries.
{% if discovery_bias %}Focus on discovering new companies that match the objective, from several different angles (industry terms, job boards, news, local directories).{% else %}Prioritize two kinds of queries: filling the attribute gaps listed above for specific companies already found, and corroborating high-value companies through alternate sources (review sites, professional networks, news). Add discovery queries only if the target count is not reached yet.{% endif %}

Respond with a JSON array of strings only."#;

const SOURCE_EVALUATION: &str = r#"Rate how useful this page is for the research query "{{ query }}" on a scale of 0-10.

Page title: {{ title }}
Content preview:
{{ preview }}

{% if constraints %}The research is constrained to: {{ constraints }}.
{% endif %}Consider:
- Does it directly address the query topic?
- Does it contain concrete facts (names, numbers, dates, roles)?
- Is the information recent?

Respond with JSON only: {"score": <0-10>, "reason": "<one short sentence>"}"#;

const EXTRACTION: &str = r#"Extract structured company facts relevant to this research objective.

Objective: {{ objective }}
{% if constraints %}Constraints: {{ constraints }}
{% endif %}Source URL: {{ url }}
Source text:
{{ text }}

For every relevant company in the text, produce one object with these fields:
- "name" (required)
- "location" (city or region, omit if not stated)
- "industry"
- "size" (employee count or range as stated)
- "website"
- "decision_makers" (array of "Name, Role" strings)
- "need_signals" (array of short phrases evidencing the need in the objective)
- "contacts" (array of emails, phone numbers or contact-page URLs)
- "confidence" (your confidence in this record, 0.0-1.0)

Omit any field the text does not support. If no relevant company appears, respond with [].

Respond with a JSON array only, no commentary."#;

const EXTRACTION_RETRY_PREFIX: &str = "Your previous reply was not valid JSON and was discarded. \
Respond with nothing but the JSON array this time.\n\n";

/// Rendered prompt library shared by the engine's LLM-facing adapters
pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> EngineResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("query_generation", QUERY_GENERATION),
            ("source_evaluation", SOURCE_EVALUATION),
            ("extraction", EXTRACTION),
        ])
        .map_err(EngineError::from)?;
        Ok(Self { tera })
    }

    /// System prompt shared by every engine call
    pub fn system(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    #[allow(clippy::too_many_arguments)]
    pub fn query_generation(
        &self,
        assignment: &Assignment,
        cycle_index: usize,
        found_count: usize,
        known_entities: &[String],
        gaps: &str,
        issued: &[String],
        discovery_bias: bool,
    ) -> EngineResult<String> {
        let mut context = Context::new();
        context.insert("objective", &assignment.objective);
        context.insert("constraints", &assignment.constraints.describe());
        context.insert("cycle_number", &(cycle_index + 1));
        context.insert("max_cycles", &assignment.max_cycles);
        context.insert("found_count", &found_count);
        context.insert("target_count", &assignment.target_count);
        context.insert("known_entities", &known_entities.join(", "));
        context.insert("gaps", gaps);
        context.insert("issued", &issued.join("\n"));
        context.insert("budget", &assignment.sources_per_cycle);
        context.insert("discovery_bias", &discovery_bias);
        self.render("query_generation", &context)
    }

    pub fn source_evaluation(
        &self,
        assignment: &Assignment,
        query: &str,
        title: &str,
        preview: &str,
    ) -> EngineResult<String> {
        let mut context = Context::new();
        context.insert("query", query);
        context.insert("title", title);
        context.insert("preview", preview);
        context.insert("constraints", &assignment.constraints.describe());
        self.render("source_evaluation", &context)
    }

    pub fn extraction(
        &self,
        assignment: &Assignment,
        url: &str,
        text: &str,
        retry: bool,
    ) -> EngineResult<String> {
        let mut context = Context::new();
        context.insert("objective", &assignment.objective);
        context.insert("constraints", &assignment.constraints.describe());
        context.insert("url", url);
        context.insert("text", text);
        let rendered = self.render("extraction", &context)?;
        if retry {
            Ok(format!("{}{}", EXTRACTION_RETRY_PREFIX, rendered))
        } else {
            Ok(rendered)
        }
    }

    fn render(&self, template: &str, context: &Context) -> EngineResult<String> {
        self.tera
            .render(template, context)
            .map_err(EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadify_core::{AssignmentConstraints, ResearchDepth};

    fn assignment() -> Assignment {
        Assignment {
            objective: "find manufacturers needing English training".to_string(),
            target_count: 10,
            depth: ResearchDepth::Comprehensive,
            constraints: AssignmentConstraints {
                geography: Some("Osaka".to_string()),
                size_range: None,
                exclusions: vec![],
            },
            max_cycles: 5,
            sources_per_cycle: 6,
        }
    }

    #[test]
    fn query_prompt_biases_by_cycle() {
        let prompts = PromptLibrary::new().unwrap();

        let first = prompts
            .query_generation(&assignment(), 0, 0, &[], "", &[], true)
            .unwrap();
        assert!(first.contains("Cycle 1 of 5"));
        assert!(first.contains("discovering new companies"));

        let later = prompts
            .query_generation(
                &assignment(),
                2,
                4,
                &["acme|osaka".to_string()],
                "contacts missing for 75% (3/4)",
                &["manufacturers osaka".to_string()],
                false,
            )
            .unwrap();
        assert!(later.contains("Cycle 3 of 5"));
        assert!(later.contains("corroborating"));
        assert!(later.contains("contacts missing for 75%"));
        assert!(later.contains("never repeat"));
    }

    #[test]
    fn evaluation_prompt_includes_rubric_and_shape() {
        let prompts = PromptLibrary::new().unwrap();
        let rendered = prompts
            .source_evaluation(&assignment(), "acme osaka", "Acme Careers", "We are hiring")
            .unwrap();
        assert!(rendered.contains("scale of 0-10"));
        assert!(rendered.contains("\"score\""));
        assert!(rendered.contains("located in Osaka"));
    }

    #[test]
    fn extraction_retry_prepends_warning() {
        let prompts = PromptLibrary::new().unwrap();
        let normal = prompts
            .extraction(&assignment(), "https://a.test", "text", false)
            .unwrap();
        let retry = prompts
            .extraction(&assignment(), "https://a.test", "text", true)
            .unwrap();
        assert!(!normal.contains("was discarded"));
        assert!(retry.starts_with("Your previous reply was not valid JSON"));
        assert!(retry.contains("JSON array only"));
    }
}
