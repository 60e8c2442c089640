//! Structured extraction from accepted sources
//!
//! Turns raw page text into validated entity records via the language
//! model. The model's output is untrusted: surrounding prose is tolerated,
//! a malformed structure earns one stricter retry, and a second failure
//! degrades to "no findings" for that source. Nothing here can crash a
//! cycle; only transport-level LLM failures propagate.

use super::types::{fields, Attribute, AttributeValue, EntityRecord, Provenance};
use crate::research::prompts::PromptLibrary;
use leadify_core::{Assignment, FetchedPage, LanguageModel, LeadifyResult};
use leadify_llm::{json, TokenBudget};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Adapter between accepted sources and the finding store
pub struct ExtractionAdapter {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptLibrary>,
    budget: TokenBudget,
    /// Token budget for source text in the extraction prompt; the dominant
    /// cost control on constrained hardware
    max_source_tokens: usize,
}

impl ExtractionAdapter {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        prompts: Arc<PromptLibrary>,
        max_source_tokens: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            budget: TokenBudget::new(),
            max_source_tokens,
        }
    }

    /// Extract entity records from an accepted page.
    ///
    /// Returns an empty vec for "no relevant entity" and for persistent
    /// structure failures. Transport errors propagate so the orchestrator
    /// can track its collaborator failure budget.
    pub async fn extract(
        &self,
        page: &FetchedPage,
        assignment: &Assignment,
        cycle_index: usize,
    ) -> LeadifyResult<Vec<EntityRecord>> {
        let text = self.budget.truncate(&page.text, self.max_source_tokens);

        for retry in [false, true] {
            let prompt = match self.prompts.extraction(assignment, &page.url, &text, retry) {
                Ok(prompt) => prompt,
                Err(e) => {
                    warn!(error = %e, "Extraction prompt render failed");
                    return Ok(Vec::new());
                }
            };

            let response = self.llm.generate(self.prompts.system(), &prompt).await?;

            match json::extract_json_array(&response) {
                Some(items) => {
                    let records = parse_records(&items, &page.url, cycle_index);
                    debug!(
                        url = %page.url,
                        records = records.len(),
                        retried = retry,
                        "Extraction completed"
                    );
                    return Ok(records);
                }
                None if !retry => {
                    debug!(url = %page.url, "Malformed extraction response, retrying once");
                }
                None => {
                    warn!(
                        url = %page.url,
                        "Extraction response malformed twice, treating as no findings"
                    );
                }
            }
        }

        Ok(Vec::new())
    }
}

/// Convert parsed JSON items into entity records, skipping nameless ones
fn parse_records(items: &[Value], url: &str, cycle_index: usize) -> Vec<EntityRecord> {
    items
        .iter()
        .filter_map(|item| parse_record(item, url, cycle_index))
        .collect()
}

fn parse_record(item: &Value, url: &str, cycle_index: usize) -> Option<EntityRecord> {
    let name = json::string_field(item, "name")?;

    let confidence = item
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let mut attributes = BTreeMap::new();

    for field in [fields::INDUSTRY, fields::WEBSITE] {
        if let Some(value) = json::string_field(item, field) {
            attributes.insert(
                field.to_string(),
                Attribute {
                    value: AttributeValue::Text(value),
                    confidence,
                },
            );
        }
    }

    // Size may arrive as a number or as prose ("about 200")
    if let Some(size) = item.get(fields::SIZE) {
        let text = match size {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
        if let Some(text) = text {
            attributes.insert(
                fields::SIZE.to_string(),
                Attribute {
                    value: AttributeValue::Text(text),
                    confidence,
                },
            );
        }
    }

    for field in [fields::DECISION_MAKERS, fields::NEED_SIGNALS, fields::CONTACTS] {
        let values = json::string_list_field(item, field);
        if !values.is_empty() {
            attributes.insert(
                field.to_string(),
                Attribute {
                    value: AttributeValue::List(values),
                    confidence,
                },
            );
        }
    }

    Some(EntityRecord {
        name,
        location: json::string_field(item, "location"),
        attributes,
        provenance: vec![Provenance {
            url: url.to_string(),
            cycle: cycle_index,
            confidence,
        }],
        first_seen_cycle: cycle_index,
    })
}
