//! Deduplicated finding store
//!
//! The single mutable structure shared across cycles. All writes funnel
//! through `merge`; the query generator and report compiler only read.
//! Backed by a BTreeMap so iteration (and therefore every downstream
//! artifact) is deterministic.

use super::types::{
    fields, Attribute, AttributeValue, EntityRecord, GapSummary, MergeOutcome, ReportSnapshot,
    Tier,
};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

/// Legal-form suffixes dropped during name normalization, so
/// "Acme Manufacturing K.K." and "Acme Manufacturing" collide.
const LEGAL_SUFFIXES: [&str; 12] = [
    "inc", "llc", "ltd", "limited", "gmbh", "kk", "co", "corp", "corporation", "company",
    "incorporated", "plc",
];

/// Normalize an entity name + optional location into an identity key.
///
/// Lowercase, punctuation folded to spaces, legal suffixes dropped,
/// whitespace collapsed. Tolerant of minor formatting differences, not of
/// genuinely different names.
pub fn identity_key(name: &str, location: Option<&str>) -> String {
    let name_part = normalize_part(name, true);
    match location {
        Some(loc) => {
            let loc_part = normalize_part(loc, false);
            if loc_part.is_empty() {
                name_part
            } else {
                format!("{}|{}", name_part, loc_part)
            }
        }
        None => name_part,
    }
}

fn normalize_part(text: &str, drop_suffixes: bool) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|token| !drop_suffixes || !LEGAL_SUFFIXES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// The cumulative, deduplicated set of entities discovered so far
#[derive(Debug, Default, Clone)]
pub struct FindingStore {
    entities: BTreeMap<String, EntityRecord>,
    sources_accepted: usize,
    sources_rejected: usize,
}

impl FindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from checkpointed entities
    pub fn from_entities(entities: Vec<EntityRecord>) -> Self {
        let mut store = Self::new();
        for entity in entities {
            store.merge(entity);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in identity-key order
    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    /// Identity keys currently in the store
    pub fn identity_keys(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Record source accept/reject tallies for the report snapshot
    pub fn note_source(&mut self, accepted: bool) {
        if accepted {
            self.sources_accepted += 1;
        } else {
            self.sources_rejected += 1;
        }
    }

    /// Restore tallies from checkpointed cycle history on resume
    pub fn restore_source_tallies(&mut self, accepted: usize, rejected: usize) {
        self.sources_accepted = accepted;
        self.sources_rejected = rejected;
    }

    /// Merge a candidate record into the store.
    ///
    /// Matching is by identity key, with a location-upgrade path: a
    /// candidate carrying a location will claim an existing location-less
    /// record with the same name, and a location-less candidate folds into
    /// the first record sharing its name part. Field merge rules: an
    /// existing non-empty scalar wins unless the candidate's confidence
    /// strictly exceeds it; lists union with exact-value dedup; provenance
    /// appends, deduped by (url, cycle). Idempotent.
    pub fn merge(&mut self, candidate: EntityRecord) -> MergeOutcome {
        let key = identity_key(&candidate.name, candidate.location.as_deref());

        if let Some(existing) = self.entities.get_mut(&key) {
            return merge_into(existing, candidate);
        }

        // Location-aware fallback matching on the name part alone.
        let name_part = identity_key(&candidate.name, None);
        if candidate.location.is_some() {
            // Upgrade an existing record that lacked a location.
            if let Some(mut existing) = self.entities.remove(&name_part) {
                existing.location = candidate.location.clone();
                let outcome = merge_into(&mut existing, candidate);
                let new_key = identity_key(&existing.name, existing.location.as_deref());
                self.entities.insert(new_key, existing);
                // Relocating under the richer key is an update even if no
                // field changed.
                return match outcome {
                    MergeOutcome::Unchanged => MergeOutcome::Updated,
                    other => other,
                };
            }
        } else if let Some(existing_key) = self
            .entities
            .keys()
            .find(|k| k.split('|').next() == Some(name_part.as_str()))
            .cloned()
        {
            let existing = self
                .entities
                .get_mut(&existing_key)
                .expect("key just found");
            return merge_into(existing, candidate);
        }

        debug!(entity = %candidate.name, key = %key, "New entity discovered");
        self.entities.insert(key, candidate);
        MergeOutcome::Created
    }

    /// Per-field completeness gaps for the query generator
    pub fn gap_summary(&self) -> GapSummary {
        let mut summary = GapSummary {
            total_entities: self.entities.len(),
            missing: BTreeMap::new(),
        };

        for entity in self.entities.values() {
            if entity.location.is_none() {
                *summary.missing.entry("location".to_string()).or_default() += 1;
            }
            for field in fields::ALL {
                if entity.attribute(field).is_none() {
                    *summary.missing.entry(field.to_string()).or_default() += 1;
                }
            }
        }

        summary
    }

    /// Read-only tiered snapshot for the report compiler
    pub fn snapshot(&self, objective: &str, cycles_run: usize, elapsed_secs: u64) -> ReportSnapshot {
        let mut hot = Vec::new();
        let mut warm = Vec::new();
        let mut cold = Vec::new();

        for entity in self.entities.values() {
            match entity.tier() {
                Tier::Hot => hot.push(entity.clone()),
                Tier::Warm => warm.push(entity.clone()),
                Tier::Cold => cold.push(entity.clone()),
            }
        }

        ReportSnapshot {
            objective: objective.to_string(),
            hot,
            warm,
            cold,
            cycles_run,
            sources_accepted: self.sources_accepted,
            sources_rejected: self.sources_rejected,
            elapsed_secs,
            generated_at: Utc::now(),
        }
    }
}

/// Merge `candidate` into `existing` under the union rules.
fn merge_into(existing: &mut EntityRecord, candidate: EntityRecord) -> MergeOutcome {
    let mut changed = false;

    if existing.location.is_none() && candidate.location.is_some() {
        existing.location = candidate.location;
        changed = true;
    }

    for (name, incoming) in candidate.attributes {
        if incoming.value.is_empty() {
            continue;
        }
        match existing.attributes.get_mut(&name) {
            None => {
                existing.attributes.insert(name, incoming);
                changed = true;
            }
            Some(current) if current.value.is_empty() => {
                *current = incoming;
                changed = true;
            }
            Some(current) => match (&mut current.value, incoming.value) {
                (AttributeValue::List(items), AttributeValue::List(new_items)) => {
                    for item in new_items {
                        if !items.contains(&item) {
                            items.push(item);
                            changed = true;
                        }
                    }
                    current.confidence = current.confidence.max(incoming.confidence);
                }
                (_, new_value) => {
                    // Keep the existing non-empty value unless the new one
                    // is strictly more confident.
                    if incoming.confidence > current.confidence {
                        if current.value != new_value {
                            changed = true;
                        }
                        *current = Attribute {
                            value: new_value,
                            confidence: incoming.confidence,
                        };
                    }
                }
            },
        }
    }

    for entry in candidate.provenance {
        let duplicate = existing
            .provenance
            .iter()
            .any(|p| p.url == entry.url && p.cycle == entry.cycle);
        if !duplicate {
            existing.provenance.push(entry);
            changed = true;
        }
    }

    if changed {
        MergeOutcome::Updated
    } else {
        MergeOutcome::Unchanged
    }
}
