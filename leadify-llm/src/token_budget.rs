//! Token-budget accounting for prompt construction
//!
//! Source text handed to the extraction prompt is the dominant cost on
//! constrained hardware, so it is truncated against a token budget rather
//! than a raw character count. Falls back to a characters-per-token
//! heuristic when the tokenizer is unavailable.

use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

/// Rough characters-per-token ratio used when no tokenizer is available
const CHARS_PER_TOKEN: usize = 4;

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoder() -> Option<&'static CoreBPE> {
    ENCODER
        .get_or_init(|| match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "Tokenizer unavailable, using character heuristic");
                None
            }
        })
        .as_ref()
}

/// Token budgeter shared by prompt-building code
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBudget;

impl TokenBudget {
    pub fn new() -> Self {
        Self
    }

    /// Count tokens in a text string
    pub fn count(&self, text: &str) -> usize {
        match encoder() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len().div_ceil(CHARS_PER_TOKEN),
        }
    }

    /// Truncate `text` so it fits within `max_tokens`, cutting on a char
    /// boundary. Returns the text unchanged when it already fits.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }

        let total = self.count(text);
        if total <= max_tokens {
            return text.to_string();
        }

        // First cut proportionally, then trim until under budget. Each trim
        // removes 5% so convergence is fast without a decode step.
        let mut cut = text.len() * max_tokens / total;
        loop {
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            let candidate = &text[..cut];
            if cut == 0 || self.count(candidate) <= max_tokens {
                return candidate.to_string();
            }
            cut = cut.saturating_sub((cut / 20).max(1));
        }
    }
}
