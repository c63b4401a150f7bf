//! Query-adaptive fusion weighting.
//!
//! Queries naming exact artifacts (form numbers, tax years, schedule letters)
//! are served better by the lexical signal: embeddings blur "1040" and
//! "1040-NR" together while text ranking keeps them apart. A small fixed
//! pattern set decides which weight pair the retriever hands to the lexical
//! sub-search.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static EXACT_TERM_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bForm\s+\d+",             // "Form 1040", "Form 8889"
        r"\b(19|20)\d{2}\b",             // standalone years: "2024"
        r"\bSchedule\s+[A-Z]\b",         // "Schedule C"
        r"(?i)\bW-?\d\b",                // "W-2", "W4"
        r"(?i)\b1099-\w+\b",             // "1099-INT", "1099-MISC"
        r"(?i)\bIRS\s+Publication\s+\d+", // "IRS Publication 970"
    ]
    .iter()
    .map(|p| regex::Regex::new(p).expect("exact-term pattern is valid"))
    .collect()
});

/// Lexical/vector blend handed to the store's text-ranking function.
/// The two weights always sum to 1.0 by construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl FusionWeights {
    /// Build from the lexical weight; the vector weight is the complement.
    pub fn from_lexical(lexical: f32) -> Self {
        let lexical = lexical.clamp(0.0, 1.0);
        Self {
            lexical,
            vector: 1.0 - lexical,
        }
    }
}

/// True when the query contains at least one exact-match indicator.
pub fn has_exact_terms(query: &str) -> bool {
    EXACT_TERM_PATTERNS.iter().any(|re| re.is_match(query))
}

/// Pick the weight pair for a query: the lexical-favoring pair when exact
/// indicators are present, otherwise the configured default.
pub fn adaptive_weights(
    query: &str,
    default_lexical: f32,
    exact_lexical: f32,
    adaptive: bool,
) -> FusionWeights {
    if adaptive && has_exact_terms(query) {
        tracing::info!(query = %query, "Exact-match terms detected, boosting lexical weight");
        FusionWeights::from_lexical(exact_lexical)
    } else {
        FusionWeights::from_lexical(default_lexical)
    }
}
