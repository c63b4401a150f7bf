//! Keyword-based intent classification.
//!
//! Deterministic regex matcher used only when every completion model in the
//! routing chain has failed. Counts pattern hits per intent and picks the
//! intent with the most matches.

use std::sync::LazyLock;

use crate::types::Intent;

static INTENT_PATTERNS: LazyLock<Vec<(Intent, Vec<regex::Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| -> Vec<regex::Regex> {
        patterns
            .iter()
            .map(|p| regex::Regex::new(&format!("(?i){}", p)).expect("intent pattern is valid"))
            .collect()
    };

    vec![
        (
            Intent::Urgent,
            compile(&[
                r"\baudite?d?\b",
                r"\birs\b",
                r"\bpenalty\b",
                r"\bnotice\b",
                r"\bemergency\b",
                r"\burgent\b",
                r"\bdeadline\b",
                r"\btoday\b",
                r"\basap\b",
                r"\blocked\b",
            ]),
        ),
        (
            Intent::ComplexTax,
            compile(&[
                r"\bcapital gains?\b",
                r"\bcrypto\b",
                r"\bstaking\b",
                r"\bforeign tax\b",
                r"\b1031\b",
                r"\bexchange\b",
                r"\bqbi\b",
                r"\bqualified business income\b",
                r"\bmulti[- ]state\b",
                r"\binternational\b",
                r"\btreaty\b",
                r"\bk-?1\b",
                r"\bpartnership\b",
                r"\bdistribution\b",
            ]),
        ),
        (
            Intent::Bookkeeping,
            compile(&[
                r"\breconcil\w*\b",
                r"\bquickbooks\b",
                r"\bxero\b",
                r"\binvoice\b",
                r"\bpayroll\b",
                r"\bcash flow\b",
                r"\bchart of accounts\b",
                r"\bcategoriz\w*\b",
            ]),
        ),
        (
            Intent::SimpleTax,
            compile(&[
                r"\bstandard deduction\b",
                r"\bw-?2\b",
                r"\b1040\b",
                r"\bfiling\b",
                r"\brefund\b",
                r"\bdeduction\b",
                r"\btax bracket\b",
                r"\beitc\b",
                r"\bearned income\b",
                r"\bhome office\b",
                r"\bself[- ]employ\w*\b",
                r"\bextension\b",
            ]),
        ),
    ]
});

/// Fixed complexity assigned to each keyword-derived intent. The router maps
/// these back onto its 1-5 scale when the LLM chain is down.
pub fn complexity_for(intent: Intent) -> u8 {
    match intent {
        Intent::SimpleTax => 2,
        Intent::ComplexTax => 4,
        Intent::Urgent => 5,
        Intent::Bookkeeping => 3,
        Intent::General | Intent::Disambiguation => 2,
    }
}

#[derive(Debug, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a query into an intent with a rough confidence.
    /// More matching keywords means higher confidence, capped at 0.95.
    pub fn classify(&self, query: &str) -> (Intent, f32) {
        let mut best: Option<(Intent, usize)> = None;

        for (intent, patterns) in INTENT_PATTERNS.iter() {
            let hits = patterns.iter().filter(|re| re.is_match(query)).count();
            if hits > 0 && best.map_or(true, |(_, n)| hits > n) {
                best = Some((*intent, hits));
            }
        }

        match best {
            Some((intent, hits)) => {
                let confidence = (0.6 + hits as f32 * 0.15).min(0.95);
                (intent, confidence)
            }
            None => (Intent::General, 0.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_notice_classifies_urgent() {
        let (intent, confidence) = KeywordClassifier::new().classify("I received an IRS audit notice yesterday");
        assert_eq!(intent, Intent::Urgent);
        assert!(confidence > 0.6);
    }

    #[test]
    fn crypto_staking_classifies_complex() {
        let (intent, _) =
            KeywordClassifier::new().classify("How do I report crypto staking rewards?");
        assert_eq!(intent, Intent::ComplexTax);
    }

    #[test]
    fn quickbooks_classifies_bookkeeping() {
        let (intent, _) =
            KeywordClassifier::new().classify("How do I categorize meals in QuickBooks?");
        assert_eq!(intent, Intent::Bookkeeping);
    }

    #[test]
    fn no_keywords_falls_back_to_general() {
        let (intent, confidence) = KeywordClassifier::new().classify("hello there");
        assert_eq!(intent, Intent::General);
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn complexity_map_escalates_only_complex_and_urgent() {
        assert!(complexity_for(Intent::ComplexTax) >= 4);
        assert!(complexity_for(Intent::Urgent) >= 4);
        assert!(complexity_for(Intent::SimpleTax) < 4);
        assert!(complexity_for(Intent::Bookkeeping) < 4);
        assert!(complexity_for(Intent::General) < 4);
    }
}
