//! Multi-signal confidence scoring.
//!
//! Two blends share the same inputs: the immediate score returned with the
//! answer, and the deferred score recomputed once the asynchronous
//! faithfulness judgment lands. Both are capped at 0.95: this system never
//! reports near-certainty for a domain with real financial and legal risk.

use crate::config::ConfidenceConfig;

/// Signals collected from the retrieval stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrievalSignals {
    /// Best vector similarity across the final document set.
    pub max_similarity: f32,
    /// Best rerank score, when the reranker ran.
    pub rerank_score: Option<f32>,
}

impl RetrievalSignals {
    /// Rerank score when present, raw similarity otherwise.
    pub fn retrieval_quality(&self) -> f32 {
        self.rerank_score.unwrap_or(self.max_similarity)
    }
}

/// Signals extracted from the generated answer.
#[derive(Debug, Clone, Copy)]
pub struct AnswerSignals {
    pub has_citations: bool,
    /// The model's self-reported confidence; 0.7 when not extractable.
    pub self_confidence: f32,
}

impl Default for AnswerSignals {
    fn default() -> Self {
        Self {
            has_citations: false,
            self_confidence: 0.7,
        }
    }
}

/// Immediate confidence, computed synchronously before the response returns.
pub fn immediate(
    config: &ConfidenceConfig,
    retrieval: RetrievalSignals,
    answer: AnswerSignals,
) -> f32 {
    let citation_bonus = if answer.has_citations {
        config.citation_bonus
    } else {
        0.0
    };

    let value = retrieval.retrieval_quality() * config.retrieval_weight
        + answer.self_confidence * config.self_confidence_weight
        + citation_bonus;

    value.clamp(0.0, config.cap)
}

/// Deferred confidence, recomputed once the faithfulness judgment is
/// available. Reweights toward faithfulness; never alters the response the
/// user already received.
pub fn deferred(
    config: &ConfidenceConfig,
    retrieval: RetrievalSignals,
    answer: AnswerSignals,
    faithfulness: f32,
) -> f32 {
    let citation_bonus = if answer.has_citations {
        config.citation_bonus
    } else {
        0.0
    };

    let value = faithfulness * config.faithfulness_weight
        + retrieval.retrieval_quality() * config.deferred_retrieval_weight
        + answer.self_confidence * config.deferred_self_weight
        + citation_bonus;

    value.clamp(0.0, config.cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConfidenceConfig {
        crate::config::EngineConfig::default().confidence
    }

    #[test]
    fn immediate_weights_retrieval_most_heavily() {
        let value = immediate(
            &config(),
            RetrievalSignals {
                max_similarity: 0.8,
                rerank_score: None,
            },
            AnswerSignals {
                has_citations: false,
                self_confidence: 0.7,
            },
        );
        assert!((value - (0.8 * 0.7 + 0.7 * 0.3)).abs() < 1e-6);
    }

    #[test]
    fn rerank_score_replaces_similarity_when_present() {
        let with_rerank = immediate(
            &config(),
            RetrievalSignals {
                max_similarity: 0.2,
                rerank_score: Some(0.9),
            },
            AnswerSignals::default(),
        );
        let without = immediate(
            &config(),
            RetrievalSignals {
                max_similarity: 0.2,
                rerank_score: None,
            },
            AnswerSignals::default(),
        );
        assert!(with_rerank > without);
    }

    #[test]
    fn citation_bonus_is_a_flat_addend() {
        let retrieval = RetrievalSignals {
            max_similarity: 0.5,
            rerank_score: None,
        };
        let cited = immediate(
            &config(),
            retrieval,
            AnswerSignals {
                has_citations: true,
                self_confidence: 0.7,
            },
        );
        let uncited = immediate(
            &config(),
            retrieval,
            AnswerSignals {
                has_citations: false,
                self_confidence: 0.7,
            },
        );
        assert!((cited - uncited - 0.05).abs() < 1e-6);
    }

    #[test]
    fn never_exceeds_the_cap() {
        let value = immediate(
            &config(),
            RetrievalSignals {
                max_similarity: 1.0,
                rerank_score: Some(1.0),
            },
            AnswerSignals {
                has_citations: true,
                self_confidence: 1.0,
            },
        );
        assert!(value <= 0.95);

        let deferred_value = deferred(
            &config(),
            RetrievalSignals {
                max_similarity: 1.0,
                rerank_score: Some(1.0),
            },
            AnswerSignals {
                has_citations: true,
                self_confidence: 1.0,
            },
            1.0,
        );
        assert!(deferred_value <= 0.95);
    }

    #[test]
    fn never_goes_negative() {
        let value = immediate(
            &config(),
            RetrievalSignals::default(),
            AnswerSignals {
                has_citations: false,
                self_confidence: 0.0,
            },
        );
        assert!(value >= 0.0);
    }

    #[test]
    fn deferred_reweights_toward_faithfulness() {
        let retrieval = RetrievalSignals {
            max_similarity: 0.5,
            rerank_score: None,
        };
        let answer = AnswerSignals {
            has_citations: false,
            self_confidence: 0.5,
        };
        let faithful = deferred(&config(), retrieval, answer, 1.0);
        let unfaithful = deferred(&config(), retrieval, answer, 0.0);
        assert!((faithful - unfaithful - 0.6).abs() < 1e-6);
    }
}
