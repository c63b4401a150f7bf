use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub retrieval: RetrievalConfig,
    pub routing: RoutingConfig,
    pub confidence: ConfidenceConfig,
    pub escalation: EscalationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched per sub-search before fusion and reranking.
    pub rerank_top_k: usize,
    /// Documents ultimately fed to answer generation.
    pub final_k: usize,
    /// Minimum cosine similarity for vector hits.
    pub similarity_floor: f32,
    /// Lexical weight when no exact-match indicators are present.
    /// The vector weight is always the complement.
    pub default_lexical_weight: f32,
    /// Lexical weight when the query carries exact-match indicators
    /// (form codes, years, schedule letters).
    pub exact_lexical_weight: f32,
    /// Detect exact-match indicators at all; off means the default pair
    /// is used for every query.
    pub adaptive_weights: bool,
    /// Neighbor chunks fetched on each side during context expansion.
    pub expansion_window: u32,
    /// Skip the rerank round trip when the top fused candidate's vector
    /// similarity already exceeds this. None = always rerank.
    pub skip_rerank_above_similarity: Option<f32>,
    /// Total character budget for the assembled generation context.
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Primary completion model for routing judgments.
    pub model: String,
    /// Ordered fallback models tried on timeout/error/malformed output.
    pub fallback_models: Vec<String>,
    /// Per-provider-call timeout for routing and gating judgments.
    pub judge_timeout: Duration,
    /// Per-provider-call timeout for answer generation.
    pub generation_timeout: Duration,
    /// Capacity of the bounded routing-decision cache.
    pub cache_capacity: usize,
    /// Recent messages pulled for history-aware generation.
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Immediate formula: weight on retrieval quality.
    pub retrieval_weight: f32,
    /// Immediate formula: weight on the LLM's self-reported confidence.
    pub self_confidence_weight: f32,
    /// Flat addend when the answer carries inline citations.
    pub citation_bonus: f32,
    /// Deferred formula: weight on the faithfulness judgment.
    pub faithfulness_weight: f32,
    /// Deferred formula: weight on retrieval quality.
    pub deferred_retrieval_weight: f32,
    /// Deferred formula: weight on self-reported confidence.
    pub deferred_self_weight: f32,
    /// Hard cap. The system never reports near-certainty.
    pub cap: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Escalate an AI-routed answer below this confidence...
    pub low_confidence_threshold: f32,
    /// ...but only when complexity is at least this.
    pub min_complexity: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig {
                rerank_top_k: 30,
                final_k: 5,
                similarity_floor: 0.3,
                default_lexical_weight: 0.6,
                exact_lexical_weight: 0.7,
                adaptive_weights: true,
                expansion_window: 1,
                skip_rerank_above_similarity: None,
                max_context_chars: 8000,
            },
            routing: RoutingConfig {
                model: "llama-3.3-70b-versatile".to_string(),
                fallback_models: vec!["gemini-2.0-flash".to_string()],
                judge_timeout: Duration::from_secs(10),
                generation_timeout: Duration::from_secs(30),
                cache_capacity: 100,
                history_limit: 3,
            },
            confidence: ConfidenceConfig {
                retrieval_weight: 0.7,
                self_confidence_weight: 0.3,
                citation_bonus: 0.05,
                faithfulness_weight: 0.6,
                deferred_retrieval_weight: 0.3,
                deferred_self_weight: 0.1,
                cap: 0.95,
            },
            escalation: EscalationConfig {
                low_confidence_threshold: 0.60,
                min_complexity: 3,
            },
        }
    }
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.retrieval.rerank_top_k == 0 {
            return Err("retrieval.rerank_top_k must be > 0".into());
        }
        if self.retrieval.final_k == 0 {
            return Err("retrieval.final_k must be > 0".into());
        }
        if self.retrieval.final_k > self.retrieval.rerank_top_k {
            return Err("retrieval.final_k must be <= rerank_top_k".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_floor) {
            return Err("retrieval.similarity_floor must be in [0.0, 1.0]".into());
        }
        for (name, w) in [
            ("default_lexical_weight", self.retrieval.default_lexical_weight),
            ("exact_lexical_weight", self.retrieval.exact_lexical_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(format!("retrieval.{} must be in [0.0, 1.0]", name));
            }
        }
        if self.routing.model.is_empty() {
            return Err("routing.model must not be empty".into());
        }
        if self.routing.cache_capacity == 0 {
            return Err("routing.cache_capacity must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.confidence.cap) {
            return Err("confidence.cap must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.escalation.low_confidence_threshold) {
            return Err("escalation.low_confidence_threshold must be in [0.0, 1.0]".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}
