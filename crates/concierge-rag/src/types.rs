use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single incoming user question. Immutable input to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Position of a chunk inside its source document group.
/// Ordinals are 1-based, matching how ingestion numbers chapter chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub group_id: String,
    pub ordinal: u32,
    pub group_size: u32,
}

/// A retrieved knowledge-base chunk. Identity is `id`; the score fields are
/// annotations attached by successive pipeline stages and are never
/// overwritten destructively; downstream diagnostics rely on all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub title: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl DocumentChunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            title: String::new(),
            source: String::new(),
            position: None,
            lexical_score: None,
            vector_similarity: None,
            fused_score: None,
            rerank_score: None,
        }
    }

    /// Best available relevance signal: rerank score when the reranker ran,
    /// otherwise the raw vector similarity.
    pub fn relevance(&self) -> f32 {
        self.rerank_score
            .or(self.vector_similarity)
            .unwrap_or(0.0)
    }
}

/// Verdict from the disambiguation gate. Produced once per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguityVerdict {
    pub is_ambiguous: bool,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default)]
    pub clarification_question: Option<String>,
    pub confidence: f32,
}

impl AmbiguityVerdict {
    /// The fail-open verdict: never blocks the pipeline.
    pub fn fail_open() -> Self {
        Self {
            is_ambiguous: false,
            missing_info: Vec::new(),
            clarification_question: None,
            confidence: 0.5,
        }
    }
}

/// Domain intent categories for incoming questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SimpleTax,
    ComplexTax,
    Urgent,
    Bookkeeping,
    General,
    Disambiguation,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleTax => "simple_tax",
            Self::ComplexTax => "complex_tax",
            Self::Urgent => "urgent",
            Self::Bookkeeping => "bookkeeping",
            Self::General => "general",
            Self::Disambiguation => "disambiguation",
        }
    }

    /// The domain part used for specialty matching ("simple_tax" -> "tax").
    pub fn domain(&self) -> &'static str {
        match self {
            Self::SimpleTax | Self::ComplexTax => "tax",
            Self::Urgent => "urgent",
            Self::Bookkeeping => "bookkeeping",
            Self::General => "general",
            Self::Disambiguation => "disambiguation",
        }
    }
}

/// Where the final answer should come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Ai,
    Human,
    Clarification,
}

/// How the routing decision was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    Llm,
    KeywordFallback,
    Default,
}

/// Routing decision for a query: three 1-5 complexity axes plus the route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: Intent,
    pub technical_complexity: u8,
    pub urgency: u8,
    pub risk_exposure: u8,
    pub route: Route,
    pub confidence: f32,
    pub reasoning: String,
    pub method: RoutingMethod,
}

impl RoutingDecision {
    /// Overall complexity is the maximum of the three axes, never an average:
    /// a single severe axis is enough to force escalation.
    pub fn complexity_score(&self) -> u8 {
        self.technical_complexity
            .max(self.urgency)
            .max(self.risk_exposure)
    }

    /// The router's last-resort decision when both the LLM chain and the
    /// keyword classifier are unavailable. The system never refuses to answer.
    pub fn default_ai() -> Self {
        Self {
            intent: Intent::General,
            technical_complexity: 2,
            urgency: 1,
            risk_exposure: 2,
            route: Route::Ai,
            confidence: 0.5,
            reasoning: "No routing available, defaulting to AI".to_string(),
            method: RoutingMethod::Default,
        }
    }
}

/// Expert availability as reported by the profile store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Busy,
}

/// A human specialist profile. Lifecycle owned by the external profile store;
/// read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub id: String,
    pub name: String,
    pub specialties: Vec<String>,
    pub availability: Availability,
    /// Average rating in [0, 5].
    pub performance_rating: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Result of expert matching. Recomputed per query, never persisted.
/// `match_score` can exceed 1.0 when the urgency multiplier applies: it is a
/// ranking key, not a calibrated probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertMatch {
    pub expert_id: String,
    pub expert_name: String,
    pub specialties: Vec<String>,
    pub match_score: f32,
    pub estimated_wait: String,
}

/// A source reference surfaced alongside the generated answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub source: String,
    /// Rerank score when available, otherwise vector similarity.
    pub relevance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_similarity: Option<f32>,
}

impl SourceRef {
    pub fn from_chunk(chunk: &DocumentChunk) -> Self {
        Self {
            title: chunk.title.clone(),
            source: if chunk.source.is_empty() {
                "Internal".to_string()
            } else {
                chunk.source.clone()
            },
            relevance: chunk.relevance(),
            rerank_score: chunk.rerank_score,
            original_similarity: chunk.vector_similarity,
        }
    }
}

/// The single boundary result returned to the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub conversation_id: String,
    pub intent: Intent,
    pub complexity_score: u8,
    pub route_decision: Route,
    pub response: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert: Option<ExpertMatch>,
    pub sources: Vec<SourceRef>,
    pub reasoning: String,
}

/// A stored conversation message as returned by the conversation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Expert,
    Audit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_score_is_max_of_axes() {
        let decision = RoutingDecision {
            intent: Intent::ComplexTax,
            technical_complexity: 2,
            urgency: 5,
            risk_exposure: 3,
            route: Route::Human,
            confidence: 0.9,
            reasoning: String::new(),
            method: RoutingMethod::Llm,
        };
        assert_eq!(decision.complexity_score(), 5);
    }

    #[test]
    fn relevance_prefers_rerank_score() {
        let mut chunk = DocumentChunk::new("c1", "text");
        chunk.vector_similarity = Some(0.4);
        assert_eq!(chunk.relevance(), 0.4);
        chunk.rerank_score = Some(0.9);
        assert_eq!(chunk.relevance(), 0.9);
    }

    #[test]
    fn fail_open_verdict_never_blocks() {
        let verdict = AmbiguityVerdict::fail_open();
        assert!(!verdict.is_ambiguous);
        assert_eq!(verdict.confidence, 0.5);
    }

    #[test]
    fn intent_serializes_snake_case() {
        let json = serde_json::to_string(&Intent::ComplexTax).unwrap();
        assert_eq!(json, "\"complex_tax\"");
    }
}
