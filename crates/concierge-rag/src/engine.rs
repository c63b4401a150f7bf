//! Pipeline orchestration.
//!
//! Sequences gate -> router -> retrieval -> rerank -> expansion ->
//! generation -> confidence -> escalation for each incoming query, and owns
//! the final escalation policy. Every collaborator is injected at
//! construction; `answer_query` is infallible: total upstream failure still
//! produces a well-formed outcome.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::experts::ExpertMatcher;
use crate::llm::{CompletionService, ModelChain};
use crate::rag::confidence::{self, AnswerSignals, RetrievalSignals};
use crate::rag::faithfulness::score_faithfulness;
use crate::rag::generation::{
    render_history, AnswerGenerator, GENERATION_FAILED_RESPONSE, NO_EVIDENCE_RESPONSE,
};
use crate::rag::ContextExpander;
use crate::reranking::Reranker;
use crate::routing::{DisambiguationGate, LlmRouter};
use crate::search::HybridRetriever;
use crate::services::{
    ConversationStore, DocumentStore, EmbeddingService, ExpertStore, RerankService,
};
use crate::types::{
    DocumentChunk, Intent, MessageRole, Query, QueryOutcome, Route, SourceRef,
};

/// The external collaborators the engine is constructed over.
pub struct EngineServices {
    pub completion: Arc<dyn CompletionService>,
    pub documents: Arc<dyn DocumentStore>,
    pub embeddings: Arc<dyn EmbeddingService>,
    pub rerank: Arc<dyn RerankService>,
    pub experts: Arc<dyn ExpertStore>,
    pub conversations: Arc<dyn ConversationStore>,
}

pub struct ConciergeEngine {
    config: EngineConfig,
    gate: DisambiguationGate,
    router: LlmRouter,
    retriever: HybridRetriever,
    reranker: Reranker,
    expander: ContextExpander,
    generator: AnswerGenerator,
    matcher: ExpertMatcher,
    conversations: Arc<dyn ConversationStore>,
    judge_chain: Arc<ModelChain>,
}

impl ConciergeEngine {
    pub fn new(config: EngineConfig, services: EngineServices) -> Self {
        let judge_chain = Arc::new(ModelChain::new(
            services.completion.clone(),
            config.routing.model.clone(),
            &config.routing.fallback_models,
            config.routing.judge_timeout,
        ));
        let generation_chain = Arc::new(ModelChain::new(
            services.completion.clone(),
            config.routing.model.clone(),
            &config.routing.fallback_models,
            config.routing.generation_timeout,
        ));

        Self {
            gate: DisambiguationGate::new(judge_chain.clone()),
            router: LlmRouter::new(judge_chain.clone(), config.routing.cache_capacity),
            retriever: HybridRetriever::new(
                services.documents.clone(),
                services.embeddings.clone(),
                config.retrieval.clone(),
            ),
            reranker: Reranker::new(services.rerank.clone())
                .with_skip_above(config.retrieval.skip_rerank_above_similarity),
            expander: ContextExpander::new(
                services.documents.clone(),
                config.retrieval.expansion_window,
            ),
            generator: AnswerGenerator::new(generation_chain),
            matcher: ExpertMatcher::new(services.experts.clone(), services.embeddings.clone()),
            conversations: services.conversations,
            judge_chain,
            config,
        }
    }

    /// The sole boundary operation: answer a user question. Never fails;
    /// worst case is the generic expert-handoff response.
    pub async fn answer_query(&self, query: Query) -> QueryOutcome {
        let conversation_id = query
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let normalized = normalize_query(&query.text);

        // Stage 0: disambiguation. Fragment queries get their clarification
        // back before any retrieval cost is paid.
        let verdict = self.gate.check(&normalized).await;
        if verdict.is_ambiguous && verdict.confidence > 0.7 {
            if let Some(question) = verdict.clarification_question.clone() {
                tracing::info!(question = %question, "Short-circuiting with clarification");
                return QueryOutcome {
                    conversation_id,
                    intent: Intent::Disambiguation,
                    complexity_score: 0,
                    route_decision: Route::Clarification,
                    response: question,
                    confidence: verdict.confidence,
                    expert: None,
                    sources: Vec::new(),
                    reasoning: format!("Missing: {}", verdict.missing_info.join(", ")),
                };
            }
        }

        // Stage 1: routing.
        let decision = self.router.route(&normalized).await;

        // Stage 2: grounded generation, regardless of route, since the automatic
        // answer is also the fallback when no expert can be matched.
        let generation = self.run_generation(&query.text, &normalized, &conversation_id).await;

        // Stage 3: escalation policy. The router's call stands, plus a
        // low-confidence override for complex queries routed to AI.
        let urgency = decision.urgency >= 4;
        let route_says_human = decision.route == Route::Human;
        let confidence_override = generation.confidence
            < self.config.escalation.low_confidence_threshold
            && decision.complexity_score() >= self.config.escalation.min_complexity;
        let mut escalate = route_says_human || confidence_override;
        if escalate != route_says_human {
            tracing::info!(
                confidence = generation.confidence,
                "Overriding route due to low answer confidence"
            );
        }

        // Stage 4: expert matching. A None match reverts to the automatic
        // answer; the system always produces some response.
        let mut expert = None;
        if escalate {
            expert = self
                .matcher
                .find_best_expert(&normalized, decision.intent, urgency)
                .await;
            if expert.is_none() {
                tracing::info!("No expert matched, reverting to automatic answer");
                escalate = false;
            }
        }

        let response = match (&expert, escalate) {
            (Some(matched), true) => format!(
                "I'll connect you with {}, who specializes in {}. They'll be with you shortly.",
                matched.expert_name,
                matched
                    .specialties
                    .iter()
                    .take(2)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => generation.answer.clone(),
        };

        self.persist_exchange(&conversation_id, &query, &response, &generation, escalate)
            .await;

        if !escalate && !generation.contexts.is_empty() {
            self.spawn_deferred_scoring(&conversation_id, &query.text, &generation);
        }

        QueryOutcome {
            conversation_id,
            intent: decision.intent,
            complexity_score: decision.complexity_score(),
            route_decision: decision.route,
            response,
            confidence: generation.confidence,
            expert,
            sources: generation.sources,
            reasoning: decision.reasoning,
        }
    }

    async fn run_generation(
        &self,
        original_query: &str,
        normalized: &str,
        conversation_id: &str,
    ) -> GenerationOutcome {
        let history = match self
            .conversations
            .fetch_recent(conversation_id, self.config.routing.history_limit)
            .await
        {
            Ok(messages) => render_history(&messages),
            Err(e) => {
                tracing::warn!(error = %e, "History fetch failed");
                "No prior conversation".to_string()
            }
        };

        let standalone = self.generator.contextualize(normalized, &history).await;

        let candidates = match self
            .retriever
            .retrieve(&standalone, self.config.retrieval.rerank_top_k)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed entirely");
                Vec::new()
            }
        };

        if candidates.is_empty() {
            return GenerationOutcome::no_evidence();
        }

        let reranked = self
            .reranker
            .rerank(&standalone, candidates, self.config.retrieval.final_k)
            .await;
        let documents = self.expander.expand(reranked).await;

        let retrieval = retrieval_signals(&documents);
        let sources: Vec<SourceRef> = documents.iter().map(SourceRef::from_chunk).collect();
        let contexts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();

        match self
            .generator
            .generate(
                original_query,
                &history,
                &documents,
                self.config.retrieval.max_context_chars,
            )
            .await
        {
            Ok(generated) => {
                let answer_signals = AnswerSignals {
                    has_citations: generated.has_citations,
                    self_confidence: generated.self_confidence,
                };
                let value = confidence::immediate(&self.config.confidence, retrieval, answer_signals);
                tracing::info!(confidence = value, "Answer generated");
                GenerationOutcome {
                    answer: generated.text,
                    confidence: value,
                    sources,
                    contexts,
                    retrieval,
                    answer_signals,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Generation exhausted all models");
                GenerationOutcome {
                    answer: GENERATION_FAILED_RESPONSE.to_string(),
                    confidence: 0.2,
                    sources: Vec::new(),
                    contexts: Vec::new(),
                    retrieval,
                    answer_signals: AnswerSignals::default(),
                }
            }
        }
    }

    async fn persist_exchange(
        &self,
        conversation_id: &str,
        query: &Query,
        response: &str,
        generation: &GenerationOutcome,
        escalated: bool,
    ) {
        if let Err(e) = self
            .conversations
            .append_message(
                conversation_id,
                MessageRole::User,
                &query.text,
                json!({ "user_id": query.user_id }),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to persist user message");
        }

        let role = if escalated {
            MessageRole::Expert
        } else {
            MessageRole::Assistant
        };
        let metadata = json!({
            "confidence": generation.confidence,
            "sources": generation.sources,
        });
        if let Err(e) = self
            .conversations
            .append_message(conversation_id, role, response, metadata)
            .await
        {
            tracing::warn!(error = %e, "Failed to persist response message");
        }
    }

    /// Hand the faithfulness judgment to a detached task. Not awaited, not
    /// cancellable; it only writes the deferred confidence to the audit
    /// trail and its failure is logged, never surfaced.
    fn spawn_deferred_scoring(
        &self,
        conversation_id: &str,
        query: &str,
        generation: &GenerationOutcome,
    ) {
        let chain = self.judge_chain.clone();
        let conversations = self.conversations.clone();
        let confidence_config = self.config.confidence.clone();
        let conversation_id = conversation_id.to_string();
        let query = query.to_string();
        let answer = generation.answer.clone();
        let contexts = generation.contexts.clone();
        let retrieval = generation.retrieval;
        let answer_signals = generation.answer_signals;

        tokio::spawn(async move {
            let score = match score_faithfulness(chain, &query, &answer, &contexts).await {
                Ok(score) => score,
                Err(e) => {
                    tracing::warn!(error = %e, "Deferred faithfulness scoring failed");
                    return;
                }
            };

            let value = confidence::deferred(
                &confidence_config,
                retrieval,
                answer_signals,
                score.faithfulness,
            );

            let metadata = json!({
                "deferred_confidence": value,
                "faithfulness": score.faithfulness,
                "reasoning": score.reasoning,
            });
            if let Err(e) = conversations
                .append_message(&conversation_id, MessageRole::Audit, "", metadata)
                .await
            {
                tracing::warn!(error = %e, "Failed to persist deferred confidence");
            }
        });
    }
}

struct GenerationOutcome {
    answer: String,
    confidence: f32,
    sources: Vec<SourceRef>,
    contexts: Vec<String>,
    retrieval: RetrievalSignals,
    answer_signals: AnswerSignals,
}

impl GenerationOutcome {
    fn no_evidence() -> Self {
        Self {
            answer: NO_EVIDENCE_RESPONSE.to_string(),
            confidence: 0.3,
            sources: Vec::new(),
            contexts: Vec::new(),
            retrieval: RetrievalSignals::default(),
            answer_signals: AnswerSignals::default(),
        }
    }
}

fn retrieval_signals(documents: &[DocumentChunk]) -> RetrievalSignals {
    let max_similarity = documents
        .iter()
        .filter_map(|d| d.vector_similarity)
        .fold(0.0f32, f32::max);
    let rerank_score = documents
        .iter()
        .filter_map(|d| d.rerank_score)
        .fold(None, |acc: Option<f32>, s| {
            Some(acc.map_or(s, |a| a.max(s)))
        });
    RetrievalSignals {
        max_similarity,
        rerank_score,
    }
}

/// Expand common abbreviations before gating and routing.
fn normalize_query(query: &str) -> String {
    let mut normalized = query.replace(" std ", " standard ");
    if let Some(rest) = normalized.strip_prefix("std ") {
        normalized = format!("standard {}", rest);
    }
    normalized
}
