//! Multi-factor expert matching.
//!
//! Scores every specialist profile on specialty fit, availability,
//! performance, and semantic similarity to the query, then picks the single
//! highest scorer. Returns None on empty or failing stores; the caller must
//! treat that as "fall back to the automatic answer", never as an error.

use std::sync::Arc;

use crate::services::{cosine_similarity, EmbeddingService, ExpertStore};
use crate::types::{Availability, ExpertMatch, ExpertProfile, Intent};

const SPECIALTY_WEIGHT: f32 = 0.40;
const AVAILABILITY_WEIGHT: f32 = 0.30;
const PERFORMANCE_WEIGHT: f32 = 0.20;
const SEMANTIC_WEIGHT: f32 = 0.10;
/// Applied when the query is urgent and the expert can take it now.
const URGENCY_MULTIPLIER: f32 = 1.2;

pub struct ExpertMatcher {
    store: Arc<dyn ExpertStore>,
    embeddings: Arc<dyn EmbeddingService>,
}

impl ExpertMatcher {
    pub fn new(store: Arc<dyn ExpertStore>, embeddings: Arc<dyn EmbeddingService>) -> Self {
        Self { store, embeddings }
    }

    /// Find the best-fit specialist for a query. Ties resolve to the earliest
    /// profile in store order.
    pub async fn find_best_expert(
        &self,
        query: &str,
        intent: Intent,
        urgency: bool,
    ) -> Option<ExpertMatch> {
        let experts = match self.store.list_experts().await {
            Ok(experts) => experts,
            Err(e) => {
                tracing::warn!(error = %e, "Expert store unavailable");
                return None;
            }
        };
        if experts.is_empty() {
            tracing::info!("No expert profiles registered");
            return None;
        }

        // One query embedding serves every profile; an embedding outage just
        // zeroes the semantic factor.
        let query_embedding = if experts.iter().any(|e| e.embedding.is_some()) {
            match self.embeddings.embed(query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(error = %e, "Query embedding failed, semantic factor zeroed");
                    None
                }
            }
        } else {
            None
        };

        let mut best: Option<(usize, f32)> = None;
        for (i, expert) in experts.iter().enumerate() {
            let score = score_expert(expert, intent, urgency, query_embedding.as_deref());
            tracing::debug!(expert = %expert.name, score, "Scored expert");
            // Strictly-greater keeps the earliest profile on ties.
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let (index, match_score) = best?;
        let expert = &experts[index];
        let estimated_wait = match expert.availability {
            Availability::Available => "< 5 min",
            Availability::Busy => "15-30 min",
        };

        tracing::info!(
            expert = %expert.name,
            score = match_score,
            "Matched expert"
        );

        Some(ExpertMatch {
            expert_id: expert.id.clone(),
            expert_name: expert.name.clone(),
            specialties: expert.specialties.clone(),
            match_score,
            estimated_wait: estimated_wait.to_string(),
        })
    }
}

/// Weighted score for one profile. Deterministic in its inputs; can exceed
/// 1.0 under the urgency multiplier.
fn score_expert(
    expert: &ExpertProfile,
    intent: Intent,
    urgency: bool,
    query_embedding: Option<&[f32]>,
) -> f32 {
    let specialty = specialty_score(&expert.specialties, intent);

    let is_available = expert.availability == Availability::Available;
    let availability = if is_available { 1.0 } else { 0.3 };

    let performance = (expert.performance_rating / 5.0).clamp(0.0, 1.0);

    let semantic = match (query_embedding, &expert.embedding) {
        (Some(q), Some(e)) => cosine_similarity(q, e).max(0.0),
        _ => 0.0,
    };

    let mut score = specialty * SPECIALTY_WEIGHT
        + availability * AVAILABILITY_WEIGHT
        + performance * PERFORMANCE_WEIGHT
        + semantic * SEMANTIC_WEIGHT;

    if urgency && is_available {
        score *= URGENCY_MULTIPLIER;
    }

    score
}

/// Tiered specialty fit:
/// exact intent-domain membership 1.0, bookkeeping tooling overlap 1.0,
/// tax-category adjacency 0.9, fuzzy substring overlap 0.7, baseline 0.3.
fn specialty_score(specialties: &[String], intent: Intent) -> f32 {
    let domain = intent.domain();

    if specialties.iter().any(|s| s == domain) {
        return 1.0;
    }
    if intent == Intent::Bookkeeping
        && specialties
            .iter()
            .any(|s| s == "bookkeeping" || s == "quickbooks")
    {
        return 1.0;
    }
    if matches!(intent, Intent::SimpleTax | Intent::ComplexTax)
        && specialties.iter().any(|s| s == "tax")
    {
        return 0.9;
    }
    if specialties
        .iter()
        .any(|s| s.contains(domain) || intent.as_str().contains(s.as_str()))
    {
        return 0.7;
    }
    0.3
}
