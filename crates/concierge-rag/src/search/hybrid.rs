//! Hybrid retrieval: concurrent lexical + vector search fused with
//! Reciprocal Rank Fusion.
//!
//! RRF merges the two ranked lists without score normalization:
//! `fused(doc) = Σ 1/(k_rrf + rank + 1)` over the lists containing the doc.
//! Absence from a list contributes zero, not a penalty. Either sub-search
//! failing degrades the retriever to the surviving list; both failing yields
//! an empty result, which the orchestrator treats as "no evidence".

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::config::RetrievalConfig;
use crate::services::{DocumentStore, EmbeddingService};
use crate::types::DocumentChunk;

use super::weights::{adaptive_weights, FusionWeights};

/// RRF constant. Part of the fused-score contract: with k = 60, a document at
/// rank r contributes 1/(60 + r + 1).
pub const RRF_K: usize = 60;

pub struct HybridRetriever {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingService>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingService>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            config,
        }
    }

    /// Weight pair this retriever would apply to a query.
    pub fn weights_for(&self, query: &str) -> FusionWeights {
        adaptive_weights(
            query,
            self.config.default_lexical_weight,
            self.config.exact_lexical_weight,
            self.config.adaptive_weights,
        )
    }

    /// Retrieve the top `k` chunks for `query`, fused across both signals.
    /// Returned chunks carry `lexical_score`, `vector_similarity`, and
    /// `fused_score` for downstream diagnostics.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        let weights = self.weights_for(query);

        let embedding = match self.embeddings.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                // Without an embedding the vector path is unusable; the
                // lexical path still works on raw query text.
                tracing::warn!(error = %e, "Query embedding failed, lexical-only retrieval");
                let lexical = self
                    .store
                    .search_by_text(query, k, weights.lexical)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "Lexical search failed");
                        Vec::new()
                    });
                return Ok(fuse(lexical, Vec::new(), k));
            }
        };

        let (lexical, vector) = tokio::join!(
            self.store.search_by_text(query, k, weights.lexical),
            self.store
                .search_by_vector(&embedding, k, self.config.similarity_floor),
        );

        let lexical = lexical.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Lexical search failed, degrading to vector-only");
            Vec::new()
        });
        let vector = vector.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Vector search failed, degrading to lexical-only");
            Vec::new()
        });

        let fused = fuse(lexical, vector, k);
        tracing::info!(
            query = %query,
            lexical_weight = weights.lexical,
            fused = fused.len(),
            "Hybrid retrieval complete"
        );
        Ok(fused)
    }
}

/// Fuse two ranked lists with RRF, keeping first-discovery order for ties.
///
/// Per-list scores already attached to the chunks are preserved; a chunk
/// found in both lists keeps its lexical score from the lexical list and
/// gains the vector similarity from the vector list.
fn fuse(lexical: Vec<DocumentChunk>, vector: Vec<DocumentChunk>, k: usize) -> Vec<DocumentChunk> {
    // Accumulate in discovery order so the later stable sort resolves ties
    // to whichever chunk a sub-search surfaced first.
    let mut order: Vec<DocumentChunk> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (rank, chunk) in lexical.into_iter().enumerate() {
        let rrf = 1.0 / (RRF_K as f32 + rank as f32 + 1.0);
        match index.get(&chunk.id) {
            Some(&i) => {
                let existing = &mut order[i];
                existing.fused_score = Some(existing.fused_score.unwrap_or(0.0) + rrf);
                if existing.lexical_score.is_none() {
                    existing.lexical_score = chunk.lexical_score;
                }
            }
            None => {
                let mut chunk = chunk;
                chunk.fused_score = Some(rrf);
                index.insert(chunk.id.clone(), order.len());
                order.push(chunk);
            }
        }
    }

    for (rank, chunk) in vector.into_iter().enumerate() {
        let rrf = 1.0 / (RRF_K as f32 + rank as f32 + 1.0);
        match index.get(&chunk.id) {
            Some(&i) => {
                let existing = &mut order[i];
                existing.fused_score = Some(existing.fused_score.unwrap_or(0.0) + rrf);
                if existing.vector_similarity.is_none() {
                    existing.vector_similarity = chunk.vector_similarity;
                }
            }
            None => {
                let mut chunk = chunk;
                chunk.fused_score = Some(rrf);
                index.insert(chunk.id.clone(), order.len());
                order.push(chunk);
            }
        }
    }

    // sort_by is stable: equal fused scores keep discovery order.
    order.sort_by(|a, b| {
        b.fused_score
            .unwrap_or(0.0)
            .partial_cmp(&a.fused_score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(k);
    order
}
