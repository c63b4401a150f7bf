//! Cross-encoder reranking with fail-open semantics.
//!
//! Reranking is an optimization, not a requirement: on any service failure
//! (error, rate limit, quota, timeout) the candidates pass through in their
//! fused order, truncated to `top_n`, with no `rerank_score` attached. The
//! reranker must never be a single point of failure for answer generation.

pub mod remote;

pub use remote::RemoteRerankClient;

use std::sync::Arc;
use std::time::Duration;

use crate::services::RerankService;
use crate::types::DocumentChunk;

const RERANK_TIMEOUT: Duration = Duration::from_secs(20);

pub struct Reranker {
    service: Arc<dyn RerankService>,
    /// Skip the round trip entirely when the top fused candidate's vector
    /// similarity already exceeds this. None = always rerank.
    skip_above_similarity: Option<f32>,
}

impl Reranker {
    pub fn new(service: Arc<dyn RerankService>) -> Self {
        Self {
            service,
            skip_above_similarity: None,
        }
    }

    pub fn with_skip_above(mut self, threshold: Option<f32>) -> Self {
        self.skip_above_similarity = threshold;
        self
    }

    /// Reorder `candidates` by relevance to `query`, truncated to `top_n`.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<DocumentChunk>,
        top_n: usize,
    ) -> Vec<DocumentChunk> {
        if candidates.is_empty() {
            return candidates;
        }
        if candidates.len() <= 1 {
            let mut candidates = candidates;
            candidates.truncate(top_n);
            return candidates;
        }

        if let Some(threshold) = self.skip_above_similarity {
            let top_similarity = candidates
                .first()
                .and_then(|c| c.vector_similarity)
                .unwrap_or(0.0);
            if top_similarity >= threshold {
                tracing::info!(
                    top_similarity,
                    threshold,
                    "Top candidate already strong, skipping rerank"
                );
                let mut candidates = candidates;
                candidates.truncate(top_n);
                return candidates;
            }
        }

        let documents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();

        let ranking = match tokio::time::timeout(
            RERANK_TIMEOUT,
            self.service.rerank(query, &documents, top_n),
        )
        .await
        {
            Ok(Ok(ranking)) => ranking,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Rerank failed, keeping fused order");
                let mut candidates = candidates;
                candidates.truncate(top_n);
                return candidates;
            }
            Err(_) => {
                tracing::warn!(timeout = ?RERANK_TIMEOUT, "Rerank timed out, keeping fused order");
                let mut candidates = candidates;
                candidates.truncate(top_n);
                return candidates;
            }
        };

        let mut reranked: Vec<DocumentChunk> = Vec::with_capacity(top_n.min(ranking.len()));
        for (index, score) in ranking {
            let Some(original) = candidates.get(index) else {
                tracing::warn!(index, "Rerank returned out-of-range index, skipping");
                continue;
            };
            let mut chunk = original.clone();
            chunk.rerank_score = Some(score);
            reranked.push(chunk);
        }

        if reranked.is_empty() {
            tracing::warn!("Rerank returned no usable entries, keeping fused order");
            let mut candidates = candidates;
            candidates.truncate(top_n);
            return candidates;
        }

        reranked.truncate(top_n);
        tracing::info!(
            candidates = documents.len(),
            kept = reranked.len(),
            "Reranked candidate set"
        );
        reranked
    }
}
