//! Collaborator contracts consumed by the pipeline.
//!
//! The document store, embedding service, rerank service, expert profile
//! store, and conversation store are external systems. The core is written
//! against these traits and never assumes a concrete backend; a possibly
//! stale, read-mostly index is acceptable.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{DocumentChunk, ExpertProfile, MessageRole, StoredMessage};

/// Read access to the chunked knowledge store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Vector similarity search. Results are ranked best-first and filtered
    /// by `similarity_floor`; each hit carries `vector_similarity`.
    async fn search_by_vector(
        &self,
        embedding: &[f32],
        k: usize,
        similarity_floor: f32,
    ) -> Result<Vec<DocumentChunk>>;

    /// Text-ranked search using the store's own ranking function. `weight_hint`
    /// is the lexical weight the store should apply when it blends signals
    /// internally; each hit carries `lexical_score`.
    async fn search_by_text(
        &self,
        query: &str,
        k: usize,
        weight_hint: f32,
    ) -> Result<Vec<DocumentChunk>>;

    /// Fetch chunks of one document group with ordinals in
    /// `[start_ordinal, end_ordinal]` inclusive, ordered by ordinal.
    async fn fetch_range(
        &self,
        group_id: &str,
        start_ordinal: u32,
        end_ordinal: u32,
    ) -> Result<Vec<DocumentChunk>>;
}

/// Query/profile text embedding.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Second-pass relevance scoring of (query, document) pairs.
#[async_trait]
pub trait RerankService: Send + Sync {
    /// Returns `(index_into_documents, relevance_score)` ordered by relevance
    /// descending, truncated to `top_n`.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>>;
}

/// Read access to human specialist profiles.
#[async_trait]
pub trait ExpertStore: Send + Sync {
    async fn list_experts(&self) -> Result<Vec<ExpertProfile>>;
}

/// Conversation transcript persistence (the audit trail). Owned externally;
/// write failures are logged by callers, never surfaced to the user.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<()>;

    /// Most recent messages in chronological order, up to `limit`.
    async fn fetch_recent(&self, conversation_id: &str, limit: usize)
        -> Result<Vec<StoredMessage>>;
}

/// Cosine similarity between two vectors. Returns 0.0 for mismatched lengths
/// or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.5, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_handles_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
