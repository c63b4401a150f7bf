//! Neighbor-chunk context expansion.
//!
//! Search small, feed big: retrieval matches on small chunks for precision,
//! then each retained hit is widened with its neighbors from the same source
//! group before generation. Expansion changes what the generator reads, never
//! how the chunk was ranked: the similarity, fused, and rerank scores
//! attached upstream stay exactly as they were.

use std::sync::Arc;

use crate::services::DocumentStore;
use crate::types::DocumentChunk;

pub struct ContextExpander {
    store: Arc<dyn DocumentStore>,
    window: u32,
}

impl ContextExpander {
    pub fn new(store: Arc<dyn DocumentStore>, window: u32) -> Self {
        Self { store, window }
    }

    /// Replace each positioned chunk's content with the stitched
    /// `[ordinal - window, ordinal + window]` span of its group, clamped to
    /// `[1, group_size]`. Chunks without position metadata pass through;
    /// sibling-fetch failures keep the original chunk. Never drops a chunk.
    pub async fn expand(&self, chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
        if self.window == 0 {
            return chunks;
        }

        let mut expanded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            expanded.push(self.expand_one(chunk).await);
        }
        expanded
    }

    async fn expand_one(&self, chunk: DocumentChunk) -> DocumentChunk {
        let Some(position) = chunk.position.clone() else {
            return chunk;
        };

        let start = position.ordinal.saturating_sub(self.window).max(1);
        let end = (position.ordinal + self.window).min(position.group_size);

        let siblings = match self
            .store
            .fetch_range(&position.group_id, start, end)
            .await
        {
            Ok(siblings) if !siblings.is_empty() => siblings,
            Ok(_) => {
                tracing::debug!(group = %position.group_id, "No siblings returned, keeping original chunk");
                return chunk;
            }
            Err(e) => {
                tracing::warn!(
                    group = %position.group_id,
                    error = %e,
                    "Sibling fetch failed, keeping original chunk"
                );
                return chunk;
            }
        };

        let stitched = siblings
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        tracing::debug!(
            group = %position.group_id,
            ordinal = position.ordinal,
            siblings = siblings.len(),
            "Expanded chunk"
        );

        DocumentChunk {
            content: stitched,
            ..chunk
        }
    }
}
