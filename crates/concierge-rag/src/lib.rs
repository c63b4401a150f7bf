//! Query routing and retrieval-ranking core for the Concierge tax assistant.
//!
//! Routes a free-text question either to a grounded automatic answer or to a
//! human specialist. The automatic path runs hybrid (lexical + vector)
//! retrieval fused with reciprocal rank fusion, cross-encoder reranking,
//! neighbor-chunk context expansion, and multi-signal confidence scoring.
//! Every stage degrades gracefully: a provider outage narrows the pipeline,
//! it never fails the request.

pub mod config;
pub mod engine;
pub mod experts;
pub mod llm;
pub mod rag;
pub mod reranking;
pub mod routing;
pub mod search;
pub mod services;
pub mod types;

// Re-export primary types for convenience
pub use config::EngineConfig;
pub use engine::{ConciergeEngine, EngineServices};
pub use types::{
    AmbiguityVerdict, DocumentChunk, ExpertMatch, ExpertProfile, Intent, PositionInfo, Query,
    QueryOutcome, Route, RoutingDecision, RoutingMethod,
};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
