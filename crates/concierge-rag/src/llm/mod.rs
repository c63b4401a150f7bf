//! Completion-service abstraction.
//!
//! Every LLM judgment in the pipeline (gating, routing, generation,
//! faithfulness) goes through a [`CompletionService`] wrapped in a
//! [`ModelChain`]: an ordered list of models tried in sequence, with each
//! attempt's failure captured as a typed [`ProviderFailure`] rather than an
//! opaque exception.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod fallback;
pub mod openai_compat;

pub use fallback::{ChainExhausted, ModelChain};
pub use openai_compat::OpenAiCompatClient;

/// A single chat turn sent to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Ask the provider for a JSON object response when it supports it.
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: 1000,
            temperature: 0.4,
            json_response: false,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Why a single provider call failed. Drives fallback iteration: every
/// variant means "try the next model", none is terminal for the request.
#[derive(Debug, thiserror::Error)]
pub enum ProviderFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited (HTTP 429): {0}")]
    RateLimited(String),
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// A completion backend addressable by model name.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderFailure>;
}
