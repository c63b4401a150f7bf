//! Ordered model fallback.
//!
//! A [`ModelChain`] holds a primary model plus fallbacks and tries them in
//! sequence. Each attempt is bounded by its own timeout; timeout, HTTP error,
//! rate limit, and malformed output all mean "advance to the next model".
//! Exhaustion reports every attempt so the caller can log the whole chain
//! before applying its local deterministic fallback.

use std::sync::Arc;
use std::time::Duration;

use super::{CompletionRequest, CompletionService, ProviderFailure};

pub struct ModelChain {
    service: Arc<dyn CompletionService>,
    models: Vec<String>,
    timeout: Duration,
}

/// All models in the chain failed. Carries one typed failure per attempt,
/// in the order tried.
#[derive(Debug, thiserror::Error)]
#[error("all {} completion models failed", .attempts.len())]
pub struct ChainExhausted {
    pub attempts: Vec<(String, ProviderFailure)>,
}

impl ModelChain {
    pub fn new(
        service: Arc<dyn CompletionService>,
        primary: impl Into<String>,
        fallbacks: &[String],
        timeout: Duration,
    ) -> Self {
        let mut models = vec![primary.into()];
        models.extend(fallbacks.iter().cloned());
        Self {
            service,
            models,
            timeout,
        }
    }

    /// Override the per-attempt timeout (e.g. longer for answer generation
    /// than for routing judgments).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Try each model in order; return the first success.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ChainExhausted> {
        let mut attempts = Vec::new();

        for model in &self.models {
            let outcome =
                tokio::time::timeout(self.timeout, self.service.complete(model, request)).await;

            match outcome {
                Ok(Ok(text)) => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            model = %model,
                            failed_attempts = attempts.len(),
                            "Completion succeeded after fallback"
                        );
                    }
                    return Ok(text);
                }
                Ok(Err(failure)) => {
                    tracing::warn!(model = %model, error = %failure, "Completion attempt failed");
                    attempts.push((model.clone(), failure));
                }
                Err(_) => {
                    tracing::warn!(model = %model, timeout = ?self.timeout, "Completion attempt timed out");
                    attempts.push((model.clone(), ProviderFailure::Timeout(self.timeout)));
                }
            }
        }

        Err(ChainExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails for every model except the named one.
    struct OnlyModelWorks {
        working_model: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for OnlyModelWorks {
        async fn complete(
            &self,
            model: &str,
            _request: &CompletionRequest,
        ) -> Result<String, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if model == self.working_model {
                Ok(format!("answer from {}", model))
            } else {
                Err(ProviderFailure::Http {
                    status: 500,
                    message: "boom".to_string(),
                })
            }
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl CompletionService for AlwaysFails {
        async fn complete(
            &self,
            _model: &str,
            _request: &CompletionRequest,
        ) -> Result<String, ProviderFailure> {
            Err(ProviderFailure::RateLimited("quota".to_string()))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let service = Arc::new(OnlyModelWorks {
            working_model: "primary".to_string(),
            calls: AtomicUsize::new(0),
        });
        let chain = ModelChain::new(
            service.clone(),
            "primary",
            &["backup".to_string()],
            Duration::from_secs(5),
        );
        let result = chain.complete(&request()).await.unwrap();
        assert_eq!(result, "answer from primary");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_through_to_working_model_in_order() {
        let service = Arc::new(OnlyModelWorks {
            working_model: "backup2".to_string(),
            calls: AtomicUsize::new(0),
        });
        let chain = ModelChain::new(
            service.clone(),
            "primary",
            &["backup1".to_string(), "backup2".to_string()],
            Duration::from_secs(5),
        );
        let result = chain.complete(&request()).await.unwrap();
        assert_eq!(result, "answer from backup2");
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_every_attempt() {
        let chain = ModelChain::new(
            Arc::new(AlwaysFails),
            "a",
            &["b".to_string(), "c".to_string()],
            Duration::from_secs(5),
        );
        let err = chain.complete(&request()).await.unwrap_err();
        assert_eq!(err.attempts.len(), 3);
        assert_eq!(err.attempts[0].0, "a");
        assert_eq!(err.attempts[2].0, "c");
        assert!(matches!(
            err.attempts[0].1,
            ProviderFailure::RateLimited(_)
        ));
    }

    #[tokio::test]
    async fn slow_provider_is_classified_as_timeout() {
        struct Hangs;

        #[async_trait]
        impl CompletionService for Hangs {
            async fn complete(
                &self,
                _model: &str,
                _request: &CompletionRequest,
            ) -> Result<String, ProviderFailure> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            }
        }

        let chain = ModelChain::new(Arc::new(Hangs), "slow", &[], Duration::from_millis(20));
        let err = chain.complete(&request()).await.unwrap_err();
        assert!(matches!(err.attempts[0].1, ProviderFailure::Timeout(_)));
    }
}
