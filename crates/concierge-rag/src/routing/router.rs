//! Intent/complexity routing.
//!
//! Primary path is an LLM judgment scoring three independent axes
//! (technical complexity, urgency, risk exposure, each 1-5) plus an intent
//! label. Any axis at 4 or above routes to a human. The judgment runs through
//! the model fallback chain; exhaustion degrades to the keyword classifier,
//! and a missing classifier degrades to a fixed AI-route default. The router
//! always returns a decision.

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{ChatMessage, CompletionRequest, ModelChain};
use crate::types::{Intent, Route, RoutingDecision, RoutingMethod};

use super::cache::DecisionCache;
use super::keyword::{complexity_for, KeywordClassifier};

const ROUTER_MAX_TOKENS: usize = 300;

pub struct LlmRouter {
    chain: Arc<ModelChain>,
    fallback: Option<KeywordClassifier>,
    cache: DecisionCache,
}

impl LlmRouter {
    pub fn new(chain: Arc<ModelChain>, cache_capacity: usize) -> Self {
        Self {
            chain,
            fallback: Some(KeywordClassifier::new()),
            cache: DecisionCache::new(cache_capacity),
        }
    }

    /// Drop the keyword fallback; only useful for exercising the final
    /// default path.
    pub fn without_keyword_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub async fn route(&self, query: &str) -> RoutingDecision {
        if let Some(cached) = self.cache.get(query) {
            tracing::debug!(query = %query, "Routing cache hit");
            return cached;
        }

        let decision = match self.route_with_llm(query).await {
            Some(decision) => decision,
            None => self.fallback_decision(query),
        };

        tracing::info!(
            route = ?decision.route,
            intent = ?decision.intent,
            complexity = decision.complexity_score(),
            method = ?decision.method,
            "Routing decision"
        );

        self.cache.put(query, decision.clone());
        decision
    }

    async fn route_with_llm(&self, query: &str) -> Option<RoutingDecision> {
        let request = CompletionRequest::new(vec![ChatMessage::user(build_router_prompt(query))])
            .with_max_tokens(ROUTER_MAX_TOKENS)
            .with_temperature(0.1)
            .json();

        let raw = match self.chain.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "All routing models failed");
                return None;
            }
        };

        match parse_routing_response(&raw) {
            Some(decision) => Some(decision),
            None => {
                tracing::warn!(
                    output = %raw.chars().take(200).collect::<String>(),
                    "Could not parse routing judgment"
                );
                None
            }
        }
    }

    fn fallback_decision(&self, query: &str) -> RoutingDecision {
        let Some(classifier) = &self.fallback else {
            tracing::warn!("No fallback classifier available, routing to AI by default");
            return RoutingDecision::default_ai();
        };

        let (intent, confidence) = classifier.classify(query);
        let complexity = complexity_for(intent);
        let route = if complexity >= 4 { Route::Human } else { Route::Ai };

        RoutingDecision {
            intent,
            technical_complexity: complexity,
            urgency: if intent == Intent::Urgent { 5 } else { 1 },
            risk_exposure: complexity,
            route,
            confidence,
            reasoning: format!("Keyword-based classification: {}", intent.as_str()),
            method: RoutingMethod::KeywordFallback,
        }
    }
}

fn build_router_prompt(query: &str) -> String {
    format!(
        r#"You are a tax question routing system. Analyze this query and provide a structured routing decision.

Query: "{query}"

Evaluate on these dimensions (1-5 scale):
- technical_complexity: how specialized is the tax knowledge needed? (1=basic, 5=expert-level)
- urgency: does this require immediate attention? (1=no rush, 5=urgent deadline/audit)
- risk_exposure: what's the financial/legal risk of wrong advice? (1=low, 5=high penalties)

Classify the intent as ONE of: simple_tax, complex_tax, urgent, bookkeeping, general.

Examples:
- "What is the standard deduction for 2024?" -> simple_tax, complexity 1: clear factual question
- "I sold cryptocurrency and have staking rewards from multiple wallets. How do I report this?" -> complex_tax, complexity 4: multiple tax implications
- "I received an IRS audit notice yesterday" -> urgent, urgency 5: time-sensitive
- "How do I categorize meals in QuickBooks?" -> bookkeeping, complexity 2: accounting software question

Routing rules:
- Route to "human" if technical_complexity >= 4 OR urgency >= 4 OR risk_exposure >= 4
- Route to "ai" otherwise

Respond ONLY with valid JSON in this exact format:
{{
  "route_decision": "ai" or "human",
  "intent": "simple_tax",
  "technical_complexity": 1-5,
  "urgency": 1-5,
  "risk_exposure": 1-5,
  "confidence": 0.0-1.0,
  "reasoning": "brief explanation"
}}"#
    )
}

#[derive(Deserialize)]
struct RawRoutingResponse {
    route_decision: String,
    #[serde(default)]
    intent: Option<String>,
    technical_complexity: u8,
    urgency: u8,
    risk_exposure: u8,
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

/// Parse the judgment, re-deriving the route from the axes rather than
/// trusting the model's own `route_decision` when the two disagree.
fn parse_routing_response(raw: &str) -> Option<RoutingDecision> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    let parsed: RawRoutingResponse = serde_json::from_str(json_str).ok()?;

    let clamp = |axis: u8| axis.clamp(1, 5);
    let technical_complexity = clamp(parsed.technical_complexity);
    let urgency = clamp(parsed.urgency);
    let risk_exposure = clamp(parsed.risk_exposure);

    let escalate = technical_complexity >= 4 || urgency >= 4 || risk_exposure >= 4;
    let route = if escalate { Route::Human } else { Route::Ai };
    if escalate != (parsed.route_decision == "human") {
        tracing::debug!(
            model_route = %parsed.route_decision,
            "Model route disagrees with axis rule, using axis rule"
        );
    }

    let intent = match parsed.intent.as_deref() {
        Some("simple_tax") => Intent::SimpleTax,
        Some("complex_tax") => Intent::ComplexTax,
        Some("urgent") => Intent::Urgent,
        Some("bookkeeping") => Intent::Bookkeeping,
        Some("general") | None => Intent::General,
        Some(other) => {
            tracing::debug!(intent = %other, "Unknown intent label, using general");
            Intent::General
        }
    };

    Some(RoutingDecision {
        intent,
        technical_complexity,
        urgency,
        risk_exposure,
        route,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        reasoning: parsed.reasoning,
        method: RoutingMethod::Llm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionService, ProviderFailure};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn parses_valid_judgment() {
        let raw = r#"{"route_decision":"ai","intent":"simple_tax","technical_complexity":2,"urgency":1,"risk_exposure":1,"confidence":0.92,"reasoning":"basic factual question"}"#;
        let decision = parse_routing_response(raw).unwrap();
        assert_eq!(decision.route, Route::Ai);
        assert_eq!(decision.intent, Intent::SimpleTax);
        assert_eq!(decision.complexity_score(), 2);
        assert_eq!(decision.method, RoutingMethod::Llm);
    }

    #[test]
    fn single_severe_axis_forces_human_route() {
        let raw = r#"{"route_decision":"ai","intent":"urgent","technical_complexity":1,"urgency":5,"risk_exposure":1,"confidence":0.8,"reasoning":"audit deadline"}"#;
        let decision = parse_routing_response(raw).unwrap();
        assert_eq!(decision.route, Route::Human);
        assert_eq!(decision.complexity_score(), 5);
    }

    #[test]
    fn parses_fenced_judgment() {
        let raw = "```json\n{\"route_decision\":\"human\",\"intent\":\"complex_tax\",\"technical_complexity\":4,\"urgency\":2,\"risk_exposure\":3,\"confidence\":0.85,\"reasoning\":\"multi-state\"}\n```";
        let decision = parse_routing_response(raw).unwrap();
        assert_eq!(decision.route, Route::Human);
        assert_eq!(decision.complexity_score(), 4);
    }

    #[test]
    fn axes_clamp_into_scale() {
        let raw = r#"{"route_decision":"ai","intent":"general","technical_complexity":0,"urgency":9,"risk_exposure":2,"confidence":1.5,"reasoning":""}"#;
        let decision = parse_routing_response(raw).unwrap();
        assert_eq!(decision.technical_complexity, 1);
        assert_eq!(decision.urgency, 5);
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn garbage_fails_parse() {
        assert!(parse_routing_response("no JSON here").is_none());
    }

    struct FailingService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionService for FailingService {
        async fn complete(
            &self,
            _model: &str,
            _request: &CompletionRequest,
        ) -> Result<String, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderFailure::Timeout(Duration::from_secs(10)))
        }
    }

    struct CannedService(String);

    #[async_trait]
    impl CompletionService for CannedService {
        async fn complete(
            &self,
            _model: &str,
            _request: &CompletionRequest,
        ) -> Result<String, ProviderFailure> {
            Ok(self.0.clone())
        }
    }

    fn chain_of(service: impl CompletionService + 'static) -> Arc<ModelChain> {
        Arc::new(ModelChain::new(
            Arc::new(service),
            "primary",
            &["backup".to_string()],
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn exhausted_chain_falls_back_to_keywords() {
        let router = LlmRouter::new(
            chain_of(FailingService {
                calls: AtomicUsize::new(0),
            }),
            16,
        );
        let decision = router.route("I received an IRS audit notice yesterday").await;
        assert_eq!(decision.method, RoutingMethod::KeywordFallback);
        assert_eq!(decision.intent, Intent::Urgent);
        assert_eq!(decision.route, Route::Human);
        assert_eq!(decision.complexity_score(), 5);
    }

    #[tokio::test]
    async fn missing_classifier_defaults_to_ai() {
        let router = LlmRouter::new(
            chain_of(FailingService {
                calls: AtomicUsize::new(0),
            }),
            16,
        )
        .without_keyword_fallback();
        let decision = router.route("anything at all").await;
        assert_eq!(decision.method, RoutingMethod::Default);
        assert_eq!(decision.route, Route::Ai);
        assert_eq!(decision.complexity_score(), 2);
        assert_eq!(decision.confidence, 0.5);
    }

    #[tokio::test]
    async fn identical_queries_hit_the_cache() {
        let service = Arc::new(FailingService {
            calls: AtomicUsize::new(0),
        });
        let chain = Arc::new(ModelChain::new(
            service.clone(),
            "primary",
            &[],
            Duration::from_secs(5),
        ));
        let router = LlmRouter::new(chain, 16);

        router.route("What is my w-2?").await;
        let first_calls = service.calls.load(Ordering::SeqCst);
        router.route("what is MY   w-2?").await;
        assert_eq!(service.calls.load(Ordering::SeqCst), first_calls);
    }

    #[tokio::test]
    async fn llm_decision_carries_reasoning() {
        let router = LlmRouter::new(
            chain_of(CannedService(
                r#"{"route_decision":"ai","intent":"simple_tax","technical_complexity":1,"urgency":1,"risk_exposure":1,"confidence":0.95,"reasoning":"definition lookup"}"#.to_string(),
            )),
            16,
        );
        let decision = router.route("What is a W-2 form?").await;
        assert_eq!(decision.method, RoutingMethod::Llm);
        assert_eq!(decision.reasoning, "definition lookup");
    }
}
