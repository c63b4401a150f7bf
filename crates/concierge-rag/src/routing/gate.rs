//! Disambiguation gate.
//!
//! Judges whether a query is too underspecified to answer before any
//! retrieval cost is paid. Strictly fail-open: a gate outage must never block
//! the pipeline, so every failure collapses to "not ambiguous" at confidence
//! 0.5. The orchestrator short-circuits only on
//! `is_ambiguous && confidence > 0.7`.

use std::sync::Arc;

use crate::llm::{ChatMessage, CompletionRequest, ModelChain};
use crate::types::AmbiguityVerdict;

const GATE_MAX_TOKENS: usize = 200;

pub struct DisambiguationGate {
    chain: Arc<ModelChain>,
}

impl DisambiguationGate {
    pub fn new(chain: Arc<ModelChain>) -> Self {
        Self { chain }
    }

    pub async fn check(&self, query: &str) -> AmbiguityVerdict {
        let request = CompletionRequest::new(vec![ChatMessage::user(build_gate_prompt(query))])
            .with_max_tokens(GATE_MAX_TOKENS)
            .with_temperature(0.1)
            .json();

        let raw = match self.chain.complete(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Ambiguity check failed, failing open");
                return AmbiguityVerdict::fail_open();
            }
        };

        match parse_verdict(&raw) {
            Some(verdict) => {
                if verdict.is_ambiguous {
                    tracing::info!(
                        confidence = verdict.confidence,
                        missing = ?verdict.missing_info,
                        "Query judged ambiguous"
                    );
                }
                verdict
            }
            None => {
                tracing::warn!(
                    output = %raw.chars().take(200).collect::<String>(),
                    "Could not parse ambiguity verdict, failing open"
                );
                AmbiguityVerdict::fail_open()
            }
        }
    }
}

fn build_gate_prompt(query: &str) -> String {
    format!(
        r#"You are a tax expert assistant. Analyze this query for missing critical details.

Query: "{query}"

Tax questions often require specific context:
- Filing status: Single, Married Filing Jointly, Married Filing Separately, Head of Household
- State: tax rules vary by state
- Income type: W2 employee, self-employed, 1099 contractor
- Tax year
- Amounts: specific dollar figures for calculations

Guidelines:
- If the query is SPECIFIC enough (e.g. "What's the 2024 standard deduction for single filers?"), mark it NOT ambiguous
- If the query is TOO VAGUE (e.g. "Can I deduct my car?"), mark it ambiguous and ask ONE helpful clarifying question
- Make the clarification conversational and include common options in parentheses
- Don't be pedantic: only flag genuinely ambiguous queries

Respond in JSON format:
{{
  "is_ambiguous": true/false,
  "missing_info": ["filing_status"],
  "clarification_question": "What is your filing status? (Single, Married Filing Jointly, Head of Household, etc.)",
  "confidence": 0.0-1.0
}}"#
    )
}

/// Strict parse after stripping markdown fences and trailing text.
fn parse_verdict(raw: &str) -> Option<AmbiguityVerdict> {
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

    serde_json::from_str::<AmbiguityVerdict>(json_str).ok()
}
