//! Asynchronous answer-faithfulness judgment.
//!
//! An LLM compares the generated answer against the retrieved context and
//! scores groundedness in [0, 1]. Runs detached after the response has been
//! returned; the result only feeds the deferred confidence written to the
//! audit trail.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::llm::{ChatMessage, CompletionRequest, ModelChain};

const FAITHFULNESS_MAX_TOKENS: usize = 150;
const CONTEXT_DOCS: usize = 3;
const CONTEXT_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct FaithfulnessScore {
    pub faithfulness: f32,
    #[serde(default)]
    pub reasoning: String,
}

/// Score whether `answer` is grounded in `contexts`.
/// 1.0 = fully supported, 0.5 = partial/unclear, 0.0 = contradicts context.
pub async fn score_faithfulness(
    chain: Arc<ModelChain>,
    query: &str,
    answer: &str,
    contexts: &[String],
) -> Result<FaithfulnessScore> {
    let context_block = contexts
        .iter()
        .take(CONTEXT_DOCS)
        .enumerate()
        .map(|(i, doc)| {
            let snippet: String = doc.chars().take(CONTEXT_SNIPPET_CHARS).collect();
            format!("[Doc {}]: {}", i + 1, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        r#"Evaluate if this answer is grounded in the provided context.

Context:
{context_block}

Question: {query}
Answer: {answer}

Score from 0.0-1.0:
- 1.0 = answer is fully supported by context
- 0.5 = partially supported or unclear
- 0.0 = answer contradicts or ignores context

Respond with ONLY a JSON object:
{{"faithfulness": 0.0-1.0, "reasoning": "brief explanation"}}"#
    );

    let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
        .with_max_tokens(FAITHFULNESS_MAX_TOKENS)
        .with_temperature(0.1)
        .json();

    let raw = chain
        .complete(&request)
        .await
        .map_err(|e| anyhow!("faithfulness judgment failed: {}", e))?;

    let parsed = parse_score(&raw)
        .ok_or_else(|| anyhow!("unparseable faithfulness output: {}", raw.chars().take(200).collect::<String>()))?;

    tracing::info!(
        faithfulness = parsed.faithfulness,
        reasoning = %parsed.reasoning,
        "Faithfulness scored"
    );
    Ok(parsed)
}

fn parse_score(raw: &str) -> Option<FaithfulnessScore> {
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

    let mut score: FaithfulnessScore = serde_json::from_str(json_str).ok()?;
    score.faithfulness = score.faithfulness.clamp(0.0, 1.0);
    Some(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionService, ProviderFailure};
    use async_trait::async_trait;
    use std::time::Duration;

    #[test]
    fn parses_plain_score() {
        let score = parse_score(r#"{"faithfulness": 0.8, "reasoning": "well grounded"}"#).unwrap();
        assert!((score.faithfulness - 0.8).abs() < 1e-6);
    }

    #[test]
    fn clamps_out_of_range_score() {
        let score = parse_score(r#"{"faithfulness": 1.7}"#).unwrap();
        assert_eq!(score.faithfulness, 1.0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_score("not even close").is_none());
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

    #[tokio::test]
    async fn scores_through_the_chain() {
        let chain = Arc::new(ModelChain::new(
            Arc::new(CannedService(
                r#"{"faithfulness": 0.9, "reasoning": "cites context directly"}"#.to_string(),
            )),
            "judge",
            &[],
            Duration::from_secs(5),
        ));
        let score = score_faithfulness(
            chain,
            "What is a W-2?",
            "A W-2 reports annual wages [1].",
            &["A W-2 is a Wage and Tax Statement.".to_string()],
        )
        .await
        .unwrap();
        assert!((score.faithfulness - 0.9).abs() < 1e-6);
    }
}
