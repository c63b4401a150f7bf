//! Grounded answer generation.
//!
//! Builds the generation prompt from conversation history and the expanded
//! document set, keeps the total context inside a character budget, and
//! normalizes whatever citation style the model produced down to bare `[n]`
//! markers.

use std::sync::LazyLock;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use regex::Regex;

use crate::llm::{ChatMessage, CompletionRequest, ModelChain};
use crate::types::{DocumentChunk, MessageRole, StoredMessage};

/// Returned when retrieval produced no evidence at all.
pub const NO_EVIDENCE_RESPONSE: &str = "I don't have enough information in my knowledge base to answer this question confidently. Let me connect you with an expert who can provide personalized guidance.";

/// Returned when every completion model failed.
pub const GENERATION_FAILED_RESPONSE: &str = "I'm having trouble providing a complete answer right now. Let me connect you with an expert who can help.";

const CONTEXTUALIZE_MAX_TOKENS: usize = 200;
const ANSWER_MAX_TOKENS: usize = 1000;
/// Below this many remaining characters another source is not worth adding.
const MIN_USEFUL_CHUNK: usize = 200;

static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("citation regex is valid"));
static REFERENCES_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\n\s*references?:.*$").expect("references regex is valid"));
static VERBOSE_SOURCE_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Source\s+(\d+):\s+[^\]]+\]").expect("source citation regex is valid")
});
static TITLED_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+):\s+[^\]]+\]").expect("titled citation regex is valid"));
static CITATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[(\d+)\]\s+[^\[\n]+$").expect("citation line regex is valid")
});
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("newline regex is valid"));

const SYSTEM_PROMPT: &str = r#"You are a knowledgeable tax assistant providing accurate, focused answers.

Retrieved sources are ranked by relevance (Source 1 = most relevant).

ANSWER RULES:
1. Be direct and complete: include dollar amounts, thresholds, form numbers, deadlines
2. Prioritize Source 1: use information from top-ranked sources first
3. Cite sources: use [1], [2] after facts
4. Match answer length to question complexity:
   - Simple factual questions (W-2 definition, deadlines): 2-4 sentences
   - Procedural questions (how to deduct): 2-3 paragraphs with bullet lists
   - Complex scenarios: comprehensive breakdown
5. Only ask follow-ups when NECESSARY: don't ask filing status for universal rules"#;

const CONTEXTUALIZE_SYSTEM_PROMPT: &str = "Given a chat history and the latest user question which might reference context in the chat history, formulate a standalone question which can be understood without the chat history. Do NOT answer the question, just reformulate it if needed and otherwise return it as is.";

/// Result of one generation call.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub has_citations: bool,
    /// Self-reported confidence proxy; the wire format gives us none, so a
    /// fixed prior is used.
    pub self_confidence: f32,
}

pub struct AnswerGenerator {
    chain: Arc<ModelChain>,
}

impl AnswerGenerator {
    pub fn new(chain: Arc<ModelChain>) -> Self {
        Self { chain }
    }

    /// Rewrite a follow-up question into a standalone one using the
    /// conversation history. Falls back to the original query on any failure.
    pub async fn contextualize(&self, query: &str, history: &str) -> String {
        if history == "No prior conversation" {
            return query.to_string();
        }

        let user_msg = format!(
            "Chat History:\n{}\n\nUser Question: {}\n\nStandalone Question:",
            history, query
        );
        let request = CompletionRequest::new(vec![
            ChatMessage::system(CONTEXTUALIZE_SYSTEM_PROMPT),
            ChatMessage::user(user_msg),
        ])
        .with_max_tokens(CONTEXTUALIZE_MAX_TOKENS)
        .with_temperature(0.1);

        match self.chain.complete(&request).await {
            Ok(standalone) => {
                let standalone = standalone.trim().to_string();
                if standalone.is_empty() {
                    query.to_string()
                } else {
                    tracing::debug!(original = %query, standalone = %standalone, "Contextualized query");
                    standalone
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Query contextualization failed, using original");
                query.to_string()
            }
        }
    }

    /// Generate a cited answer from the retrieved documents.
    pub async fn generate(
        &self,
        query: &str,
        history: &str,
        documents: &[DocumentChunk],
        max_context_chars: usize,
    ) -> Result<GeneratedAnswer> {
        let context = build_context(documents, max_context_chars);

        let system = format!(
            "{}\n\nPrevious conversation:\n{}\n\nRetrieved Context (ordered by relevance):\n{}",
            SYSTEM_PROMPT, history, context
        );
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(query.to_string()),
        ])
        .with_max_tokens(ANSWER_MAX_TOKENS)
        .with_temperature(0.4);

        let raw = self
            .chain
            .complete(&request)
            .await
            .map_err(|e| anyhow!("answer generation exhausted all models: {}", e))?;

        let text = clean_citations(&raw);
        let has_citations = CITATION_MARKER.is_match(&text);

        Ok(GeneratedAnswer {
            text,
            has_citations,
            self_confidence: 0.7,
        })
    }
}

/// Render stored history as "User:"/"Assistant:" lines, excluding the
/// in-flight message (the most recent user turn).
pub fn render_history(messages: &[StoredMessage]) -> String {
    if messages.is_empty() {
        return "No prior conversation".to_string();
    }

    let end = messages.len().saturating_sub(1);
    let lines: Vec<String> = messages[..end]
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::User => "User",
                _ => "Assistant",
            };
            format!("{}: {}", role, m.content)
        })
        .collect();

    if lines.is_empty() {
        "No prior conversation".to_string()
    } else {
        lines.join("\n")
    }
}

/// Assemble the context block under a total character budget. Sources are
/// added best-first with rank and relevance headers; assembly stops when the
/// remaining budget can no longer hold a useful amount of content.
pub fn build_context(documents: &[DocumentChunk], max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    for (i, doc) in documents.iter().enumerate() {
        let header = format!(
            "[Source {} - Relevance: {:.2}]\nTitle: {}\n",
            i + 1,
            doc.relevance(),
            doc.title
        );

        // The joiner between sources counts against the budget too.
        let separator = if parts.is_empty() { 0 } else { 2 };
        let available = max_chars.saturating_sub(total + separator + header.len());
        if available < MIN_USEFUL_CHUNK {
            break;
        }

        let content: String = doc.content.chars().take(available).collect();
        total += separator + header.len() + content.len();
        parts.push(format!("{}{}", header, content));

        if total >= max_chars {
            break;
        }
    }

    parts.join("\n\n")
}

/// Normalize citations to bare `[n]` markers and strip reference sections.
pub fn clean_citations(answer: &str) -> String {
    let cleaned = REFERENCES_SECTION.replace(answer, "");
    let cleaned = VERBOSE_SOURCE_CITATION.replace_all(&cleaned, "[$1]");
    let cleaned = TITLED_CITATION.replace_all(&cleaned, "[$1]");
    let cleaned = CITATION_LINE.replace_all(&cleaned, "[$1]");
    let cleaned = EXCESS_NEWLINES.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionService, ProviderFailure};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    fn doc(title: &str, content: &str, relevance: f32) -> DocumentChunk {
        let mut c = DocumentChunk::new(title, content);
        c.title = title.to_string();
        c.vector_similarity = Some(relevance);
        c
    }

    #[test]
    fn context_stays_inside_budget_and_keeps_top_source() {
        let documents = vec![
            doc("A", &"x".repeat(5000), 0.9),
            doc("B", &"y".repeat(5000), 0.8),
            doc("C", &"z".repeat(5000), 0.7),
        ];
        let context = build_context(&documents, 8000);
        assert!(context.len() <= 8000);
        assert!(context.contains("[Source 1 - Relevance: 0.90]"));
        assert!(context.contains("Title: A"));
    }

    #[test]
    fn tiny_budget_still_fits_nothing_extra() {
        let documents = vec![doc("A", &"x".repeat(5000), 0.9)];
        let context = build_context(&documents, 100);
        assert!(context.is_empty());
    }

    #[test]
    fn cleans_verbose_source_citations() {
        let cleaned = clean_citations("The limit is $7,000 [Source 2: IRS Pub 590-A].");
        assert_eq!(cleaned, "The limit is $7,000 [2].");
    }

    #[test]
    fn cleans_titled_citations() {
        let cleaned = clean_citations("See the form instructions [3: Form 1040 Instructions].");
        assert_eq!(cleaned, "See the form instructions [3].");
    }

    #[test]
    fn strips_trailing_references_section() {
        let answer = "You must file by April 15 [1].\n\nReferences:\n[1] IRS Filing Deadlines - irs.gov";
        let cleaned = clean_citations(answer);
        assert_eq!(cleaned, "You must file by April 15 [1].");
    }

    #[test]
    fn collapses_newline_runs() {
        let cleaned = clean_citations("First fact [1].\n\n\n\nSecond fact [2].");
        assert_eq!(cleaned, "First fact [1].\n\nSecond fact [2].");
    }

    #[test]
    fn history_excludes_in_flight_message() {
        let msg = |role, content: &str| StoredMessage {
            conversation_id: "c1".to_string(),
            role,
            content: content.to_string(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        };
        let history = render_history(&[
            msg(MessageRole::User, "What is a W-2?"),
            msg(MessageRole::Assistant, "A wage statement."),
            msg(MessageRole::User, "When do I get it?"),
        ]);
        assert_eq!(history, "User: What is a W-2?\nAssistant: A wage statement.");
    }

    #[test]
    fn empty_history_renders_placeholder() {
        assert_eq!(render_history(&[]), "No prior conversation");
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

    struct BrokenService;

    #[async_trait]
    impl CompletionService for BrokenService {
        async fn complete(
            &self,
            _model: &str,
            _request: &CompletionRequest,
        ) -> Result<String, ProviderFailure> {
            Err(ProviderFailure::Http {
                status: 500,
                message: "down".to_string(),
            })
        }
    }

    fn generator_with(service: impl CompletionService + 'static) -> AnswerGenerator {
        AnswerGenerator::new(Arc::new(ModelChain::new(
            Arc::new(service),
            "gen",
            &[],
            Duration::from_secs(5),
        )))
    }

    #[tokio::test]
    async fn detects_citations_in_generated_answer() {
        let generator =
            generator_with(CannedService("The deadline is April 15 [1].".to_string()));
        let answer = generator
            .generate(
                "When is the deadline?",
                "No prior conversation",
                &[doc("Deadlines", "April 15.", 0.8)],
                8000,
            )
            .await
            .unwrap();
        assert!(answer.has_citations);
        assert_eq!(answer.text, "The deadline is April 15 [1].");
    }

    #[tokio::test]
    async fn generation_failure_propagates_for_caller_fallback() {
        let generator = generator_with(BrokenService);
        let result = generator
            .generate("q", "No prior conversation", &[doc("T", "c", 0.5)], 8000)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn contextualize_skips_when_no_history() {
        let generator = generator_with(BrokenService);
        let standalone = generator
            .contextualize("What about Roth?", "No prior conversation")
            .await;
        assert_eq!(standalone, "What about Roth?");
    }

    #[tokio::test]
    async fn contextualize_failure_returns_original() {
        let generator = generator_with(BrokenService);
        let standalone = generator
            .contextualize("What about that?", "User: IRA limits?")
            .await;
        assert_eq!(standalone, "What about that?");
    }
}
