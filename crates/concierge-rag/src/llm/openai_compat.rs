//! OpenAI-compatible chat-completions client over reqwest.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ChatRole, CompletionRequest, CompletionService, ProviderFailure};

/// HTTP client for any chat-completions endpoint speaking the OpenAI wire
/// format (Groq, OpenRouter, Together, local gateways).
pub struct OpenAiCompatClient {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ProviderFailure> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ProviderFailure::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Parse a response body as JSON, classifying HTML bodies separately:
    /// CDNs and proxies sometimes return an error page with a 200 status.
    fn parse_json_body<T: serde::de::DeserializeOwned>(
        body: &str,
        status: u16,
    ) -> Result<T, ProviderFailure> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(ProviderFailure::Malformed(format!(
                "HTML instead of JSON (HTTP {}): {}",
                status, preview
            )));
        }
        serde_json::from_str::<T>(body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            ProviderFailure::Malformed(format!("{}: {}", e, preview))
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, ProviderFailure> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false
        });
        if request.json_response {
            body["response_format"] = json!({ "type": "json_object" });
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %model,
            max_tokens = request.max_tokens,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderFailure::Timeout(std::time::Duration::from_secs(15))
                } else {
                    ProviderFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderFailure::Transport(e.to_string()))?;

        if status.as_u16() == 429 {
            let preview: String = text.chars().take(200).collect();
            return Err(ProviderFailure::RateLimited(preview));
        }
        if !status.is_success() {
            let preview: String = text.chars().take(300).collect();
            return Err(ProviderFailure::Http {
                status: status.as_u16(),
                message: preview,
            });
        }

        let parsed: CompletionsResponse = Self::parse_json_body(&text, status.as_u16())?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderFailure::Malformed("no choices in response".to_string()))?;

        Ok(choice.message.content)
    }
}

#[derive(Deserialize)]
struct CompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_classifies_as_malformed() {
        let result: Result<CompletionsResponse, _> =
            OpenAiCompatClient::parse_json_body("<!DOCTYPE html><html>gateway error</html>", 200);
        assert!(matches!(result, Err(ProviderFailure::Malformed(_))));
    }

    #[test]
    fn valid_body_parses() {
        let body = r#"{"choices":[{"message":{"content":"hello"}}]}"#;
        let parsed: CompletionsResponse = OpenAiCompatClient::parse_json_body(body, 200).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }

    #[test]
    fn truncated_json_classifies_as_malformed() {
        let result: Result<CompletionsResponse, _> =
            OpenAiCompatClient::parse_json_body(r#"{"choices":[{"mess"#, 200);
        assert!(matches!(result, Err(ProviderFailure::Malformed(_))));
    }
}
