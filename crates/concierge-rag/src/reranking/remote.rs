//! HTTP rerank client.
//!
//! Speaks the rerank wire format used by hosted cross-encoder services:
//! POST { model, query, documents, top_n } and read back
//! { results: [{ index, relevance_score }] } ordered by relevance.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::services::RerankService;

pub struct RemoteRerankClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl RemoteRerankClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl RerankService for RemoteRerankClient {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f32)>> {
        let body = json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Rerank request to {} failed: {}", self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            let preview: String = error.chars().take(200).collect();
            return Err(anyhow!("Rerank API error ({}): {}", status, preview));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse rerank response: {}", e))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| (r.index, r.relevance_score))
            .collect())
    }
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}
