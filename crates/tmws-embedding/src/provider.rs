use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tmws_core::{Result, TmwsError};

/// Trait for computing text embeddings.
///
/// The gateway is the only component allowed to hold an implementation;
/// everything else goes through [`crate::EmbeddingGateway`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// The dimensionality of the output embeddings.
    fn dimensions(&self) -> usize;

    /// Provider name, for logs.
    fn name(&self) -> &str;
}

/// OpenAI-compatible embeddings provider. Works with any service exposing
/// a `/embeddings` endpoint (OpenAI, Ollama, vLLM, LM Studio, ...).
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dims: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: model.into(),
            dims,
        }
    }

    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(model = %self.model, count = texts.len(), "generating embeddings");

        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut req = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TmwsError::Embedder(format!("embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(TmwsError::Embedder(format!("embedding HTTP {status}")));
        }

        let data: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| TmwsError::Embedder(format!("embedding parse error: {e}")))?;

        Ok(data.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
