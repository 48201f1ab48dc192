//! OpenAI-compatible embedding backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use maestro_core::{EmbeddingBackend, Error, Result, Vector};

/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension for text-embedding-3-small.
pub const DEFAULT_EMBED_DIMENSION: usize = 1536;

/// Configuration for the embedding backend.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: crate::gateway::DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            model: DEFAULT_EMBED_MODEL.to_string(),
            dimension: DEFAULT_EMBED_DIMENSION,
            timeout_seconds: 120,
        }
    }
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbeddings {
    client: Client,
    config: EmbeddingConfig,
}

impl OpenAiEmbeddings {
    /// Create a backend with the given configuration.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            model = %config.model,
            "Initializing embedding backend"
        );
        Ok(Self { client, config })
    }

    /// Create from `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = EmbeddingConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| crate::gateway::DEFAULT_OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("OPENAI_EMBED_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string()),
            dimension: std::env::var("OPENAI_EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_EMBED_DIMENSION),
            timeout_seconds: 120,
        };
        Self::new(config)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddings {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(input_count = texts.len(), model = %self.config.model, "Embedding texts");

        let url = format!(
            "{}/embeddings",
            self.config.base_url.trim_end_matches('/')
        );
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.to_vec(),
            encoding_format: "float",
        });
        if let Some(ref api_key) = self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Provider returned {}: {}",
                status, detail
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        // Sort by index so vectors line up with inputs.
        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
