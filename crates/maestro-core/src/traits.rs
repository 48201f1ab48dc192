//! Capability traits consumed by the pipeline.
//!
//! These are the interfaces to the external collaborators the pipeline does
//! not own: text generation, embeddings, the knowledge store, live web
//! search, platform tool execution, and the user memory store. Concrete
//! implementations are injected into the orchestrator at construction, so
//! every stage is testable against deterministic doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ChatMessage, Chunk, Memory, SearchFilters, Vector, WebSnippet};

// =============================================================================
// MODEL GATEWAY
// =============================================================================

/// Requested output shape for a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Structured output where the provider supports it; otherwise the
    /// gateway instructs the model via prompt.
    Json,
}

/// One normalized generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Provider-qualified model slug (e.g., `openai:gpt-4o-mini`).
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub response_format: ResponseFormat,
}

impl GenerationRequest {
    /// Build a request with default decoding options.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            response_format: ResponseFormat::Text,
        }
    }

    /// Request structured JSON output.
    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max output tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting reported by a provider, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// Normalized generation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    /// Model that actually served the request (may differ from the slug).
    pub model: String,
    #[serde(default)]
    pub tokens_used: Option<TokenUsage>,
}

/// Uniform call into any configured text-generation model.
///
/// The sole point where provider-specific quirks are absorbed. Failures
/// propagate as typed errors; retries are a policy decision made by each
/// stage, never here.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Execute one generation request.
    async fn call(&self, request: GenerationRequest) -> Result<GenerationResponse>;
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;
}

// =============================================================================
// KNOWLEDGE STORE
// =============================================================================

/// Vector search over the platform knowledge sources.
///
/// Implemented by the surrounding application over its document store;
/// the pipeline only ever sees ranked [`Chunk`]s.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Similarity search filtered by source types/categories, up to `k` hits.
    async fn vector_search(
        &self,
        vector: &Vector,
        filters: &SearchFilters,
        k: usize,
    ) -> Result<Vec<Chunk>>;
}

// =============================================================================
// WEB SEARCH
// =============================================================================

/// Live web search capability used by web research and fact verification.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web, returning ranked snippets.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSnippet>>;
}

// =============================================================================
// TOOL RUNTIME
// =============================================================================

/// Platform-side execution of a validated tool call.
///
/// The pipeline validates parameters against the declared schema before
/// calling this; the runtime performs the actual mutation/query.
#[async_trait]
pub trait ToolRuntime: Send + Sync {
    /// Execute a tool with already-validated parameters.
    async fn execute(&self, tool: &str, parameters: &JsonValue) -> Result<JsonValue>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Persistence for long-term user memories.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Load all memories for a user.
    async fn load(&self, user_id: &str) -> Result<Vec<Memory>>;

    /// Insert a new memory for a user.
    async fn insert(&self, user_id: &str, memory: Memory) -> Result<()>;

    /// Replace an existing memory (matched by id).
    async fn update(&self, user_id: &str, memory: Memory) -> Result<()>;

    /// Bump access bookkeeping for the given memory ids.
    async fn touch(&self, user_id: &str, ids: &[Uuid]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_generation_request_builder() {
        let req = GenerationRequest::new("openai:gpt-4o-mini", vec![ChatMessage::user("hi")])
            .json()
            .with_temperature(0.2)
            .with_max_tokens(500);

        assert_eq!(req.model, "openai:gpt-4o-mini");
        assert_eq!(req.response_format, ResponseFormat::Json);
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_tokens, Some(500));
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn test_response_format_default_is_text() {
        let req = GenerationRequest::new("m", vec![]);
        assert_eq!(req.response_format, ResponseFormat::Text);
    }

    #[test]
    fn test_generation_response_round_trip() {
        let resp = GenerationResponse {
            content: "hello".into(),
            model: "gpt-4o-mini".into(),
            tokens_used: Some(TokenUsage {
                input: 10,
                output: 5,
                total: 15,
            }),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: GenerationResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.content, "hello");
        assert_eq!(parsed.tokens_used.unwrap().total, 15);
    }

    #[test]
    fn test_traits_are_object_safe() {
        fn _gateway(_: &dyn ModelGateway) {}
        fn _embed(_: &dyn EmbeddingBackend) {}
        fn _store(_: &dyn KnowledgeStore) {}
        fn _web(_: &dyn WebSearch) {}
        fn _tools(_: &dyn ToolRuntime) {}
        fn _memory(_: &dyn MemoryStore) {}
    }
}
