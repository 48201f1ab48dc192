//! Deterministic mock backends for testing the pipeline without a network.
//!
//! [`MockGateway`] returns scripted responses selected by substring match
//! against the request's message contents, logging every call for
//! assertions. [`MockEmbeddingBackend`] produces character-hash embeddings,
//! so the same text always maps to the same vector.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use maestro_inference::mock::MockGateway;
//!
//! let gateway = MockGateway::new()
//!     .with_response("decompose", r#"{"intent": "learn EQ", "facets": []}"#)
//!     .with_default_response("Mock answer.");
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use maestro_core::{
    Error, GenerationRequest, GenerationResponse, ModelGateway, Result, Vector,
};

// =============================================================================
// MOCK GATEWAY
// =============================================================================

#[derive(Debug, Clone, Default)]
struct MockGatewayConfig {
    /// (marker, response) pairs checked in insertion order.
    responses: Vec<(String, String)>,
    default_response: String,
    /// Markers that trigger a simulated provider failure.
    fail_when: Vec<String>,
    fail_all: bool,
}

/// Scripted, deterministic [`ModelGateway`] for tests.
#[derive(Clone, Default)]
pub struct MockGateway {
    config: Arc<MockGatewayConfig>,
    calls: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockGateway {
    /// Create a mock gateway with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `response` when any message contains `marker`.
    /// Earlier mappings win over later ones.
    pub fn with_response(mut self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .push((marker.into(), response.into()));
        self
    }

    /// Response used when no marker matches.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Fail with a simulated provider error when any message contains `marker`.
    pub fn with_failure_when(mut self, marker: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .fail_when
            .push(marker.into());
        self
    }

    /// Fail every call (total provider outage).
    pub fn with_fail_all(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_all = true;
        self
    }

    /// All logged requests, in call order.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Total number of gateway calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of calls whose messages contain the given marker.
    pub fn call_count_matching(&self, marker: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|req| req.messages.iter().any(|m| m.content.contains(marker)))
            .count()
    }
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn call(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        self.calls.lock().unwrap().push(request.clone());

        if self.config.fail_all {
            return Err(Error::Inference("simulated provider outage".to_string()));
        }

        let haystack: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        for marker in &self.config.fail_when {
            if haystack.contains(marker.as_str()) {
                return Err(Error::Inference(format!(
                    "simulated failure for marker '{}'",
                    marker
                )));
            }
        }

        let content = self
            .config
            .responses
            .iter()
            .find(|(marker, _)| haystack.contains(marker.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.config.default_response.clone());

        Ok(GenerationResponse {
            content,
            model: request.model,
            tokens_used: None,
        })
    }
}

// =============================================================================
// MOCK EMBEDDINGS
// =============================================================================

/// Deterministic embedding backend: character-hash vectors, unit-normalized.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    fail_all: Arc<Mutex<bool>>,
}

impl MockEmbeddingBackend {
    /// Create a mock backend with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_all: Arc::new(Mutex::new(false)),
        }
    }

    /// Make every subsequent embed call fail.
    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.lock().unwrap() = fail;
    }

    /// Generate a deterministic embedding from text.
    ///
    /// The same text always produces the same unit vector.
    pub fn generate(text: &str, dimension: usize) -> Vector {
        let mut vec = vec![0.0f32; dimension];
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        normalize(&mut vec);
        vec
    }
}

fn normalize(vec: &mut [f32]) {
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
}

/// Cosine similarity between two vectors of equal dimension.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

#[async_trait]
impl maestro_core::EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if *self.fail_all.lock().unwrap() {
            return Err(Error::Embedding("simulated embedding outage".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| Self::generate(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::{ChatMessage, EmbeddingBackend};

    #[tokio::test]
    async fn test_mock_gateway_marker_routing() {
        let gateway = MockGateway::new()
            .with_response("plan", "planned")
            .with_response("summarize", "summarized")
            .with_default_response("fallback");

        let resp = gateway
            .call(GenerationRequest::new(
                "m",
                vec![ChatMessage::user("please plan this")],
            ))
            .await
            .unwrap();
        assert_eq!(resp.content, "planned");

        let resp = gateway
            .call(GenerationRequest::new(
                "m",
                vec![ChatMessage::user("something else")],
            ))
            .await
            .unwrap();
        assert_eq!(resp.content, "fallback");
    }

    #[tokio::test]
    async fn test_mock_gateway_first_marker_wins() {
        let gateway = MockGateway::new()
            .with_response("alpha", "first")
            .with_response("alpha beta", "second");

        let resp = gateway
            .call(GenerationRequest::new(
                "m",
                vec![ChatMessage::user("alpha beta")],
            ))
            .await
            .unwrap();
        assert_eq!(resp.content, "first");
    }

    #[tokio::test]
    async fn test_mock_gateway_call_log() {
        let gateway = MockGateway::new().with_default_response("ok");
        gateway
            .call(GenerationRequest::new("a", vec![ChatMessage::user("one")]))
            .await
            .unwrap();
        gateway
            .call(GenerationRequest::new("b", vec![ChatMessage::user("two")]))
            .await
            .unwrap();

        assert_eq!(gateway.call_count(), 2);
        assert_eq!(gateway.call_count_matching("one"), 1);
        assert_eq!(gateway.calls()[1].model, "b");
    }

    #[tokio::test]
    async fn test_mock_gateway_failure_injection() {
        let gateway = MockGateway::new()
            .with_failure_when("boom")
            .with_default_response("ok");

        let result = gateway
            .call(GenerationRequest::new(
                "m",
                vec![ChatMessage::user("boom goes the prompt")],
            ))
            .await;
        assert!(result.is_err());

        // Failed calls are still logged
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_gateway_fail_all() {
        let gateway = MockGateway::new().with_fail_all();
        let result = gateway
            .call(GenerationRequest::new("m", vec![ChatMessage::user("hi")]))
            .await;
        assert!(matches!(result, Err(Error::Inference(_))));
    }

    #[tokio::test]
    async fn test_mock_embeddings_deterministic() {
        let backend = MockEmbeddingBackend::new(128);
        let a = backend
            .embed_texts(&["sidechain compression".to_string()])
            .await
            .unwrap();
        let b = backend
            .embed_texts(&["sidechain compression".to_string()])
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 128);
    }

    #[tokio::test]
    async fn test_mock_embeddings_normalized() {
        let backend = MockEmbeddingBackend::new(64);
        let vecs = backend.embed_texts(&["test".to_string()]).await.unwrap();
        let magnitude: f32 = vecs[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_embeddings_failure() {
        let backend = MockEmbeddingBackend::new(64);
        backend.set_fail_all(true);
        assert!(backend.embed_texts(&["x".to_string()]).await.is_err());
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.01);
        assert!(cosine_similarity(&a, &c).abs() < 0.01);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }

    #[test]
    fn test_similar_texts_score_higher_than_unrelated() {
        let base = MockEmbeddingBackend::generate("parallel compression on drums", 256);
        let close = MockEmbeddingBackend::generate("parallel compression on drum bus", 256);
        let far = MockEmbeddingBackend::generate("zebra", 256);

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }
}
