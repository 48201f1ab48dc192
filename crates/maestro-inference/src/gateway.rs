//! OpenAI-compatible chat-completions gateway.
//!
//! Works against any OpenAI-compatible endpoint: OpenAI cloud, OpenRouter,
//! Azure OpenAI, vLLM, LM Studio. This is the single place where
//! provider-specific request quirks are absorbed; callers see only the
//! normalized [`GenerationRequest`]/[`GenerationResponse`] contract.
//!
//! No retries live here. A failed call is a typed [`Error::Inference`] and
//! the calling stage decides its own fallback policy.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use maestro_core::{
    ChatMessage, Error, GenerationRequest, GenerationResponse, ModelGateway, ResponseFormat,
    Result, TokenUsage,
};

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default OpenRouter API endpoint.
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

/// Default timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = maestro_core::defaults::GATEWAY_TIMEOUT_SECS;

/// Configuration for an OpenAI-compatible gateway.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// HTTP-Referer header for OpenRouter rankings (optional).
    pub http_referer: Option<String>,
    /// X-Title header for app name on OpenRouter (optional).
    pub x_title: Option<String>,
    /// Whether the endpoint honors `response_format: json_object`.
    /// When false, JSON requests fall back to a prompt instruction.
    pub supports_json_mode: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            http_referer: None,
            x_title: None,
            supports_json_mode: true,
        }
    }
}

/// OpenAI-compatible gateway backend.
pub struct OpenAiGateway {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiGateway {
    /// Create a new gateway with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            json_mode = config.supports_json_mode,
            "Initializing OpenAI-compatible gateway"
        );

        Ok(Self { client, config })
    }

    /// Create from `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = OpenAiConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            http_referer: None,
            x_title: None,
            supports_json_mode: true,
        };
        Self::new(config)
    }

    /// Create an OpenRouter gateway from `OPENROUTER_*` environment variables.
    pub fn openrouter_from_env() -> Result<Self> {
        let config = OpenAiConfig {
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENROUTER_URL.to_string()),
            api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            timeout_seconds: std::env::var("OPENROUTER_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            http_referer: std::env::var("OPENROUTER_HTTP_REFERER").ok(),
            x_title: std::env::var("OPENROUTER_X_TITLE").ok(),
            supports_json_mode: true,
        };
        Self::new(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Build a POST request with authentication and optional ranking headers.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        if let Some(ref referer) = self.config.http_referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.config.x_title {
            req = req.header("X-Title", title);
        }

        req.header("Content-Type", "application/json")
    }
}

/// Reasoning-tier models reject sampling parameters; sending `temperature`
/// to them is a hard 400 on OpenAI and silently ignored elsewhere.
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3") || model.contains("deepseek-r1")
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn call(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let start = Instant::now();
        let mut messages = request.messages;

        let wants_json = request.response_format == ResponseFormat::Json;
        let native_json = wants_json && self.config.supports_json_mode;
        if wants_json && !native_json {
            messages.push(ChatMessage::system(
                "Respond with a single valid JSON object and nothing else.",
            ));
        }

        let reasoning = is_reasoning_model(&request.model);
        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: if reasoning { None } else { request.temperature },
            max_tokens: request.max_tokens,
            response_format: native_json.then(|| JsonFormat {
                format_type: "json_object".to_string(),
            }),
            stream: false,
        };

        debug!(
            model = %request.model,
            json_mode = native_json,
            "Dispatching chat completion"
        );

        let response = self
            .build_request("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Provider returned {}: {}",
                status, detail
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            model = %result.model,
            response_len = content.len(),
            duration_ms = elapsed,
            "Chat completion finished"
        );
        if elapsed > 30_000 {
            warn!(
                model = %result.model,
                duration_ms = elapsed,
                slow = true,
                "Slow generation call"
            );
        }

        Ok(GenerationResponse {
            content,
            model: result.model,
            tokens_used: result.usage.map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
                total: u.total_tokens,
            }),
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonFormat>,
    stream: bool,
}

#[derive(Serialize)]
struct JsonFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}
