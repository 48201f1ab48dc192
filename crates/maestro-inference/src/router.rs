//! Provider registry with provider-qualified model slug routing.
//!
//! Stage settings reference models by slug, optionally qualified with a
//! provider prefix:
//!
//! ```text
//! "gpt-4o-mini"                         → default provider (OpenAI)
//! "openai:gpt-4o"                       → explicit OpenAI
//! "openrouter:anthropic/claude-sonnet-4.5" → OpenRouter
//! ```
//!
//! The router implements [`ModelGateway`] itself: it parses the slug,
//! rewrites the request with the bare model id, and delegates to the
//! registered backend. Unknown prefixes are treated as part of the model
//! slug and routed to the default provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use maestro_core::{Error, GenerationRequest, GenerationResponse, ModelGateway, Result};

use crate::gateway::{OpenAiConfig, OpenAiGateway, DEFAULT_OPENROUTER_URL};

/// Result of parsing a provider-qualified model slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSlug {
    pub provider_id: String,
    pub model: String,
}

/// Registry of configured gateway backends, routed by slug prefix.
pub struct GatewayRouter {
    providers: HashMap<String, Arc<OpenAiGateway>>,
    default_provider: String,
}

impl GatewayRouter {
    /// Create an empty router with the given default provider id.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider backend under an id.
    pub fn register(&mut self, id: impl Into<String>, gateway: OpenAiGateway) {
        let id = id.into();
        info!(provider = %id, "Registering gateway provider");
        self.providers.insert(id, Arc::new(gateway));
    }

    /// Get the default provider id.
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Parse a provider-qualified model slug.
    ///
    /// Matches against registered provider ids first; anything else is a
    /// bare model slug for the default provider. A prefix with an empty
    /// model part is not a match.
    pub fn parse_slug(&self, slug: &str) -> ParsedSlug {
        for provider_id in self.providers.keys() {
            let prefix = format!("{}:", provider_id);
            if let Some(model) = slug.strip_prefix(&prefix) {
                if !model.is_empty() {
                    return ParsedSlug {
                        provider_id: provider_id.clone(),
                        model: model.to_string(),
                    };
                }
            }
        }
        ParsedSlug {
            provider_id: self.default_provider.clone(),
            model: slug.to_string(),
        }
    }

    /// Build a router from environment variables.
    ///
    /// Always registers the OpenAI provider (default). Registers OpenRouter
    /// when `OPENROUTER_API_KEY` is configured.
    pub fn from_env() -> Result<Self> {
        let mut router = Self::new("openai");
        router.register("openai", OpenAiGateway::from_env()?);

        if std::env::var("OPENROUTER_API_KEY").is_ok_and(|k| !k.is_empty()) {
            router.register("openrouter", OpenAiGateway::openrouter_from_env()?);
        }

        info!(
            providers = ?router.providers.keys().collect::<Vec<_>>(),
            default = %router.default_provider,
            "Gateway router initialized from environment"
        );
        Ok(router)
    }

    /// Build a router with explicit OpenAI and OpenRouter keys (no env).
    pub fn with_keys(openai_key: Option<String>, openrouter_key: Option<String>) -> Result<Self> {
        let mut router = Self::new("openai");
        router.register(
            "openai",
            OpenAiGateway::new(OpenAiConfig {
                api_key: openai_key,
                ..OpenAiConfig::default()
            })?,
        );
        if let Some(key) = openrouter_key {
            router.register(
                "openrouter",
                OpenAiGateway::new(OpenAiConfig {
                    base_url: DEFAULT_OPENROUTER_URL.to_string(),
                    api_key: Some(key),
                    ..OpenAiConfig::default()
                })?,
            );
        }
        Ok(router)
    }
}

#[async_trait]
impl ModelGateway for GatewayRouter {
    async fn call(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let parsed = self.parse_slug(&request.model);
        let gateway = self.providers.get(&parsed.provider_id).ok_or_else(|| {
            Error::Config(format!("Unknown provider: {}", parsed.provider_id))
        })?;

        debug!(
            provider = %parsed.provider_id,
            model = %parsed.model,
            "Routing generation request"
        );

        let routed = GenerationRequest {
            model: parsed.model,
            ..request
        };
        gateway.call(routed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_router() -> GatewayRouter {
        let mut router = GatewayRouter::new("openai");
        router.register(
            "openai",
            OpenAiGateway::new(OpenAiConfig::default()).unwrap(),
        );
        router.register(
            "openrouter",
            OpenAiGateway::new(OpenAiConfig {
                base_url: DEFAULT_OPENROUTER_URL.to_string(),
                api_key: Some("sk-or-test".to_string()),
                ..OpenAiConfig::default()
            })
            .unwrap(),
        );
        router
    }

    #[test]
    fn test_parse_bare_slug_uses_default() {
        let router = test_router();
        let parsed = router.parse_slug("gpt-4o-mini");
        assert_eq!(parsed.provider_id, "openai");
        assert_eq!(parsed.model, "gpt-4o-mini");
    }

    #[test]
    fn test_parse_explicit_openai_slug() {
        let router = test_router();
        let parsed = router.parse_slug("openai:gpt-4o");
        assert_eq!(parsed.provider_id, "openai");
        assert_eq!(parsed.model, "gpt-4o");
    }

    #[test]
    fn test_parse_openrouter_slug_with_slash() {
        let router = test_router();
        let parsed = router.parse_slug("openrouter:anthropic/claude-sonnet-4.5");
        assert_eq!(parsed.provider_id, "openrouter");
        assert_eq!(parsed.model, "anthropic/claude-sonnet-4.5");
    }

    #[test]
    fn test_parse_unknown_prefix_as_default_model() {
        let router = test_router();
        // "azure" is not registered, so the whole string is the model slug
        let parsed = router.parse_slug("azure:gpt-4");
        assert_eq!(parsed.provider_id, "openai");
        assert_eq!(parsed.model, "azure:gpt-4");
    }

    #[test]
    fn test_parse_empty_model_after_prefix_uses_default() {
        let router = test_router();
        let parsed = router.parse_slug("openai:");
        assert_eq!(parsed.provider_id, "openai");
        assert_eq!(parsed.model, "openai:");
    }

    #[test]
    fn test_has_provider() {
        let router = test_router();
        assert!(router.has_provider("openai"));
        assert!(router.has_provider("openrouter"));
        assert!(!router.has_provider("azure"));
    }

    #[tokio::test]
    async fn test_call_unknown_provider_errors() {
        // A router whose default points at an unregistered provider
        let router = GatewayRouter::new("missing");
        let result = router
            .call(GenerationRequest::new("some-model", vec![]))
            .await;
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("missing")),
            other => panic!("Expected Config error, got {:?}", other.map(|r| r.content)),
        }
    }
}
