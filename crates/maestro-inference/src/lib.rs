//! # maestro-inference
//!
//! Model gateway for the maestro pipeline.
//!
//! This crate provides:
//! - An OpenAI-compatible chat-completions backend (OpenAI, OpenRouter,
//!   and any compatible endpoint)
//! - A provider registry routing provider-qualified model slugs
//! - Deterministic mock backends for tests (feature `mock`)
//!
//! The gateway is the sole place where provider quirks (JSON mode support,
//! reasoning-model parameter restrictions, ranking headers) are absorbed.
//! It performs no retries; stages own their fallback policies.

pub mod embeddings;
pub mod gateway;
pub mod router;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use maestro_core::*;

pub use embeddings::{EmbeddingConfig, OpenAiEmbeddings};
pub use gateway::{OpenAiConfig, OpenAiGateway, DEFAULT_OPENAI_URL, DEFAULT_OPENROUTER_URL};
pub use router::{GatewayRouter, ParsedSlug};
