//! One-shot pipeline demo.
//!
//! Wires the orchestrator against env-configured OpenAI/OpenRouter
//! backends and a small seeded in-memory corpus, then answers a single
//! question from the command line:
//!
//! ```text
//! OPENAI_API_KEY=sk-… maestro-ask "how do I EQ a vocal?"
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use maestro_core::{Chunk, EmbeddingBackend};
use maestro_inference::{GatewayRouter, OpenAiEmbeddings};
use maestro_pipeline::{Orchestrator, PipelineRequest};
use maestro_retrieval::InMemoryKnowledgeStore;

const SEED_DOCS: &[(&str, &str, &str)] = &[
    (
        "lesson-eq-basics",
        "EQ Fundamentals",
        "Start vocals with a high-pass filter between 70 and 120 Hz to remove rumble. \
Cut muddiness around 200-400 Hz with a narrow bell before boosting anything. \
Presence lives around 3-5 kHz; air above 10 kHz with a gentle shelf.",
    ),
    (
        "lesson-compression",
        "Compression Basics",
        "For vocal compression, start with a 3:1 ratio, medium attack of 10-30 ms, \
and release timed to the phrase. Aim for 3-6 dB of gain reduction on peaks.",
    ),
    (
        "note-vocal-chain",
        "Vocal Chain Order",
        "A common vocal chain: subtractive EQ, compressor, additive EQ, de-esser, \
then time-based effects on sends rather than inserts.",
    ),
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let question = std::env::args()
        .nth(1)
        .context("usage: maestro-ask \"<question>\"")?;

    let gateway = Arc::new(GatewayRouter::from_env()?);
    let embeddings: Arc<dyn EmbeddingBackend> = Arc::new(OpenAiEmbeddings::from_env()?);

    let store = Arc::new(InMemoryKnowledgeStore::new());
    let texts: Vec<String> = SEED_DOCS.iter().map(|(_, _, text)| text.to_string()).collect();
    let vectors = embeddings.embed_texts(&texts).await?;
    for ((id, title, content), vector) in SEED_DOCS.iter().zip(vectors) {
        store
            .add(
                Chunk {
                    id: id.to_string(),
                    source_id: id.to_string(),
                    source_type: "lesson".to_string(),
                    title: title.to_string(),
                    content: content.to_string(),
                    category: None,
                    score: 0.0,
                },
                vector,
            )
            .await;
    }

    let orchestrator = Orchestrator::new(gateway, embeddings, store);
    let response = orchestrator.ask(PipelineRequest::new(question)).await;

    println!("{}\n", response.content);
    if !response.citations.is_empty() {
        println!("Sources:");
        for citation in &response.citations {
            println!(
                "  [{}] {} ({})",
                citation.id, citation.title, citation.source_type
            );
        }
    }
    println!(
        "\n{} chunks · {} ms · writer: {}",
        response.pipeline_metadata.total_chunks_processed,
        response.pipeline_metadata.processing_time_ms,
        response.pipeline_metadata.models_used.final_writer,
    );
    Ok(())
}
