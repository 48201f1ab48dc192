//! Summarizer stage: per-facet compression with provenance.
//!
//! Each facet's chunks are compressed by one model call into a bounded
//! summary that points back at the chunks it used. Facets run concurrently;
//! they are independent by construction. Two rules keep provenance honest:
//!
//! - a facet with no chunks produces a placeholder summary without any
//!   model call, flagged `no_grounding` so later stages treat it as a gap;
//! - every cited chunk id is filtered against the facet's actual retrieved
//!   set, so an id the model invents never survives this stage.
//!
//! A failed model call degrades that facet to an excerpt-based summary;
//! summarization never fails the request.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use maestro_core::{
    defaults, guard, ChatMessage, ChatSettings, FacetBucket, GenerationRequest, ModelGateway,
    RetrieverOutput, Stage, Summary,
};

/// Compresses retrieved chunks into per-facet summaries.
pub struct Summarizer {
    gateway: Arc<dyn ModelGateway>,
}

/// Lenient wire shape for a summary reply.
#[derive(Debug, Default, Deserialize)]
struct RawSummary {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    cited_chunk_ids: Vec<String>,
    #[serde(default)]
    confidence: f32,
}

impl Summarizer {
    /// Create a summarizer over the given gateway.
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Summarize every facet bucket, concurrently. Infallible by design.
    pub async fn summarize(
        &self,
        retrieved: &RetrieverOutput,
        question: &str,
        settings: &ChatSettings,
    ) -> Vec<Summary> {
        let start = Instant::now();

        let tasks = retrieved.buckets.iter().map(|bucket| async move {
            if bucket.chunks.is_empty() {
                debug!(facet = %bucket.facet_name, "No chunks, skipping model call");
                return Summary::no_grounding(&bucket.facet_name);
            }
            self.summarize_facet(bucket, question, settings).await
        });

        let summaries = join_all(tasks).await;
        info!(
            result_count = summaries.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Summarization complete"
        );
        summaries
    }

    /// One model call for one facet, degraded to an excerpt on failure.
    async fn summarize_facet(
        &self,
        bucket: &FacetBucket,
        question: &str,
        settings: &ChatSettings,
    ) -> Summary {
        let chunks_block: String = bucket
            .chunks
            .iter()
            .map(|c| {
                let excerpt: String = c.content.chars().take(defaults::CHUNK_CHAR_BUDGET).collect();
                format!("[{}] {} — {}", c.id, c.title, excerpt)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = "You compress knowledge-base material for one facet of a question. \
Respond with JSON: {\"summary\": \"...\", \"key_points\": [\"...\"], \
\"cited_chunk_ids\": [\"...\"], \"confidence\": 0.0-1.0}. \
Only cite chunk ids that appear in the material. Stay under 300 words.";

        let prompt = format!(
            "Question: {question}\nFacet: {}\n\nMaterial:\n{chunks_block}",
            bucket.facet_name
        );

        let request = GenerationRequest::new(
            settings.model_for(Stage::Summarizer),
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        )
        .json()
        .with_temperature(defaults::STRUCTURED_TEMPERATURE)
        .with_max_tokens(defaults::MAX_TOKENS);

        let raw = match self.gateway.call(request).await {
            Ok(response) => guard::parse_or_default(&response.content, RawSummary::default()),
            Err(e) => {
                warn!(
                    facet = %bucket.facet_name,
                    error = %e,
                    "Summarizer call failed, using excerpt fallback"
                );
                return excerpt_fallback(bucket);
            }
        };

        if raw.summary.trim().is_empty() {
            return excerpt_fallback(bucket);
        }

        // Provenance filter: ids must exist in this facet's retrieved set.
        let cited_chunk_ids: Vec<String> = raw
            .cited_chunk_ids
            .into_iter()
            .filter(|id| bucket.chunks.iter().any(|c| &c.id == id))
            .collect();

        Summary {
            facet_name: bucket.facet_name.clone(),
            text: raw.summary,
            key_points: raw.key_points,
            cited_chunk_ids,
            confidence: raw.confidence.clamp(0.0, 1.0),
            no_grounding: false,
        }
    }
}

/// Degraded summary assembled directly from the top chunks.
fn excerpt_fallback(bucket: &FacetBucket) -> Summary {
    let top: Vec<&maestro_core::Chunk> = bucket.chunks.iter().take(3).collect();
    let text = top
        .iter()
        .map(|c| {
            let excerpt: String = c.content.chars().take(300).collect();
            excerpt
        })
        .collect::<Vec<_>>()
        .join("\n");

    Summary {
        facet_name: bucket.facet_name.clone(),
        text,
        key_points: Vec::new(),
        cited_chunk_ids: top.iter().map(|c| c.id.clone()).collect(),
        confidence: 0.3,
        no_grounding: false,
    }
}
