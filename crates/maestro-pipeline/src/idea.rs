//! Idea generator stage: candidate answer angles from the facet summaries.
//!
//! Proposes one or more answer skeletons, each tagged with the facets it
//! draws from. Creative mode raises the sampling temperature; facet
//! attribution is filtered so an idea can only claim facets that actually
//! exist in the summarizer output. A dead gateway or an unusable reply
//! degrades to a single direct-answer idea synthesized from the intent —
//! downstream stages always have a leading candidate to work with.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{info, warn};

use maestro_core::{
    defaults, guard, ChatMessage, ChatSettings, GenerationRequest, Idea, IdeaConfidence,
    ModelGateway, Stage, Summary,
};

/// Generates candidate answer ideas.
pub struct IdeaGenerator {
    gateway: Arc<dyn ModelGateway>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIdeas {
    #[serde(default)]
    ideas: Vec<Idea>,
}

impl IdeaGenerator {
    /// Create an idea generator over the given gateway.
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Propose candidate ideas. Always returns at least one.
    pub async fn generate(
        &self,
        summaries: &[Summary],
        intent: &str,
        settings: &ChatSettings,
    ) -> Vec<Idea> {
        let start = Instant::now();

        let summaries_block: String = summaries
            .iter()
            .map(|s| {
                let points = if s.key_points.is_empty() {
                    String::new()
                } else {
                    format!(" Key points: {}", s.key_points.join("; "))
                };
                format!("## {}\n{}{}", s.facet_name, s.text, points)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let system = "You propose candidate answer structures for a knowledge assistant. \
Respond with JSON: {\"ideas\": [{\"angle\": \"the approach\", \"outline\": [\"section\"], \
\"supporting_facets\": [\"facet name\"], \"confidence\": \"supported|extrapolated|experimental\"}]}. \
Propose 1-3 distinct angles. supporting_facets must quote facet names from the material.";

        let prompt = format!("Intent: {intent}\n\nFacet material:\n{summaries_block}");

        let temperature = if settings.enable_creative_mode {
            defaults::CREATIVE_TEMPERATURE
        } else {
            defaults::TEMPERATURE
        };

        let request = GenerationRequest::new(
            settings.model_for(Stage::IdeaGenerator),
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        )
        .json()
        .with_temperature(temperature)
        .with_max_tokens(defaults::MAX_TOKENS);

        let mut ideas = match self.gateway.call(request).await {
            Ok(response) => {
                guard::parse_or_default(&response.content, RawIdeas::default()).ideas
            }
            Err(e) => {
                warn!(error = %e, "Idea generation failed, synthesizing direct idea");
                Vec::new()
            }
        };

        // Attribution filter: ideas may only claim facets that exist.
        let facet_names: Vec<&str> = summaries.iter().map(|s| s.facet_name.as_str()).collect();
        for idea in &mut ideas {
            idea.supporting_facets
                .retain(|f| facet_names.contains(&f.as_str()));
        }
        ideas.retain(|i| !i.angle.trim().is_empty());

        if ideas.is_empty() {
            ideas.push(direct_idea(intent, &facet_names));
        }

        info!(
            result_count = ideas.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Ideas generated"
        );
        ideas
    }
}

/// Fallback candidate: answer the intent directly using every facet.
fn direct_idea(intent: &str, facet_names: &[&str]) -> Idea {
    Idea {
        angle: format!("Directly address: {intent}"),
        outline: vec![
            "Answer the question head-on".to_string(),
            "Support with the retrieved material".to_string(),
        ],
        supporting_facets: facet_names.iter().map(|s| s.to_string()).collect(),
        confidence: IdeaConfidence::Supported,
    }
}
