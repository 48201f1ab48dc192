//! Critic stage: bounded critique-and-revise loop over the leading idea.
//!
//! The critic scores the candidate against the original intent and either
//! approves it or hands back a revised idea, which replaces the candidate
//! wholesale for the next round. The loop is the pipeline's only
//! intentional multi-call retry and is hard-capped at
//! `settings.max_retries` revisions (`max_retries + 1` critic calls).
//!
//! The system favors answering over blocking: an exhausted budget, a dead
//! gateway, or an unusable reply all proceed with the best idea so far,
//! recording `approved = false` in the verdict instead of failing.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use maestro_core::{
    defaults, guard, ChatMessage, ChatSettings, CriticOutput, GenerationRequest, Idea,
    ModelGateway, Stage, Summary,
};

/// Runs the critique loop.
pub struct Critic {
    gateway: Arc<dyn ModelGateway>,
}

/// Outcome of the critique loop: the idea to carry forward plus how it fared.
#[derive(Debug, Clone)]
pub struct CriticVerdict {
    pub idea: Idea,
    pub approved: bool,
    /// Critic calls actually made.
    pub rounds: u32,
    pub quality: f32,
}

impl Critic {
    /// Create a critic over the given gateway.
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Critique the leading idea, revising up to the retry budget.
    pub async fn review(
        &self,
        idea: Idea,
        intent: &str,
        summaries: &[Summary],
        settings: &ChatSettings,
    ) -> CriticVerdict {
        let start = Instant::now();
        let max_calls = settings.max_retries + 1;
        let mut current = idea;
        let mut rounds = 0u32;
        let mut quality = 0.0f32;

        while rounds < max_calls {
            rounds += 1;
            let output = match self.critique_once(&current, intent, summaries, settings).await {
                Some(output) => output,
                None => {
                    // Gateway failure: proceed unapproved with what we have.
                    return CriticVerdict {
                        idea: current,
                        approved: false,
                        rounds,
                        quality,
                    };
                }
            };

            quality = output.quality.clamp(0.0, 1.0);
            let approved = output.approved || quality >= settings.quality_threshold;

            debug!(
                round = rounds,
                approved,
                quality,
                issue_count = output.issues.len(),
                "Critic round complete"
            );

            if approved {
                info!(
                    rounds,
                    quality,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Idea approved"
                );
                return CriticVerdict {
                    idea: current,
                    approved: true,
                    rounds,
                    quality,
                };
            }

            // Revision replaces the candidate wholesale; without one we
            // re-critique the same idea against the remaining budget.
            if let Some(revised) = output.revised_idea {
                if !revised.angle.trim().is_empty() {
                    current = revised;
                }
            }
        }

        info!(
            rounds,
            quality, "Critic budget exhausted, proceeding unapproved"
        );
        CriticVerdict {
            idea: current,
            approved: false,
            rounds,
            quality,
        }
    }

    /// One critique call. `None` on gateway failure.
    async fn critique_once(
        &self,
        idea: &Idea,
        intent: &str,
        summaries: &[Summary],
        settings: &ChatSettings,
    ) -> Option<CriticOutput> {
        let gaps: Vec<&str> = summaries
            .iter()
            .filter(|s| s.no_grounding)
            .map(|s| s.facet_name.as_str())
            .collect();
        let gaps_note = if gaps.is_empty() {
            String::new()
        } else {
            format!(
                "\nFacets with NO grounding (treat as gaps, do not invent content for them): {}",
                gaps.join(", ")
            )
        };

        let system = format!(
            "You are a quality gate reviewing a candidate answer plan. \
Judge whether it serves the user's intent and is grounded in the material. \
Respond with JSON: {{\"approved\": bool, \"quality\": 0.0-1.0, \"feedback\": \"...\", \
\"issues\": [{{\"type\": \"contradiction|gap|inaccuracy|style\", \"description\": \"...\", \
\"severity\": \"low|medium|high\"}}], \
\"revised_idea\": {{\"angle\": \"...\", \"outline\": [\"...\"], \"supporting_facets\": [\"...\"], \
\"confidence\": \"supported|extrapolated|experimental\"}} or null}}. \
Approve when quality is at least {:.2}.{gaps_note}",
            settings.quality_threshold
        );

        let summaries_block: String = summaries
            .iter()
            .map(|s| format!("## {}\n{}", s.facet_name, s.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Intent: {intent}\n\nCandidate plan:\nAngle: {}\nOutline:\n{}\n\nMaterial:\n{summaries_block}",
            idea.angle,
            idea.outline
                .iter()
                .map(|o| format!("- {o}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let request = GenerationRequest::new(
            settings.model_for(Stage::Critic),
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        )
        .json()
        .with_temperature(defaults::STRUCTURED_TEMPERATURE)
        .with_max_tokens(defaults::MAX_TOKENS);

        match self.gateway.call(request).await {
            // An unparseable critique approves by default: a broken critic
            // must not burn the revision budget or block the answer.
            Ok(response) => Some(guard::parse_or_default(
                &response.content,
                CriticOutput {
                    approved: true,
                    quality: 0.0,
                    feedback: "critic reply was not parseable".to_string(),
                    issues: Vec::new(),
                    revised_idea: None,
                },
            )),
            Err(e) => {
                warn!(error = %e, "Critic call failed");
                None
            }
        }
    }
}
