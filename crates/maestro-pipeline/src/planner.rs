//! Planner stage: intent classification and facet decomposition.
//!
//! One model call turns the raw question (plus recent turns) into an intent,
//! a question type from a closed set, and an ordered list of facets with a
//! 1:1 search strategy each. The planner is defensive about everything the
//! model can get wrong: unknown question types fall back to `technical`,
//! facet count is clamped to the settings cap, missing strategies are
//! synthesized from the facet's query hint, and a completely unusable reply
//! degrades to a single "general" facet built from the question itself.
//!
//! The planner never returns zero actionable strategies. Only a gateway
//! failure propagates, because without a plan there is nothing to retrieve.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, info};

use maestro_core::{
    defaults, guard, ChatMessage, ChatSettings, Facet, GenerationRequest, ModelGateway,
    PlannerOutput, QuestionType, Result, SearchFilters, SearchStrategy, Stage,
};

/// Decomposes a question into retrievable facets.
pub struct Planner {
    gateway: Arc<dyn ModelGateway>,
}

/// Lenient wire shape for the planner's model reply.
#[derive(Debug, Default, Deserialize)]
struct RawPlan {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    question_type: String,
    #[serde(default)]
    facets: Vec<RawFacet>,
    #[serde(default)]
    search_strategies: Vec<RawStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawFacet {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    query_hint: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    priority: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    #[serde(default)]
    facet_name: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    filters: SearchFilters,
}

impl Planner {
    /// Create a planner over the given gateway.
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Produce a plan for the question. Never returns zero strategies.
    pub async fn plan(
        &self,
        question: &str,
        settings: &ChatSettings,
        conversation_context: &[ChatMessage],
    ) -> Result<PlannerOutput> {
        let start = Instant::now();
        let max_facets = settings.effective_max_facets();

        let mut messages = vec![ChatMessage::system(system_prompt(max_facets))];
        for turn in recent_context(conversation_context) {
            messages.push(turn);
        }
        messages.push(ChatMessage::user(format!("Question: {question}")));

        let request = GenerationRequest::new(settings.model_for(Stage::Planner), messages)
            .json()
            .with_temperature(defaults::STRUCTURED_TEMPERATURE)
            .with_max_tokens(defaults::MAX_TOKENS);

        let response = self.gateway.call(request).await?;
        let raw: RawPlan = guard::parse_or_default(&response.content, RawPlan::default());
        let plan = normalize(raw, question, max_facets);

        info!(
            facet_count = plan.facets.len(),
            question_type = ?plan.question_type,
            duration_ms = start.elapsed().as_millis() as u64,
            "Plan ready"
        );
        Ok(plan)
    }
}

fn system_prompt(max_facets: usize) -> String {
    format!(
        r#"You are the planning stage of a knowledge assistant for music creators.
Decompose the user's question into at most {max_facets} independent facets, each a sub-topic
that needs its own knowledge-base search.

Respond with JSON only:
{{
  "intent": "one sentence describing what the user wants",
  "question_type": "technical|conceptual|workflow|creative|troubleshooting|comparison",
  "facets": [
    {{"name": "short facet name", "description": "what this facet covers",
      "query_hint": "search phrase", "tags": ["tag"], "priority": 1-5}}
  ],
  "search_strategies": [
    {{"facet_name": "matching facet name", "query": "concrete search query",
      "filters": {{"source_types": [], "categories": []}}}}
  ]
}}

Every facet needs exactly one search strategy. Prefer fewer, sharper facets over broad ones."#
    )
}

/// Keep the last few turns, each capped, so a long conversation cannot
/// crowd out the planning instructions.
fn recent_context(context: &[ChatMessage]) -> Vec<ChatMessage> {
    let skip = context.len().saturating_sub(defaults::CONTEXT_TURNS);
    context[skip..]
        .iter()
        .map(|m| {
            let content: String = m
                .content
                .chars()
                .take(defaults::CONTEXT_MESSAGE_CHAR_CAP)
                .collect();
            ChatMessage {
                role: m.role,
                content,
            }
        })
        .collect()
}

/// Enforce the planner's invariants on whatever the model produced.
fn normalize(raw: RawPlan, question: &str, max_facets: usize) -> PlannerOutput {
    let mut facets: Vec<Facet> = raw
        .facets
        .into_iter()
        .filter(|f| !f.name.trim().is_empty())
        .map(|f| Facet {
            name: f.name.trim().to_string(),
            description: f.description,
            query_hint: if f.query_hint.trim().is_empty() {
                question.to_string()
            } else {
                f.query_hint
            },
            tags: f.tags,
            priority: f.priority.map_or(3, |p| (p as i64).clamp(1, 5) as u8),
        })
        .collect();

    // Clamp to the cap, keeping the highest-priority facets. Stable sort so
    // equal priorities keep the model's ordering.
    facets.sort_by(|a, b| b.priority.cmp(&a.priority));
    facets.truncate(max_facets);

    if facets.is_empty() {
        debug!("Planner produced no usable facets, synthesizing general facet");
        facets.push(general_facet(question));
    }

    // 1:1 facet to strategy: match by name, synthesize from the query hint
    // when the model forgot one, drop strategies for unknown facets.
    let search_strategies = facets
        .iter()
        .map(|facet| {
            raw.search_strategies
                .iter()
                .find(|s| s.facet_name.trim() == facet.name && !s.query.trim().is_empty())
                .map(|s| SearchStrategy {
                    facet_name: facet.name.clone(),
                    query: s.query.trim().to_string(),
                    filters: s.filters.clone(),
                })
                .unwrap_or_else(|| SearchStrategy {
                    facet_name: facet.name.clone(),
                    query: facet.query_hint.clone(),
                    filters: SearchFilters::default(),
                })
        })
        .collect();

    let intent = if raw.intent.trim().is_empty() {
        question.to_string()
    } else {
        raw.intent
    };

    PlannerOutput {
        intent,
        question_type: QuestionType::parse_lenient(&raw.question_type),
        facets,
        search_strategies,
    }
}

fn general_facet(question: &str) -> Facet {
    Facet {
        name: "general".to_string(),
        description: "General coverage of the question".to_string(),
        query_hint: question.to_string(),
        tags: Vec::new(),
        priority: 3,
    }
}
