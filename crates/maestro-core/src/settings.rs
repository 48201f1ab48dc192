//! Per-request pipeline configuration: presets, stage model resolution,
//! feature toggles, and numeric knobs.
//!
//! A [`ChatSettings`] is created per request and never mutated mid-pipeline.
//! Model selection is two-level: a named [`PresetId`] maps every stage to a
//! model slug, and `custom_models` overrides individual stages. Slugs are
//! provider-qualified (`openai:gpt-4o-mini`, `openrouter:deepseek/deepseek-chat`)
//! and resolved by the gateway router.

use serde::{Deserialize, Serialize};

use crate::defaults;

// =============================================================================
// STAGES
// =============================================================================

/// A model-calling stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planner,
    Summarizer,
    IdeaGenerator,
    Critic,
    FactVerifier,
    ToolPlanner,
    FinalWriter,
    MemoryExtractor,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planner => write!(f, "planner"),
            Self::Summarizer => write!(f, "summarizer"),
            Self::IdeaGenerator => write!(f, "idea_generator"),
            Self::Critic => write!(f, "critic"),
            Self::FactVerifier => write!(f, "fact_verifier"),
            Self::ToolPlanner => write!(f, "tool_planner"),
            Self::FinalWriter => write!(f, "final_writer"),
            Self::MemoryExtractor => write!(f, "memory_extractor"),
        }
    }
}

// =============================================================================
// PRESETS
// =============================================================================

/// Named quality/cost/latency tradeoff mapping each stage to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresetId {
    Budget,
    Speed,
    #[default]
    Balanced,
    DeepReasoning,
    Premium,
}

/// Concrete per-stage model mapping for a preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub planner: &'static str,
    pub summarizer: &'static str,
    pub idea_generator: &'static str,
    pub critic: &'static str,
    pub final_writer: &'static str,
}

impl PresetId {
    /// Resolve this preset to its per-stage model mapping.
    pub fn models(&self) -> ModelPreset {
        match self {
            Self::Budget => ModelPreset {
                name: "Budget",
                description: "DeepSeek + Gemini Flash Lite, cheapest viable pipeline",
                planner: "openrouter:deepseek/deepseek-chat",
                summarizer: "openrouter:google/gemini-2.5-flash-lite",
                idea_generator: "openrouter:deepseek/deepseek-chat",
                critic: "openrouter:google/gemini-2.5-flash-lite",
                final_writer: "openrouter:deepseek/deepseek-chat",
            },
            Self::Speed => ModelPreset {
                name: "Speed",
                description: "Gemini Flash everywhere, Haiku for the final answer",
                planner: "openrouter:google/gemini-2.5-flash",
                summarizer: "openrouter:google/gemini-2.5-flash",
                idea_generator: "openrouter:google/gemini-2.5-flash",
                critic: "openrouter:google/gemini-2.5-flash",
                final_writer: "openrouter:anthropic/claude-3.5-haiku",
            },
            Self::Balanced => ModelPreset {
                name: "Balanced",
                description: "Flash for plumbing, Sonnet for the final answer",
                planner: "openrouter:google/gemini-2.5-flash",
                summarizer: "openrouter:google/gemini-2.5-flash",
                idea_generator: "openai:gpt-4o",
                critic: "openrouter:google/gemini-2.5-flash",
                final_writer: "openrouter:anthropic/claude-sonnet-4.5",
            },
            Self::DeepReasoning => ModelPreset {
                name: "Deep Reasoning",
                description: "Reasoning models for planning, critique, and ideas",
                planner: "openrouter:google/gemini-3-pro-preview",
                summarizer: "openrouter:google/gemini-2.5-flash",
                idea_generator: "openrouter:deepseek/deepseek-r1",
                critic: "openrouter:google/gemini-3-pro-preview",
                final_writer: "openrouter:anthropic/claude-sonnet-4.5",
            },
            Self::Premium => ModelPreset {
                name: "Premium",
                description: "Top-shelf models at every stage",
                planner: "openrouter:google/gemini-3-pro-preview",
                summarizer: "openrouter:anthropic/claude-sonnet-4.5",
                idea_generator: "openai:gpt-5-mini",
                critic: "openrouter:google/gemini-3-pro-preview",
                final_writer: "openrouter:anthropic/claude-opus-4.5",
            },
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// How the final answer should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    /// Sectioned reference with bullets and numbered steps.
    #[default]
    Structured,
    /// Flowing essay-style paragraphs.
    Conversational,
    /// Brief and direct.
    Concise,
}

/// Per-stage model slug overrides on top of the preset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOverrides {
    #[serde(default)]
    pub planner: Option<String>,
    #[serde(default)]
    pub summarizer: Option<String>,
    #[serde(default)]
    pub idea_generator: Option<String>,
    #[serde(default)]
    pub critic: Option<String>,
    #[serde(default)]
    pub fact_verifier: Option<String>,
    #[serde(default)]
    pub tool_planner: Option<String>,
    #[serde(default)]
    pub final_writer: Option<String>,
    #[serde(default)]
    pub memory_extractor: Option<String>,
}

/// Immutable per-request pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    // Model selection
    #[serde(default)]
    pub preset: PresetId,
    #[serde(default)]
    pub custom_models: StageOverrides,

    // Pipeline knobs
    #[serde(default = "default_max_facets")]
    pub max_facets: usize,
    #[serde(default = "default_chunks_per_facet")]
    pub chunks_per_facet: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    // Feature toggles
    #[serde(default = "default_true")]
    pub enable_critic: bool,
    #[serde(default = "default_true")]
    pub enable_creative_mode: bool,
    #[serde(default)]
    pub enable_web_research: bool,
    #[serde(default)]
    pub enable_fact_verification: bool,
    #[serde(default)]
    pub enable_agent_mode: bool,

    // Web research
    #[serde(default = "default_web_search_max_results")]
    pub web_search_max_results: usize,

    // Response shaping
    #[serde(default)]
    pub response_style: ResponseStyle,
    /// Restrict retrieval to these source types when non-empty.
    #[serde(default)]
    pub source_types: Vec<String>,
}

fn default_max_facets() -> usize {
    defaults::MAX_FACETS
}
fn default_chunks_per_facet() -> usize {
    defaults::CHUNKS_PER_FACET
}
fn default_similarity_threshold() -> f32 {
    defaults::SIMILARITY_THRESHOLD
}
fn default_max_retries() -> u32 {
    defaults::CRITIC_MAX_RETRIES
}
fn default_quality_threshold() -> f32 {
    defaults::QUALITY_THRESHOLD
}
fn default_stage_timeout_secs() -> u64 {
    defaults::STAGE_TIMEOUT_SECS
}
fn default_web_search_max_results() -> usize {
    defaults::WEB_SEARCH_MAX_RESULTS
}
fn default_true() -> bool {
    true
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            preset: PresetId::Balanced,
            custom_models: StageOverrides::default(),
            max_facets: defaults::MAX_FACETS,
            chunks_per_facet: defaults::CHUNKS_PER_FACET,
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            max_retries: defaults::CRITIC_MAX_RETRIES,
            quality_threshold: defaults::QUALITY_THRESHOLD,
            stage_timeout_secs: defaults::STAGE_TIMEOUT_SECS,
            enable_critic: true,
            enable_creative_mode: true,
            enable_web_research: false,
            enable_fact_verification: false,
            enable_agent_mode: false,
            web_search_max_results: defaults::WEB_SEARCH_MAX_RESULTS,
            response_style: ResponseStyle::Structured,
            source_types: Vec::new(),
        }
    }
}

impl ChatSettings {
    /// Resolve the model slug for a stage: explicit override, then preset.
    ///
    /// Stages without a dedicated preset entry borrow a neighbor with a
    /// similar cost profile (verification and memory extraction run on the
    /// summarizer model, tool planning on the planner model).
    pub fn model_for(&self, stage: Stage) -> String {
        let preset = self.preset.models();
        let override_slug = match stage {
            Stage::Planner => &self.custom_models.planner,
            Stage::Summarizer => &self.custom_models.summarizer,
            Stage::IdeaGenerator => &self.custom_models.idea_generator,
            Stage::Critic => &self.custom_models.critic,
            Stage::FactVerifier => &self.custom_models.fact_verifier,
            Stage::ToolPlanner => &self.custom_models.tool_planner,
            Stage::FinalWriter => &self.custom_models.final_writer,
            Stage::MemoryExtractor => &self.custom_models.memory_extractor,
        };
        if let Some(slug) = override_slug {
            return slug.clone();
        }
        match stage {
            Stage::Planner => preset.planner,
            Stage::Summarizer => preset.summarizer,
            Stage::IdeaGenerator => preset.idea_generator,
            Stage::Critic => preset.critic,
            Stage::FactVerifier => preset.summarizer,
            Stage::ToolPlanner => preset.planner,
            Stage::FinalWriter => preset.final_writer,
            Stage::MemoryExtractor => preset.summarizer,
        }
        .to_string()
    }

    /// Effective facet cap: the per-request knob clamped to the hard cap.
    pub fn effective_max_facets(&self) -> usize {
        self.max_facets.clamp(1, defaults::FACET_HARD_CAP)
    }

    /// Per-stage timeout as a `Duration`.
    pub fn stage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stage_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ChatSettings::default();
        assert_eq!(settings.preset, PresetId::Balanced);
        assert_eq!(settings.max_facets, 3);
        assert_eq!(settings.chunks_per_facet, 20);
        assert!((settings.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert!(settings.enable_critic);
        assert!(settings.enable_creative_mode);
        assert!(!settings.enable_web_research);
        assert!(!settings.enable_fact_verification);
        assert!(!settings.enable_agent_mode);
    }

    #[test]
    fn test_preset_resolution_balanced() {
        let settings = ChatSettings::default();
        assert_eq!(
            settings.model_for(Stage::FinalWriter),
            "openrouter:anthropic/claude-sonnet-4.5"
        );
        assert_eq!(
            settings.model_for(Stage::Planner),
            "openrouter:google/gemini-2.5-flash"
        );
    }

    #[test]
    fn test_override_beats_preset() {
        let settings = ChatSettings {
            custom_models: StageOverrides {
                final_writer: Some("openai:gpt-4o".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(settings.model_for(Stage::FinalWriter), "openai:gpt-4o");
        // Other stages still resolve from the preset
        assert_eq!(
            settings.model_for(Stage::Summarizer),
            "openrouter:google/gemini-2.5-flash"
        );
    }

    #[test]
    fn test_borrowed_stage_models() {
        let settings = ChatSettings::default();
        // Verification and memory extraction run on the summarizer model
        assert_eq!(
            settings.model_for(Stage::FactVerifier),
            settings.model_for(Stage::Summarizer)
        );
        assert_eq!(
            settings.model_for(Stage::MemoryExtractor),
            settings.model_for(Stage::Summarizer)
        );
        // Tool planning runs on the planner model
        assert_eq!(
            settings.model_for(Stage::ToolPlanner),
            settings.model_for(Stage::Planner)
        );
    }

    #[test]
    fn test_effective_max_facets_clamps() {
        let mut settings = ChatSettings {
            max_facets: 0,
            ..Default::default()
        };
        assert_eq!(settings.effective_max_facets(), 1);

        settings.max_facets = 99;
        assert_eq!(settings.effective_max_facets(), 5);

        settings.max_facets = 4;
        assert_eq!(settings.effective_max_facets(), 4);
    }

    #[test]
    fn test_every_preset_has_nonempty_models() {
        for preset in [
            PresetId::Budget,
            PresetId::Speed,
            PresetId::Balanced,
            PresetId::DeepReasoning,
            PresetId::Premium,
        ] {
            let models = preset.models();
            assert!(!models.planner.is_empty());
            assert!(!models.summarizer.is_empty());
            assert!(!models.idea_generator.is_empty());
            assert!(!models.critic.is_empty());
            assert!(!models.final_writer.is_empty());
        }
    }

    #[test]
    fn test_settings_deserialize_sparse_json() {
        let settings: ChatSettings = serde_json::from_str(r#"{"preset": "speed"}"#).unwrap();
        assert_eq!(settings.preset, PresetId::Speed);
        assert_eq!(settings.max_facets, 3);
        assert!(settings.enable_critic);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::IdeaGenerator.to_string(), "idea_generator");
        assert_eq!(Stage::FinalWriter.to_string(), "final_writer");
    }
}
