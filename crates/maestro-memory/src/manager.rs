//! Long-term memory bracketing the pipeline.
//!
//! Before a request runs, the manager loads the most relevant memories for
//! the user — ranked by importance, recency, and overlap with the question
//! — and formats them into a compact prompt block. After the response is
//! written, a model call proposes new memories; each proposal merges into
//! an existing memory of the same type when semantically close enough,
//! instead of accumulating duplicate facts.
//!
//! Both halves degrade: a failed load yields an empty context block and a
//! failed persist is logged and dropped. Memory never fails a request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use maestro_core::{
    defaults, guard, ChatMessage, ChatSettings, EmbeddingBackend, Memory, MemoryStore, MemoryType,
    ModelGateway, Stage,
};

/// Tuning knobs for memory ranking and merging.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Memories loaded into the prompt block.
    pub load_limit: usize,
    /// Cosine similarity above which an extracted memory merges into an
    /// existing one of the same type.
    pub merge_threshold: f32,
    /// Half-life in days for the recency ranking component.
    pub recency_half_life_days: f64,
    /// Character cap for the formatted prompt block.
    pub block_char_cap: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            load_limit: defaults::MEMORY_LOAD_LIMIT,
            merge_threshold: defaults::MEMORY_MERGE_THRESHOLD,
            recency_half_life_days: defaults::MEMORY_RECENCY_HALF_LIFE_DAYS,
            block_char_cap: defaults::MEMORY_BLOCK_CHAR_CAP,
        }
    }
}

/// Loads, ranks, formats, extracts, and merges user memories.
pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    gateway: Arc<dyn ModelGateway>,
    embeddings: Arc<dyn EmbeddingBackend>,
    config: MemoryConfig,
}

/// A memory proposed by the extraction model.
#[derive(Debug, Clone, Deserialize)]
struct ProposedMemory {
    #[serde(rename = "type")]
    memory_type: MemoryType,
    content: String,
    #[serde(default = "default_importance")]
    importance: f32,
}

fn default_importance() -> f32 {
    0.5
}

impl MemoryManager {
    /// Create a manager over the given capability implementations.
    pub fn new(
        store: Arc<dyn MemoryStore>,
        gateway: Arc<dyn ModelGateway>,
        embeddings: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            store,
            gateway,
            embeddings,
            config: MemoryConfig::default(),
        }
    }

    /// Override the default tuning knobs.
    pub fn with_config(mut self, config: MemoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the most relevant memories for a question.
    ///
    /// Ranked by importance, recency decay, and question-term overlap.
    /// Expired memories are dropped. Store failure degrades to an empty
    /// list; memory is never a reason to fail the request.
    pub async fn load_relevant(&self, user_id: &str, question: &str) -> Vec<Memory> {
        let all = match self.store.load(user_id).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!(user_id, error = %e, "Memory load failed, continuing without context");
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut scored: Vec<(f64, Memory)> = all
            .into_iter()
            .filter(|m| !m.is_expired(now))
            .map(|m| (self.relevance(&m, question, now), m))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let selected: Vec<Memory> = scored
            .into_iter()
            .take(self.config.load_limit)
            .map(|(_, m)| m)
            .collect();

        // Access bookkeeping is best-effort; a failed bump is not a failed read.
        let ids: Vec<_> = selected.iter().map(|m| m.id).collect();
        if !ids.is_empty() {
            if let Err(e) = self.store.touch(user_id, &ids).await {
                warn!(user_id, error = %e, "Memory access bump failed");
            }
        }

        debug!(user_id, result_count = selected.len(), "Memories loaded");
        selected
    }

    /// Relevance score: importance, recency decay, and term overlap.
    fn relevance(&self, memory: &Memory, question: &str, now: chrono::DateTime<Utc>) -> f64 {
        let age_days = (now - memory.last_accessed_at).num_seconds().max(0) as f64 / 86_400.0;
        let recency = 0.5f64.powf(age_days / self.config.recency_half_life_days);

        let question_lower = question.to_lowercase();
        let terms: Vec<&str> = question_lower
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .collect();
        let content_lower = memory.content.to_lowercase();
        let overlap = if terms.is_empty() {
            0.0
        } else {
            terms.iter().filter(|t| content_lower.contains(**t)).count() as f64
                / terms.len() as f64
        };

        memory.importance as f64 * 0.5 + recency * 0.3 + overlap * 0.2
    }

    /// Format memories into a compact prompt block, grouped by type.
    ///
    /// Returns an empty string when there is nothing to say.
    pub fn format_block(&self, memories: &[Memory]) -> String {
        if memories.is_empty() {
            return String::new();
        }

        let mut by_type: BTreeMap<String, Vec<&Memory>> = BTreeMap::new();
        for memory in memories {
            by_type
                .entry(memory.memory_type.to_string())
                .or_default()
                .push(memory);
        }

        let mut block = String::from("What you know about this user:\n");
        for (type_name, group) in by_type {
            block.push_str(&format!("{}:\n", type_name));
            for memory in group {
                block.push_str(&format!("- {}\n", memory.content));
            }
        }

        if block.len() > self.config.block_char_cap {
            let mut truncated: String = block.chars().take(self.config.block_char_cap).collect();
            truncated.push_str("…");
            return truncated;
        }
        block
    }

    /// Extract new memories from a finished conversation and persist them.
    ///
    /// Proposals semantically close to an existing memory of the same type
    /// merge into it (content refreshed, importance keeps the max) instead
    /// of inserting a duplicate. Every failure path degrades to a log line.
    pub async fn extract_and_persist(
        &self,
        user_id: &str,
        settings: &ChatSettings,
        conversation: &[ChatMessage],
        answer: &str,
    ) {
        let proposals = self.propose_memories(settings, conversation, answer).await;
        if proposals.is_empty() {
            debug!(user_id, "No memories proposed");
            return;
        }

        let existing = match self.store.load(user_id).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!(user_id, error = %e, "Memory load for merge failed, skipping persist");
                return;
            }
        };

        let mut inserted = 0usize;
        let mut merged = 0usize;
        for proposal in proposals {
            match self.merge_target(&proposal, &existing).await {
                Some(mut target) => {
                    target.content = proposal.content;
                    target.importance = target.importance.max(proposal.importance.clamp(0.0, 1.0));
                    target.last_accessed_at = Utc::now();
                    if let Err(e) = self.store.update(user_id, target).await {
                        warn!(user_id, error = %e, "Memory merge write failed");
                    } else {
                        merged += 1;
                    }
                }
                None => {
                    let memory = Memory::new(
                        proposal.memory_type,
                        proposal.content,
                        proposal.importance,
                    );
                    if let Err(e) = self.store.insert(user_id, memory).await {
                        warn!(user_id, error = %e, "Memory insert failed");
                    } else {
                        inserted += 1;
                    }
                }
            }
        }

        info!(user_id, inserted, merged, "Memories persisted");
    }

    /// One model call proposing memories from the conversation.
    async fn propose_memories(
        &self,
        settings: &ChatSettings,
        conversation: &[ChatMessage],
        answer: &str,
    ) -> Vec<ProposedMemory> {
        let transcript: String = conversation
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let system = "You maintain long-term memory about a user of a creator platform. \
From the conversation, extract at most 5 durable facts worth remembering across sessions. \
Respond with JSON: {\"memories\": [{\"type\": \"preference|fact|skill_level|context|correction\", \
\"content\": \"...\", \"importance\": 0.0-1.0}]}. \
Only include things that will still matter next week. Respond with {\"memories\": []} when nothing qualifies.";

        let prompt = format!("Conversation:\n{}\n\nAssistant answer:\n{}", transcript, answer);

        #[derive(Default, Deserialize)]
        struct Extraction {
            #[serde(default)]
            memories: Vec<ProposedMemory>,
        }

        let request = maestro_core::GenerationRequest::new(
            settings.model_for(Stage::MemoryExtractor),
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        )
        .json()
        .with_temperature(defaults::STRUCTURED_TEMPERATURE);

        match self.gateway.call(request).await {
            Ok(response) => {
                let extraction: Extraction =
                    guard::parse_or_default(&response.content, Extraction::default());
                extraction
                    .memories
                    .into_iter()
                    .filter(|p| !p.content.trim().is_empty())
                    .take(5)
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "Memory extraction call failed");
                Vec::new()
            }
        }
    }

    /// Find an existing same-type memory semantically close to the proposal.
    ///
    /// Embedding outage degrades to no merge (plain insert).
    async fn merge_target(
        &self,
        proposal: &ProposedMemory,
        existing: &[Memory],
    ) -> Option<Memory> {
        let candidates: Vec<&Memory> = existing
            .iter()
            .filter(|m| m.memory_type == proposal.memory_type)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut texts = vec![proposal.content.clone()];
        texts.extend(candidates.iter().map(|m| m.content.clone()));
        let vectors = match self.embeddings.embed_texts(&texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Embedding failed during memory merge, inserting instead");
                return None;
            }
        };

        let (proposal_vec, candidate_vecs) = vectors.split_first()?;
        let mut best: Option<(f32, &Memory)> = None;
        for (memory, vec) in candidates.iter().zip(candidate_vecs) {
            let score = cosine(proposal_vec, vec);
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, memory));
            }
        }

        best.filter(|(score, _)| *score >= self.config.merge_threshold)
            .map(|(_, m)| m.clone())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
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
