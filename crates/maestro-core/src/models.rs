//! Inter-stage data model for the maestro pipeline.
//!
//! Every artifact exchanged between stages lives here so that stage
//! contracts are explicit and independently testable. All types are created
//! fresh per request and owned by the orchestrator for the request's
//! lifetime, except [`Memory`], which outlives the request and is owned by
//! the user record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Embedding vector type.
pub type Vector = Vec<f32>;

// =============================================================================
// CHAT MESSAGES
// =============================================================================

/// Message role in a model conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// PLANNER OUTPUT
// =============================================================================

/// Classification of what kind of answer the question needs.
///
/// Closed set; unrecognized model output falls back to [`QuestionType::Technical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    Technical,
    Conceptual,
    Workflow,
    Creative,
    Troubleshooting,
    Comparison,
}

impl QuestionType {
    /// Parse a model-emitted label, falling back to `Technical`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "conceptual" => Self::Conceptual,
            "workflow" => Self::Workflow,
            "creative" => Self::Creative,
            "troubleshooting" => Self::Troubleshooting,
            "comparison" => Self::Comparison,
            _ => Self::Technical,
        }
    }
}

/// An independent sub-topic of the question requiring its own retrieval pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facet {
    pub name: String,
    pub description: String,
    /// Short phrase hinting what to search for.
    pub query_hint: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 1-5, higher = more important. Used for clamping and tie-breaking.
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    3
}

/// Source filters applied to a facet's search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub source_types: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Concrete search plan for one facet. 1:1 with facets, enforced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub facet_name: String,
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
}

/// Planner stage output: intent classification plus the facet decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerOutput {
    pub intent: String,
    pub question_type: QuestionType,
    pub facets: Vec<Facet>,
    pub search_strategies: Vec<SearchStrategy>,
}

// =============================================================================
// RETRIEVER OUTPUT
// =============================================================================

/// One retrieved unit of source knowledge with a similarity score.
///
/// Immutable once retrieved. `source_id` + `source_type` are the only
/// identity citations may reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub source_type: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    pub score: f32,
}

/// Chunks retrieved for a single facet. Zero chunks is valid data, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetBucket {
    pub facet_name: String,
    pub chunks: Vec<Chunk>,
    /// Hits found before threshold/cap filtering.
    pub total_found: usize,
}

/// Retriever stage output, buckets in facet priority order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieverOutput {
    pub buckets: Vec<FacetBucket>,
    pub total_chunks_retrieved: usize,
}

impl RetrieverOutput {
    /// Iterate over every retrieved chunk across all buckets.
    pub fn all_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.buckets.iter().flat_map(|b| b.chunks.iter())
    }
}

// =============================================================================
// SUMMARIZER OUTPUT
// =============================================================================

/// Bounded-length compression of one facet's chunks.
///
/// Invariant: every entry in `cited_chunk_ids` exists in the facet's
/// retrieved chunk set. Fabricated ids are filtered by the summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub facet_name: String,
    pub text: String,
    /// Concrete techniques/points worth carrying into later stages.
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub cited_chunk_ids: Vec<String>,
    /// 0-1 confidence that the summary is grounded in the chunks.
    #[serde(default)]
    pub confidence: f32,
    /// True when the facet retrieved nothing and no model call was made.
    #[serde(default)]
    pub no_grounding: bool,
}

impl Summary {
    /// Placeholder summary for a facet with no retrieved chunks.
    pub fn no_grounding(facet_name: impl Into<String>) -> Self {
        Self {
            facet_name: facet_name.into(),
            text: "No grounding found for this facet in the knowledge base.".to_string(),
            key_points: Vec::new(),
            cited_chunk_ids: Vec::new(),
            confidence: 0.0,
            no_grounding: true,
        }
    }
}

// =============================================================================
// IDEA GENERATOR OUTPUT
// =============================================================================

/// How well-grounded an idea is in the retrieved material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdeaConfidence {
    #[default]
    Supported,
    Extrapolated,
    Experimental,
}

/// A candidate answer skeleton: an angle plus an outline of what to cover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub angle: String,
    #[serde(default)]
    pub outline: Vec<String>,
    /// Facet names this idea draws from; must reference existing facets.
    #[serde(default)]
    pub supporting_facets: Vec<String>,
    #[serde(default)]
    pub confidence: IdeaConfidence,
}

// =============================================================================
// CRITIC OUTPUT
// =============================================================================

/// Kind of problem the critic found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Contradiction,
    Gap,
    Inaccuracy,
    Style,
}

/// Severity of a critic issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

/// A single issue raised by the critic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub description: String,
    pub severity: IssueSeverity,
}

/// Critic stage output. Terminal when `approved`, otherwise `revised_idea`
/// replaces the candidate wholesale for the next iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticOutput {
    pub approved: bool,
    /// 0-1 overall quality estimate.
    #[serde(default)]
    pub quality: f32,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<CriticIssue>,
    #[serde(default)]
    pub revised_idea: Option<Idea>,
}

// =============================================================================
// FACT VERIFICATION OUTPUT
// =============================================================================

/// One claim checked against live web search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedClaim {
    pub text: String,
    pub supported: bool,
    #[serde(default)]
    pub evidence_url: Option<String>,
}

/// Fact verifier stage output. Advisory only; never blocks the answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactVerificationOutput {
    pub claims: Vec<VerifiedClaim>,
    /// 0-1 aggregate support. `None` means verification was unavailable,
    /// which is distinct from a low score.
    pub overall_confidence: Option<f32>,
}

// =============================================================================
// WEB RESEARCH
// =============================================================================

/// One web search result snippet. Fed to the verifier and writer as
/// labelled context; never a citation source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSnippet {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: f32,
}

// =============================================================================
// FINAL OUTPUT
// =============================================================================

/// A resolved citation, strictly derived from a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based display index as referenced in the answer text.
    pub id: usize,
    pub source_id: String,
    pub source_type: String,
    pub title: String,
}

/// Model slugs used per stage, for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsUsed {
    pub planner: String,
    pub summarizer: String,
    #[serde(default)]
    pub idea_generator: Option<String>,
    #[serde(default)]
    pub critic: Option<String>,
    #[serde(default)]
    pub fact_verifier: Option<String>,
    #[serde(default)]
    pub tool_planner: Option<String>,
    pub final_writer: String,
}

/// Observability metadata attached to every response.
///
/// Failures along the way are visible here (degraded flags, skip markers),
/// never as errors surfaced to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub models_used: ModelsUsed,
    pub processing_time_ms: u64,
    pub total_chunks_processed: usize,
    /// `None` when the critic was disabled.
    #[serde(default)]
    pub critic_approved: Option<bool>,
    /// Set when verification was requested but its dependency failed.
    #[serde(default)]
    pub verification_skipped: bool,
    #[serde(default)]
    pub web_results: usize,
    #[serde(default)]
    pub tool_calls_executed: usize,
    #[serde(default)]
    pub tool_calls_rejected: usize,
    /// Set when a required stage fell back to a best-effort output.
    #[serde(default)]
    pub degraded: bool,
}

/// The pipeline's terminal artifact: the stable contract persisted as a
/// conversation turn by the surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterAiResponse {
    pub content: String,
    pub citations: Vec<Citation>,
    pub facets_used: Vec<String>,
    pub pipeline_metadata: PipelineMetadata,
}

// =============================================================================
// MEMORY
// =============================================================================

/// Kind of long-term memory held about a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Preference,
    Fact,
    SkillLevel,
    Context,
    Correction,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preference => write!(f, "preference"),
            Self::Fact => write!(f, "fact"),
            Self::SkillLevel => write!(f, "skill_level"),
            Self::Context => write!(f, "context"),
            Self::Correction => write!(f, "correction"),
        }
    }
}

/// One long-term memory owned by a user record.
///
/// Read before the pipeline starts and written after it ends; access
/// bookkeeping bumps on every read, soft expiry via `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub memory_type: MemoryType,
    pub content: String,
    /// 0-1 relevance weight assigned at extraction, refreshed on merge.
    pub importance: f32,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Memory {
    /// Create a new memory with fresh bookkeeping.
    pub fn new(memory_type: MemoryType, content: impl Into<String>, importance: f32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            memory_type,
            content: content.into(),
            importance: importance.clamp(0.0, 1.0),
            access_count: 0,
            created_at: now,
            last_accessed_at: now,
            expires_at: None,
        }
    }

    /// True when the memory has passed its soft expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_type_parse_lenient() {
        assert_eq!(QuestionType::parse_lenient("workflow"), QuestionType::Workflow);
        assert_eq!(QuestionType::parse_lenient(" Comparison "), QuestionType::Comparison);
        assert_eq!(QuestionType::parse_lenient("banana"), QuestionType::Technical);
        assert_eq!(QuestionType::parse_lenient(""), QuestionType::Technical);
    }

    #[test]
    fn test_chat_message_constructors() {
        let msg = ChatMessage::system("be helpful");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.content, "be helpful");

        assert_eq!(ChatMessage::user("hi").role, Role::User);
        assert_eq!(ChatMessage::assistant("hello").role, Role::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }

    #[test]
    fn test_facet_defaults_on_sparse_json() {
        let facet: Facet = serde_json::from_str(
            r#"{"name": "eq basics", "description": "EQ fundamentals", "query_hint": "how to eq"}"#,
        )
        .unwrap();
        assert_eq!(facet.priority, 3);
        assert!(facet.tags.is_empty());
    }

    #[test]
    fn test_retriever_output_all_chunks() {
        let out = RetrieverOutput {
            buckets: vec![
                FacetBucket {
                    facet_name: "a".into(),
                    chunks: vec![chunk("1"), chunk("2")],
                    total_found: 2,
                },
                FacetBucket {
                    facet_name: "b".into(),
                    chunks: vec![chunk("3")],
                    total_found: 1,
                },
            ],
            total_chunks_retrieved: 3,
        };
        let ids: Vec<_> = out.all_chunks().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_summary_no_grounding_placeholder() {
        let summary = Summary::no_grounding("mixing");
        assert!(summary.no_grounding);
        assert!(summary.cited_chunk_ids.is_empty());
        assert_eq!(summary.confidence, 0.0);
        assert!(!summary.text.is_empty());
    }

    #[test]
    fn test_critic_output_deserializes_with_defaults() {
        let out: CriticOutput = serde_json::from_str(r#"{"approved": true}"#).unwrap();
        assert!(out.approved);
        assert!(out.issues.is_empty());
        assert!(out.revised_idea.is_none());
    }

    #[test]
    fn test_critic_issue_type_field_rename() {
        let issue: CriticIssue = serde_json::from_str(
            r#"{"type": "gap", "description": "missing sidechain coverage", "severity": "medium"}"#,
        )
        .unwrap();
        assert_eq!(issue.kind, IssueKind::Gap);
        assert_eq!(issue.severity, IssueSeverity::Medium);
    }

    #[test]
    fn test_memory_new_clamps_importance() {
        let m = Memory::new(MemoryType::Preference, "prefers short answers", 1.5);
        assert_eq!(m.importance, 1.0);
        assert_eq!(m.access_count, 0);
    }

    #[test]
    fn test_memory_expiry() {
        let mut m = Memory::new(MemoryType::Context, "working on an EP", 0.5);
        let now = Utc::now();
        assert!(!m.is_expired(now));

        m.expires_at = Some(now - chrono::Duration::hours(1));
        assert!(m.is_expired(now));
    }

    #[test]
    fn test_memory_type_display() {
        assert_eq!(MemoryType::SkillLevel.to_string(), "skill_level");
        assert_eq!(MemoryType::Correction.to_string(), "correction");
    }

    #[test]
    fn test_master_ai_response_round_trip() {
        let response = MasterAiResponse {
            content: "Use a high-pass filter first [[1]].".to_string(),
            citations: vec![Citation {
                id: 1,
                source_id: "lesson-42".into(),
                source_type: "lesson".into(),
                title: "EQ Fundamentals".into(),
            }],
            facets_used: vec!["eq basics".into()],
            pipeline_metadata: PipelineMetadata::default(),
        };

        let json = serde_json::to_string(&response).unwrap();
        let parsed: MasterAiResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.citations, response.citations);
        assert_eq!(parsed.facets_used, response.facets_used);
    }

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_id: format!("src-{id}"),
            source_type: "note".to_string(),
            title: format!("Chunk {id}"),
            content: "content".to_string(),
            category: None,
            score: 0.9,
        }
    }
}
