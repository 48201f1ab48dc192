//! Centralized default constants for the maestro pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. Stages and backends reference these constants instead of defining
//! their own magic numbers.
//!
//! Organized by pipeline area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// PLANNING
// =============================================================================

/// Default maximum number of facets a question is decomposed into.
pub const MAX_FACETS: usize = 3;

/// Hard upper bound on facets regardless of settings (context budget).
pub const FACET_HARD_CAP: usize = 5;

/// Number of recent conversation turns fed to the planner.
pub const CONTEXT_TURNS: usize = 4;

/// Character cap applied to each conversation-context message.
pub const CONTEXT_MESSAGE_CHAR_CAP: usize = 1500;

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Default maximum chunks retrieved per facet.
pub const CHUNKS_PER_FACET: usize = 20;

/// Default minimum cosine similarity for a chunk to count as grounding.
///
/// Vector search always returns top-K regardless of actual similarity;
/// below ~0.5 results are mostly noise for the corpus this runs against.
pub const SIMILARITY_THRESHOLD: f32 = 0.7;

// =============================================================================
// SUMMARIZATION
// =============================================================================

/// Character budget per chunk when building a summarizer prompt.
pub const CHUNK_CHAR_BUDGET: usize = 1200;

/// Character cap per facet summary when building the final-writer prompt.
pub const SUMMARY_CHAR_BUDGET: usize = 4000;

// =============================================================================
// CRITIC
// =============================================================================

/// Default revision budget for the critic loop (total calls = retries + 1).
pub const CRITIC_MAX_RETRIES: u32 = 2;

/// Default minimum quality score for the critic to approve an idea.
pub const QUALITY_THRESHOLD: f32 = 0.7;

// =============================================================================
// FACT VERIFICATION / WEB RESEARCH
// =============================================================================

/// Maximum claims submitted for fact verification per request.
pub const MAX_CLAIMS_TO_VERIFY: usize = 10;

/// Default web search results per facet/claim.
pub const WEB_SEARCH_MAX_RESULTS: usize = 3;

// =============================================================================
// FINAL WRITER
// =============================================================================

/// Maximum entries listed in the citation guide prompt block.
pub const CITATION_GUIDE_CAP: usize = 50;

// =============================================================================
// MEMORY
// =============================================================================

/// Default number of long-term memories loaded before the pipeline.
pub const MEMORY_LOAD_LIMIT: usize = 8;

/// Cosine similarity above which an extracted memory merges into an
/// existing memory of the same type instead of inserting a duplicate.
pub const MEMORY_MERGE_THRESHOLD: f32 = 0.85;

/// Half-life in days for the recency component of memory ranking.
pub const MEMORY_RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

/// Character cap for the formatted memory prompt block.
pub const MEMORY_BLOCK_CHAR_CAP: usize = 2000;

// =============================================================================
// TIMEOUTS & GENERATION
// =============================================================================

/// Default per-stage timeout (retrieval branches, model calls) in seconds.
pub const STAGE_TIMEOUT_SECS: u64 = 60;

/// Default HTTP timeout for gateway requests in seconds.
pub const GATEWAY_TIMEOUT_SECS: u64 = 300;

/// Default max tokens for a generation request.
pub const MAX_TOKENS: u32 = 2000;

/// Max tokens for the final writer (long-form output).
pub const WRITER_MAX_TOKENS: u32 = 8000;

/// Default sampling temperature.
pub const TEMPERATURE: f32 = 0.7;

/// Sampling temperature for structured (JSON) stages.
pub const STRUCTURED_TEMPERATURE: f32 = 0.2;

/// Sampling temperature for the idea generator in creative mode.
pub const CREATIVE_TEMPERATURE: f32 = 0.9;
