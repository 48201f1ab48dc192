//! Structured logging field name constants for the maestro pipeline.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! stage of the pipeline.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded request, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Stage completions, request lifecycle |
//! | DEBUG | Decision points, intermediate values, model choices |
//! | TRACE | Per-item iteration (chunks, claims, tool calls) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across every stage of one request.
pub const REQUEST_ID: &str = "request_id";

/// Pipeline stage originating the log event.
/// Values: "planner", "retriever", "summarizer", "idea_generator",
/// "critic", "fact_verifier", "tool_executor", "final_writer", "memory"
pub const STAGE: &str = "stage";

/// User whose request/memories are being processed.
pub const USER_ID: &str = "user_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Facet name being retrieved/summarized.
pub const FACET: &str = "facet";

/// Model slug used for a gateway call.
pub const MODEL: &str = "model";

/// Tool name being validated/executed.
pub const TOOL: &str = "tool";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or stage.
pub const RESULT_COUNT: &str = "result_count";

/// Number of chunks retrieved or processed.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Number of facets planned or in flight.
pub const FACET_COUNT: &str = "facet_count";

/// Byte length of a prompt sent to the gateway.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Set when a stage fell back to a degraded/default output.
pub const DEGRADED: &str = "degraded";
