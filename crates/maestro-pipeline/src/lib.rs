//! # maestro-pipeline
//!
//! The multi-stage knowledge-grounded answer pipeline.
//!
//! Given a question plus conversation/long-term-memory context, the
//! pipeline decomposes the question into facets, retrieves and summarizes
//! grounded knowledge per facet, generates and critiques candidate answer
//! ideas, optionally verifies claims against live web search, optionally
//! executes platform actions, and writes a final cited response.
//!
//! Every stage parses model output through the structured-output guard and
//! declares a safe default, so a malformed reply degrades one stage rather
//! than failing the request. The [`Orchestrator`] is the only place
//! branching logic lives; callers always receive a well-formed
//! [`MasterAiResponse`](maestro_core::MasterAiResponse).

pub mod critic;
pub mod idea;
pub mod orchestrator;
pub mod planner;
pub mod research;
pub mod summarizer;
pub mod tools;
pub mod verifier;
pub mod writer;

// Re-export core types
pub use maestro_core::*;

pub use critic::{Critic, CriticVerdict};
pub use idea::IdeaGenerator;
pub use orchestrator::{Orchestrator, PipelineRequest};
pub use planner::Planner;
pub use research::{FacetResearch, ResearchOutput, WebResearcher};
pub use summarizer::Summarizer;
pub use tools::{
    ActionProposal, ToolCall, ToolCallResult, ToolCallState, ToolDefinition, ToolExecutor,
    ToolParamKind, ToolParameter, ToolRegistry,
};
pub use verifier::FactVerifier;
pub use writer::{FinalWriter, WriterInput, WriterOutput};
