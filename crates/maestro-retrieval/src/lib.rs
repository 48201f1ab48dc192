//! # maestro-retrieval
//!
//! Facet retrieval for the maestro pipeline.
//!
//! Executes each facet's search strategy concurrently against the
//! [`KnowledgeStore`](maestro_core::KnowledgeStore) capability with
//! per-branch timeouts, and ships an in-memory store for tests and demos.

pub mod retriever;
pub mod store;

// Re-export core types
pub use maestro_core::*;

pub use retriever::Retriever;
pub use store::InMemoryKnowledgeStore;
