//! # maestro-core
//!
//! Core types, traits, and abstractions for the maestro answer pipeline.
//!
//! This crate provides the foundational data structures, the per-request
//! settings model, the structured-output guard, and the capability traits
//! that the other maestro crates depend on.

pub mod defaults;
pub mod error;
pub mod guard;
pub mod logging;
pub mod models;
pub mod settings;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use guard::{clean_json_block, extract_json, parse_or_default};
pub use models::*;
pub use settings::{ChatSettings, ModelPreset, PresetId, ResponseStyle, Stage, StageOverrides};
pub use traits::*;
