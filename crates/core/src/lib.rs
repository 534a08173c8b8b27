//! scenemerge core library.
//!
//! Structural diff and three-way merge for scene and prefab documents whose
//! object IDs and list orders are not stable across saves: hierarchy
//! reconstruction, identity matching, property-level diffing, merging with
//! conflict reporting, and resolution suggestions.

pub mod config;
pub mod conflict;
pub mod context;
pub mod diff;
pub mod document;
pub mod errors;
pub mod hierarchy;
pub mod identity;
pub mod logging;

// Re-exports for convenience.
pub use config::EngineConfig;
pub use conflict::{Conflict, MergeResult, Merger, Resolution};
pub use context::DiffContext;
pub use diff::{compare_values, semantic_diff, DiffResult};
pub use document::{Document, LocalId, SceneObject};
pub use errors::CoreError;
pub use hierarchy::Hierarchy;
pub use identity::{DocumentPairing, MatchKey, MatchMap};
