//! Property-level diffing.
//!
//! - [`property`] compares two values with list rules that ignore reference
//!   order and key override records by target.
//! - [`semantic`] pairs two documents by identity and diffs every pair.
//! - [`path`] holds the typed paths changes and conflicts are addressed by.

pub mod model;
pub mod path;
pub mod property;
pub mod semantic;

pub use model::{Change, ChangeKind, DiffResult, ObjectChange, PropertyChange};
pub use path::{PathError, PathSegment, PropertyPath};
pub use property::{compare_trees, compare_values};
pub use semantic::{diff_with_pairing, semantic_diff, touched_objects};
