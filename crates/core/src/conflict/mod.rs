//! Three-way merging, conflicts, and resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Merging** -- combining base/ours/theirs into one document and
//!    auto-applying every non-overlapping edit.
//! 2. **Detection** -- classifying overlapping edits into conflicts.
//! 3. **Resolution** -- applying a chosen side to the merged document, and
//!    suggesting a side from change descriptions.

pub mod detector;
pub mod merger;
pub mod resolver;
pub mod suggest;

pub use detector::{
    classify_change_pair, classify_object, Conflict, ConflictDetector, ConflictKind,
    ConflictScope, ConflictStatus, ObjectDelta, ObjectOutcome,
};
pub use merger::{MergeResult, Merger};
pub use resolver::{apply_resolution, resolved_value, ConflictResolver, Resolution};
pub use suggest::{
    auto_resolve_where_possible, build_conflict_infos, extract_object_names, format_value,
    infer_intent, relevance_score, review_conflicts, suggest_resolution, ChangeInfo,
    ChangeSource, ConflictInfo, ModificationContext, ResolutionStrategy, Side, VcsKind,
};
