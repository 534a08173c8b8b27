//! Conflict records and overlap detection.
//!
//! Given the changes each side made relative to a common base, the detector
//! identifies the places both sides touched incompatibly. The merger uses the
//! same classification per object and per property.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::diff::{Change, ChangeKind, PropertyPath};
use crate::document::LocalId;

use super::resolver::Resolution;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Categorisation of a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed the same value differently.
    BothModified,
    /// One side changed a value the other removed.
    ModifyVsRemove,
    /// Both sides added a value where the base had none.
    AddVsAdd,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BothModified => write!(f, "both_modified"),
            Self::ModifyVsRemove => write!(f, "modify_vs_remove"),
            Self::AddVsAdd => write!(f, "add_vs_add"),
        }
    }
}

/// Lifecycle status of a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Just detected.
    Detected,
    /// Looked at and deferred for later resolution.
    Deferred,
    /// A resolution has been applied to the merged document.
    Resolved,
}

impl std::fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detected => write!(f, "detected"),
            Self::Deferred => write!(f, "deferred"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// What a conflict covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictScope {
    /// One value inside an object's property tree.
    Property { path: PropertyPath },
    /// A whole object; values are serialized [`SceneObject`](crate::document::SceneObject)s.
    Object,
}

/// A change both sides made incompatibly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique conflict ID.
    pub id: String,
    /// Object in the merged document.
    pub local_id: LocalId,
    pub class_name: String,
    pub scope: ConflictScope,
    pub kind: ConflictKind,
    pub base: Option<Value>,
    pub ours: Option<Value>,
    pub theirs: Option<Value>,
    pub game_object_name: Option<String>,
    pub hierarchy_path: Option<String>,
    /// Current status.
    pub status: ConflictStatus,
    /// How the conflict was resolved (if resolved or deferred).
    pub resolution: Option<Resolution>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    /// Create a new conflict with a fresh UUID.
    pub fn new(
        local_id: LocalId,
        class_name: impl Into<String>,
        scope: ConflictScope,
        kind: ConflictKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            local_id,
            class_name: class_name.into(),
            scope,
            kind,
            base: None,
            ours: None,
            theirs: None,
            game_object_name: None,
            hierarchy_path: None,
            status: ConflictStatus::Detected,
            resolution: None,
            resolved_at: None,
        }
    }

    pub fn with_values(
        mut self,
        base: Option<Value>,
        ours: Option<Value>,
        theirs: Option<Value>,
    ) -> Self {
        self.base = base;
        self.ours = ours;
        self.theirs = theirs;
        self
    }

    pub fn property_path(&self) -> Option<&PropertyPath> {
        match &self.scope {
            ConflictScope::Property { path } => Some(path),
            ConflictScope::Object => None,
        }
    }

    pub fn is_object_level(&self) -> bool {
        matches!(self.scope, ConflictScope::Object)
    }

    /// `Class.path`, or the class name alone for object conflicts.
    pub fn display_path(&self) -> String {
        match self.property_path() {
            Some(path) if !path.is_root() => format!("{}.{}", self.class_name, path),
            _ => self.class_name.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ConflictStatus::Resolved
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What one side did to an object relative to base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectDelta {
    Unchanged,
    Modified,
    Removed,
}

/// What the merger does with a base object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    /// Neither side touched it.
    Keep,
    /// Merge the property trees.
    Merge,
    /// Drop it from the merged document.
    Remove,
    /// Keep base and report a whole-object conflict.
    Conflict(ConflictKind),
}

/// Classify what happens to a base object given both sides' deltas.
pub fn classify_object(ours: ObjectDelta, theirs: ObjectDelta) -> ObjectOutcome {
    use ObjectDelta::{Modified, Removed, Unchanged};
    match (ours, theirs) {
        (Unchanged, Unchanged) => ObjectOutcome::Keep,
        // Both deleted, or one deleted what the other left alone.
        (Removed, Removed) | (Removed, Unchanged) | (Unchanged, Removed) => ObjectOutcome::Remove,
        (Modified, Removed) | (Removed, Modified) => {
            ObjectOutcome::Conflict(ConflictKind::ModifyVsRemove)
        }
        (Modified, _) | (_, Modified) => ObjectOutcome::Merge,
    }
}

/// Classify two changes to the same value, or `None` if they agree.
pub fn classify_change_pair(ours: &Change, theirs: &Change) -> Option<ConflictKind> {
    if ours.property_path == theirs.property_path && ours.new_value == theirs.new_value {
        return None;
    }
    match (ours.kind, theirs.kind) {
        (ChangeKind::Added, ChangeKind::Added) => Some(ConflictKind::AddVsAdd),
        (ChangeKind::Removed, _) | (_, ChangeKind::Removed) => Some(ConflictKind::ModifyVsRemove),
        _ => Some(ConflictKind::BothModified),
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Stateless detector over two change sets expressed in the same ID space.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Report every pair of changes that touch the same value, or a value
    /// and one of its ancestors, with different outcomes.
    pub fn detect(ours: &[Change], theirs: &[Change]) -> Vec<Conflict> {
        info!(
            ours_count = ours.len(),
            theirs_count = theirs.len(),
            "detecting conflicts"
        );

        let mut theirs_by_object: HashMap<LocalId, Vec<&Change>> = HashMap::new();
        for change in theirs {
            theirs_by_object.entry(change.local_id).or_default().push(change);
        }

        let mut conflicts = Vec::new();
        for our_change in ours {
            let Some(candidates) = theirs_by_object.get(&our_change.local_id) else {
                continue;
            };
            for their_change in candidates {
                let overlaps = our_change.property_path.starts_with(&their_change.property_path)
                    || their_change.property_path.starts_with(&our_change.property_path);
                if !overlaps {
                    continue;
                }
                let Some(kind) = classify_change_pair(our_change, their_change) else {
                    continue;
                };
                // Report at the shallower of the two paths.
                let path = if our_change.property_path.len() <= their_change.property_path.len() {
                    our_change.property_path.clone()
                } else {
                    their_change.property_path.clone()
                };
                let mut conflict = Conflict::new(
                    our_change.local_id,
                    our_change.class_name.as_str(),
                    ConflictScope::Property { path },
                    kind,
                )
                .with_values(
                    our_change.old_value.clone(),
                    our_change.new_value.clone(),
                    their_change.new_value.clone(),
                );
                conflict.game_object_name = our_change.game_object_name.clone();
                conflict.hierarchy_path = our_change.hierarchy_path.clone();
                debug!(
                    local_id = conflict.local_id,
                    path = %conflict.display_path(),
                    kind = %conflict.kind,
                    "conflict detected"
                );
                conflicts.push(conflict);
            }
        }

        info!(count = conflicts.len(), "conflict detection complete");
        conflicts
    }
}
