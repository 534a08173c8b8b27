//! Change records produced by the differ.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::LocalId;

use super::path::PropertyPath;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Removed => write!(f, "removed"),
            Self::Modified => write!(f, "modified"),
        }
    }
}

/// One difference between two property trees, without object context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub path: PropertyPath,
    pub kind: ChangeKind,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl PropertyChange {
    /// The same change seen from the other direction.
    pub fn inverted(&self) -> Self {
        let kind = match self.kind {
            ChangeKind::Added => ChangeKind::Removed,
            ChangeKind::Removed => ChangeKind::Added,
            ChangeKind::Modified => ChangeKind::Modified,
        };
        Self {
            path: self.path.clone(),
            kind,
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
        }
    }
}

/// A property-level change inside a matched object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Local ID of the object in the new (right) document.
    pub local_id: LocalId,
    pub class_name: String,
    pub property_path: PropertyPath,
    pub kind: ChangeKind,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub game_object_name: Option<String>,
    pub hierarchy_path: Option<String>,
}

impl Change {
    pub fn from_property(
        local_id: LocalId,
        class_name: impl Into<String>,
        change: PropertyChange,
    ) -> Self {
        Self {
            local_id,
            class_name: class_name.into(),
            property_path: change.path,
            kind: change.kind,
            old_value: change.old_value,
            new_value: change.new_value,
            game_object_name: None,
            hierarchy_path: None,
        }
    }

    /// `Class.path`, e.g. `Transform.m_LocalPosition.x`.
    pub fn full_path(&self) -> String {
        if self.property_path.is_root() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.class_name, self.property_path)
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (object {})", self.kind, self.full_path(), self.local_id)
    }
}

/// A whole object present on one side only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub local_id: LocalId,
    pub class_name: String,
    pub kind: ChangeKind,
    /// The object's property tree.
    pub data: Value,
    pub game_object_name: Option<String>,
    pub hierarchy_path: Option<String>,
}

/// Output of a document-level diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub property_changes: Vec<Change>,
    pub object_changes: Vec<ObjectChange>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.property_changes.is_empty() || !self.object_changes.is_empty()
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.property_changes.iter().filter(|c| c.kind == kind).count()
            + self.object_changes.iter().filter(|c| c.kind == kind).count()
    }

    pub fn added_count(&self) -> usize {
        self.count(ChangeKind::Added)
    }

    pub fn removed_count(&self) -> usize {
        self.count(ChangeKind::Removed)
    }

    pub fn modified_count(&self) -> usize {
        self.count(ChangeKind::Modified)
    }

    pub fn changes_for_object(&self, local_id: LocalId) -> Vec<&Change> {
        self.property_changes
            .iter()
            .filter(|c| c.local_id == local_id)
            .collect()
    }
}
