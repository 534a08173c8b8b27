//! Content-based identity of an object within its hierarchy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag of a scene node that is a plain `GameObject`.
pub const NODE_TAG: &str = "GameObject";
/// Tag of a scene node that is an instance.
pub const INSTANCE_TAG: &str = "PrefabInstance";

/// `(HierarchyPath, TypeTag, ScriptIdentity, SiblingIndex)`.
///
/// Ordering is lexicographic over the fields, which keeps every map keyed by
/// it deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    pub path: String,
    pub tag: String,
    /// Script GUID, `source:<fileID>` for placeholders, or empty.
    pub script: String,
    pub index: usize,
}

impl MatchKey {
    pub fn new(
        path: impl Into<String>,
        tag: impl Into<String>,
        script: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            path: path.into(),
            tag: tag.into(),
            script: script.into(),
            index,
        }
    }

    /// Key of a node or its transform edge.
    pub fn node(path: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(path, tag, "", 0)
    }

    pub fn is_node(&self) -> bool {
        self.tag == NODE_TAG || self.tag == INSTANCE_TAG
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.tag)?;
        if !self.script.is_empty() {
            write!(f, "({})", self.script)?;
        }
        if self.index > 0 {
            write!(f, "#{}", self.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(MatchKey::node("Root/A", "Transform").to_string(), "Root/A:Transform");
        assert_eq!(
            MatchKey::new("Root", "MonoBehaviour", "abc", 1).to_string(),
            "Root:MonoBehaviour(abc)#1"
        );
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = MatchKey::new("A", "MonoBehaviour", "g", 0);
        let b = MatchKey::new("A", "MonoBehaviour", "g", 1);
        let c = MatchKey::node("B", NODE_TAG);
        assert!(a < b && b < c);
        assert!(c.is_node());
        assert!(!a.is_node());
    }
}
