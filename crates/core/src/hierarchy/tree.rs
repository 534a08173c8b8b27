//! Reconstructed scene tree types and read-only queries.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::diff::PropertyPath;
use crate::document::{make_ref, ref_id, Document, LocalId, PropertyTree, SceneObject};
use crate::errors::DocumentError;

/// Index of a [`TreeNode`] inside its [`Hierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Template an instance node was instantiated from (`m_SourcePrefab`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSource {
    pub guid: String,
    pub file_id: LocalId,
}

/// Identity of the template object an override targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateRef {
    pub file_id: LocalId,
    pub guid: String,
}

/// One entry of an instance's override surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub target: TemplateRef,
    pub property_path: String,
    pub value: Option<Value>,
    pub object_reference: Option<LocalId>,
}

impl OverrideRecord {
    /// Parse one `m_Modifications` entry. Entries without a `propertyPath`
    /// are not overrides.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let property_path = map.get("propertyPath")?.as_str()?.to_string();
        let target = map.get("target");
        Some(Self {
            target: TemplateRef {
                file_id: target.and_then(ref_id).unwrap_or(0),
                guid: target
                    .and_then(|t| t.get("guid"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            property_path,
            value: map.get("value").cloned(),
            object_reference: map.get("objectReference").and_then(ref_id).filter(|id| *id != 0),
        })
    }

    /// The `m_Modifications` entry form of this record.
    pub fn to_value(&self) -> Value {
        json!({
            "target": {"fileID": self.target.file_id, "guid": self.target.guid},
            "propertyPath": self.property_path,
            "value": self.value.clone().unwrap_or(Value::Null),
            "objectReference": make_ref(self.object_reference.unwrap_or(0)),
        })
    }

    /// Override value rendered for display, e.g. as a node name.
    pub fn value_text(&self) -> Option<String> {
        match self.value.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Plain node or instance node, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Plain,
    Instance {
        source: InstanceSource,
        overrides: Vec<OverrideRecord>,
    },
}

/// A component attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRef {
    pub owner: NodeId,
    pub local_id: LocalId,
    pub class_id: u32,
    pub class_name: String,
    /// Script GUID of script-based components.
    pub script_identity: Option<String>,
    /// Display name of the script, when the context knows it.
    pub script_name: Option<String>,
    /// Attached through a placeholder of an instance node.
    pub on_instanced_node: bool,
}

impl ComponentRef {
    pub fn type_name(&self) -> &str {
        &self.class_name
    }

    pub fn properties<'d>(&self, doc: &'d Document) -> Option<&'d PropertyTree> {
        doc.get(self.local_id).map(|obj| &obj.properties)
    }
}

/// One logical scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// The `GameObject` or `PrefabInstance` this node was built from.
    pub local_id: LocalId,
    pub name: String,
    /// Transform edge (root placeholder transform for instances).
    pub transform_id: Option<LocalId>,
    pub is_ui: bool,
    pub kind: NodeKind,
    pub components: Vec<ComponentRef>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    pub fn is_instance(&self) -> bool {
        matches!(self.kind, NodeKind::Instance { .. })
    }

    pub fn instance_source(&self) -> Option<&InstanceSource> {
        match &self.kind {
            NodeKind::Instance { source, .. } => Some(source),
            NodeKind::Plain => None,
        }
    }

    pub fn overrides(&self) -> &[OverrideRecord] {
        match &self.kind {
            NodeKind::Instance { overrides, .. } => overrides,
            NodeKind::Plain => &[],
        }
    }

    /// The `index`-th component of the given type.
    pub fn component(&self, type_name: &str, index: usize) -> Option<&ComponentRef> {
        self.components_of_type(type_name).into_iter().nth(index)
    }

    pub fn components_of_type(&self, type_name: &str) -> Vec<&ComponentRef> {
        self.components
            .iter()
            .filter(|c| c.class_name == type_name)
            .collect()
    }

    /// Value at a dotted path such as `m_LocalPosition.x`. Instance nodes
    /// read the override for that path; plain nodes read their `GameObject`,
    /// then their transform.
    pub fn property<'d>(&self, doc: &'d Document, path: &str) -> Option<&'d Value> {
        match &self.kind {
            NodeKind::Instance { source, .. } => modifications(doc.get(self.local_id)?)?
                .iter()
                .rev()
                .find(|entry| overrides_path(entry, source, path))?
                .get("value"),
            NodeKind::Plain => {
                let property = dotted(path);
                [Some(self.local_id), self.transform_id]
                    .into_iter()
                    .flatten()
                    .filter_map(|id| doc.get(id))
                    .find_map(|obj| property.lookup(&obj.properties))
            }
        }
    }

    /// Write `value` at a dotted path.
    ///
    /// Instance nodes record the write as an override on their template,
    /// updating the latest entry for the same path or appending one. Plain
    /// nodes write to the transform when only it holds the first key, and
    /// to the `GameObject` otherwise. The hierarchy itself is not refreshed.
    pub fn set_property(&self, doc: &mut Document, path: &str, value: Value) -> Result<(), DocumentError> {
        let invalid = |local_id: LocalId, detail: &str| DocumentError::InvalidPath {
            local_id,
            path: path.to_string(),
            detail: detail.to_string(),
        };
        if path.is_empty() {
            return Err(invalid(self.local_id, "empty property path"));
        }

        match &self.kind {
            NodeKind::Instance { source, .. } => {
                let obj = doc
                    .get_mut(self.local_id)
                    .ok_or(DocumentError::ObjectNotFound(self.local_id))?;
                let list = modifications_mut(obj)
                    .ok_or_else(|| invalid(self.local_id, "m_Modification is not a map"))?;
                match list.iter().rposition(|entry| overrides_path(entry, source, path)) {
                    Some(pos) => {
                        if let Some(entry) = list[pos].as_object_mut() {
                            entry.insert("value".to_string(), value);
                        }
                    }
                    None => {
                        let record = OverrideRecord {
                            target: TemplateRef {
                                file_id: source.file_id,
                                guid: source.guid.clone(),
                            },
                            property_path: path.to_string(),
                            value: Some(value),
                            object_reference: None,
                        };
                        list.push(record.to_value());
                    }
                }
                Ok(())
            }
            NodeKind::Plain => {
                let first = path.split('.').next().unwrap_or(path);
                let holds = |doc: &Document, id: LocalId| {
                    doc.get(id).is_some_and(|obj| obj.properties.contains_key(first))
                };
                let target = match self.transform_id {
                    Some(tr) if !holds(&*doc, self.local_id) && holds(&*doc, tr) => tr,
                    _ => self.local_id,
                };
                let obj = doc.get_mut(target).ok_or(DocumentError::ObjectNotFound(target))?;
                dotted(path)
                    .assign(&mut obj.properties, Some(value))
                    .map_err(|e| invalid(target, &e.to_string()))
            }
        }
    }
}

fn dotted(path: &str) -> PropertyPath {
    path.split('.').fold(PropertyPath::root(), |p, key| p.key(key))
}

fn modifications(obj: &SceneObject) -> Option<&Vec<Value>> {
    obj.get("m_Modification")?.get("m_Modifications")?.as_array()
}

fn modifications_mut(obj: &mut SceneObject) -> Option<&mut Vec<Value>> {
    obj.properties
        .entry("m_Modification")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()?
        .entry("m_Modifications")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
}

/// Whether an `m_Modifications` entry overrides `path` on the instance's
/// own template. Entries without a GUID count as the instance's.
fn overrides_path(entry: &Value, source: &InstanceSource, path: &str) -> bool {
    OverrideRecord::from_value(entry).is_some_and(|record| {
        record.property_path == path
            && (record.target.guid.is_empty() || record.target.guid == source.guid)
    })
}

/// The logical tree of one document: an index over its arena.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) by_local_id: HashMap<LocalId, NodeId>,
    pub(crate) by_transform: HashMap<LocalId, NodeId>,
    pub(crate) component_owner: HashMap<LocalId, NodeId>,
    pub(crate) placeholder_of: HashMap<LocalId, LocalId>,
    pub(crate) instance_placeholders: HashMap<LocalId, Vec<LocalId>>,
}

impl Hierarchy {
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_by_local_id(&self, local_id: LocalId) -> Option<NodeId> {
        self.by_local_id.get(&local_id).copied()
    }

    /// Instance owning a placeholder object.
    pub fn instance_for_placeholder(&self, local_id: LocalId) -> Option<LocalId> {
        self.placeholder_of.get(&local_id).copied()
    }

    /// Placeholders of an instance, in document order.
    pub fn placeholders_for_instance(&self, instance_id: LocalId) -> &[LocalId] {
        self.instance_placeholders
            .get(&instance_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Effective node for any object ID: the node itself, the node owning a
    /// transform or component, or the instance behind a placeholder.
    pub fn resolve_node(&self, local_id: LocalId) -> Option<NodeId> {
        self.by_local_id
            .get(&local_id)
            .or_else(|| self.by_transform.get(&local_id))
            .or_else(|| self.component_owner.get(&local_id))
            .copied()
            .or_else(|| {
                self.placeholder_of
                    .get(&local_id)
                    .and_then(|inst| self.by_local_id.get(inst).copied())
            })
    }

    /// Depth-first pre-order over every node reachable from a root.
    pub fn iter_all(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        order
    }

    /// Descendants of `id` in depth-first pre-order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            order.push(next);
            stack.extend(self.node(next).children.iter().rev().copied());
        }
        order
    }

    fn siblings(&self, id: NodeId) -> &[NodeId] {
        match self.node(id).parent {
            Some(parent) => &self.node(parent).children,
            None => &self.roots,
        }
    }

    /// Node name, suffixed with `[i]` when same-named siblings exist.
    pub fn disambiguated_name(&self, id: NodeId) -> String {
        let name = &self.node(id).name;
        let same: Vec<NodeId> = self
            .siblings(id)
            .iter()
            .copied()
            .filter(|s| self.node(*s).name == *name)
            .collect();
        // A literal `Name[n]` is always ranked so it never reads as a ranked `Name`.
        let looks_ranked = parse_segment(name).0 != name.as_str();
        if same.len() > 1 || looks_ranked {
            let rank = same.iter().position(|s| *s == id).unwrap_or(0);
            format!("{name}[{rank}]")
        } else {
            name.clone()
        }
    }

    /// Slash-separated path of disambiguated names from the root.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut parts = vec![self.disambiguated_name(id)];
        let mut seen = HashSet::from([id]);
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            parts.push(self.disambiguated_name(parent));
            current = self.node(parent).parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Find a node by full path, e.g. `Canvas/Panel/Button[1]`.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return None;
        }
        let mut candidates: &[NodeId] = &self.roots;
        let mut found = None;
        for segment in path.split('/') {
            let (name, index) = parse_segment(segment);
            let next = candidates
                .iter()
                .copied()
                .filter(|c| self.node(*c).name == name)
                .nth(index)?;
            candidates = &self.node(next).children;
            found = Some(next);
        }
        found
    }

    /// Find a descendant of `from` by relative path. An empty path is `from`.
    pub fn find_from(&self, from: NodeId, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(from);
        }
        let mut current = from;
        for segment in path.split('/') {
            let (name, index) = parse_segment(segment);
            current = self
                .node(current)
                .children
                .iter()
                .copied()
                .filter(|c| self.node(*c).name == name)
                .nth(index)?;
        }
        Some(current)
    }
}

/// Split `Name[2]` into (`Name`, 2). Names without a numeric suffix are literal.
fn parse_segment(segment: &str) -> (&str, usize) {
    if let Some(stripped) = segment.strip_suffix(']') {
        if let Some(open) = stripped.rfind('[') {
            if let Ok(index) = stripped[open + 1..].parse::<usize>() {
                return (&stripped[..open], index);
            }
        }
    }
    (segment, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segment() {
        assert_eq!(parse_segment("Button"), ("Button", 0));
        assert_eq!(parse_segment("Button[1]"), ("Button", 1));
        assert_eq!(parse_segment("Odd[x]"), ("Odd[x]", 0));
        assert_eq!(parse_segment("Item[0][0]"), ("Item[0]", 0));
    }

    #[test]
    fn test_override_record_from_value() {
        let record = OverrideRecord::from_value(&json!({
            "target": {"fileID": 100, "guid": "abc", "type": 3},
            "propertyPath": "m_Name",
            "value": "Enemy",
            "objectReference": {"fileID": 0},
        }))
        .unwrap();
        assert_eq!(record.target.file_id, 100);
        assert_eq!(record.target.guid, "abc");
        assert_eq!(record.value_text().as_deref(), Some("Enemy"));
        assert_eq!(record.object_reference, None);

        assert!(OverrideRecord::from_value(&json!({"value": 1})).is_none());
    }

    #[test]
    fn test_numeric_override_value_text() {
        let record = OverrideRecord::from_value(&json!({
            "target": {"fileID": 1},
            "propertyPath": "m_LocalPosition.x",
            "value": 2.5,
        }))
        .unwrap();
        assert_eq!(record.value_text().as_deref(), Some("2.5"));
    }
}
