//! In-memory document model consumed by every other subsystem.
//!
//! A [`Document`] is an arena of [`SceneObject`]s keyed by their per-document
//! [`LocalId`]. Relationships between objects (parent/child edges, component
//! ownership, placeholder back-pointers) are never stored as pointers; they are
//! expressed as references inside the property tree and resolved by ID lookup.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::DocumentError;

/// Per-document object identifier. Not stable across saves.
pub type LocalId = i64;

/// Ordered property tree of a single object.
pub type PropertyTree = Map<String, Value>;

// ---------------------------------------------------------------------------
// Type codes
// ---------------------------------------------------------------------------

pub const CLASS_GAME_OBJECT: u32 = 1;
pub const CLASS_TRANSFORM: u32 = 4;
pub const CLASS_MONO_BEHAVIOUR: u32 = 114;
pub const CLASS_RECT_TRANSFORM: u32 = 224;
pub const CLASS_PREFAB_INSTANCE: u32 = 1001;

/// Well-known class names by type code.
pub fn class_name_for(class_id: u32) -> String {
    let name = match class_id {
        1 => "GameObject",
        4 => "Transform",
        20 => "Camera",
        23 => "MeshRenderer",
        33 => "MeshFilter",
        54 => "Rigidbody",
        65 => "BoxCollider",
        82 => "AudioSource",
        114 => "MonoBehaviour",
        124 => "Behaviour",
        212 => "SpriteRenderer",
        222 => "CanvasRenderer",
        223 => "Canvas",
        224 => "RectTransform",
        225 => "CanvasGroup",
        1001 => "PrefabInstance",
        other => return format!("Unknown({other})"),
    };
    name.to_string()
}

/// Closed classification of an object by its type code and shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A scene node (`GameObject`).
    PlainNode,
    /// A transform carrying the parent/child edges of a node.
    TransformEdge,
    /// An instantiated template (`PrefabInstance`).
    InstanceRef,
    /// Anything attached to a node through an owning-node pointer.
    Component,
    /// Objects outside the tree (assets, settings, unknown shapes).
    Other,
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Build a reference value `{fileID: id}`.
pub fn make_ref(id: LocalId) -> Value {
    let mut map = Map::new();
    map.insert("fileID".to_string(), Value::from(id));
    Value::Object(map)
}

/// Whether `value` is a pure reference: a map whose only key is `fileID`.
pub fn is_ref(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get("fileID").is_some_and(Value::is_i64),
        _ => false,
    }
}

/// The `fileID` carried by any map that has one, pure reference or not.
pub fn ref_id(value: &Value) -> Option<LocalId> {
    value.as_object()?.get("fileID")?.as_i64()
}

/// Like [`ref_id`] but maps the null reference (`0`) to `None`.
pub fn non_null_ref(value: Option<&Value>) -> Option<LocalId> {
    value.and_then(ref_id).filter(|id| *id != 0)
}

/// Rewrite every pure reference found in `value` through `remap`.
///
/// Maps carrying additional keys next to `fileID` (template identities such
/// as `{fileID, guid}`) are not references into this document and are left
/// untouched.
pub fn remap_refs(value: &Value, remap: &HashMap<LocalId, LocalId>) -> Value {
    match value {
        Value::Object(map) => {
            if is_ref(value) {
                let id = ref_id(value).unwrap_or(0);
                return make_ref(remap.get(&id).copied().unwrap_or(id));
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), remap_refs(v, remap)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| remap_refs(v, remap)).collect()),
        other => other.clone(),
    }
}

/// [`remap_refs`] over a whole property tree.
pub fn remap_tree(tree: &PropertyTree, remap: &HashMap<LocalId, LocalId>) -> PropertyTree {
    tree.iter()
        .map(|(k, v)| (k.clone(), remap_refs(v, remap)))
        .collect()
}

// ---------------------------------------------------------------------------
// SceneObject
// ---------------------------------------------------------------------------

/// One typed object of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub local_id: LocalId,
    pub class_id: u32,
    pub class_name: String,
    /// Placeholder standing in for part of an instanced sub-tree.
    #[serde(default)]
    pub stripped: bool,
    #[serde(default)]
    pub properties: PropertyTree,
}

impl SceneObject {
    pub fn new(class_id: u32, local_id: LocalId, properties: PropertyTree) -> Self {
        Self {
            local_id,
            class_id,
            class_name: class_name_for(class_id),
            stripped: false,
            properties,
        }
    }

    /// Build a placeholder object.
    pub fn stripped(class_id: u32, local_id: LocalId, properties: PropertyTree) -> Self {
        Self {
            stripped: true,
            ..Self::new(class_id, local_id, properties)
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self.class_id {
            CLASS_GAME_OBJECT => ObjectKind::PlainNode,
            CLASS_TRANSFORM | CLASS_RECT_TRANSFORM => ObjectKind::TransformEdge,
            CLASS_PREFAB_INSTANCE => ObjectKind::InstanceRef,
            _ if self.owning_node_id().is_some() => ObjectKind::Component,
            _ => ObjectKind::Other,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// `m_GameObject`: the node this transform or component belongs to.
    pub fn owning_node_id(&self) -> Option<LocalId> {
        non_null_ref(self.get("m_GameObject"))
    }

    /// `m_Father`: the parent transform of a transform edge.
    pub fn parent_pointer(&self) -> Option<LocalId> {
        non_null_ref(self.get("m_Father"))
    }

    /// `m_Children`: ordered child transforms of a transform edge.
    pub fn child_pointers(&self) -> Vec<LocalId> {
        ref_list(self.get("m_Children"))
    }

    /// `m_PrefabInstance` on a placeholder: the instance it stands in for.
    pub fn placeholder_of(&self) -> Option<LocalId> {
        if !self.stripped {
            return None;
        }
        non_null_ref(self.get("m_PrefabInstance"))
    }

    /// `m_CorrespondingSourceObject.fileID`: template identity of a placeholder.
    pub fn source_object(&self) -> Option<LocalId> {
        non_null_ref(self.get("m_CorrespondingSourceObject"))
    }

    /// `m_Script.guid`: distinguishes script-based components.
    pub fn script_identity(&self) -> Option<String> {
        self.get("m_Script")?
            .get("guid")?
            .as_str()
            .filter(|g| !g.is_empty())
            .map(str::to_string)
    }

    /// `m_Name`, if present and a string.
    pub fn name(&self) -> Option<&str> {
        self.get("m_Name")?.as_str()
    }
}

/// Collect the non-null `fileID`s of a list of references. Entries of the
/// form `{component: {fileID}}` are unwrapped.
pub fn ref_list(value: Option<&Value>) -> Vec<LocalId> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| ref_id(item).or_else(|| item.get("component").and_then(ref_id)))
        .filter(|id| *id != 0)
        .collect()
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DocumentData {
    objects: Vec<SceneObject>,
}

/// One parsed scene/prefab file as an arena of typed objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "DocumentData", into = "DocumentData")]
pub struct Document {
    objects: Vec<SceneObject>,
    index: HashMap<LocalId, usize>,
}

impl From<DocumentData> for Document {
    fn from(data: DocumentData) -> Self {
        Self::from_objects(data.objects)
    }
}

impl From<Document> for DocumentData {
    fn from(doc: Document) -> Self {
        Self {
            objects: doc.objects,
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.objects == other.objects
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_objects(objects: Vec<SceneObject>) -> Self {
        let mut doc = Self {
            objects,
            index: HashMap::new(),
        };
        doc.reindex();
        doc
    }

    pub fn from_json_str(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, obj) in self.objects.iter().enumerate() {
            if self.index.contains_key(&obj.local_id) {
                warn!(local_id = obj.local_id, "duplicate local id, keeping first");
                continue;
            }
            self.index.insert(obj.local_id, pos);
        }
    }

    /// Append an object. A duplicate ID stays shadowed by the first object.
    pub fn push(&mut self, object: SceneObject) {
        let pos = self.objects.len();
        if self.index.contains_key(&object.local_id) {
            warn!(local_id = object.local_id, "duplicate local id, keeping first");
        } else {
            self.index.insert(object.local_id, pos);
        }
        self.objects.push(object);
    }

    /// Remove the object indexed under `id` and return it. Shadowed
    /// duplicates of `id` stay shadowed.
    pub fn remove(&mut self, id: LocalId) -> Option<SceneObject> {
        let pos = self.index.remove(&id)?;
        let removed = self.objects.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Replace the object with the same ID, or append it if absent.
    pub fn upsert(&mut self, object: SceneObject) {
        match self.index.get(&object.local_id) {
            Some(&pos) => self.objects[pos] = object,
            None => self.push(object),
        }
    }

    pub fn get(&self, id: LocalId) -> Option<&SceneObject> {
        self.index.get(&id).map(|&pos| &self.objects[pos])
    }

    pub fn get_mut(&mut self, id: LocalId) -> Option<&mut SceneObject> {
        let pos = *self.index.get(&id)?;
        self.objects.get_mut(pos)
    }

    pub fn contains(&self, id: LocalId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Indexed IDs in ascending order.
    pub fn ids(&self) -> Vec<LocalId> {
        let mut ids: Vec<LocalId> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn max_local_id(&self) -> LocalId {
        self.index.keys().copied().max().unwrap_or(0)
    }

    /// Name of the node an object is, or is attached to.
    pub fn game_object_name(&self, id: LocalId) -> Option<&str> {
        let obj = self.get(id)?;
        if obj.class_id == CLASS_GAME_OBJECT {
            return obj.name();
        }
        self.get(obj.owning_node_id()?)?.name()
    }

    /// Objects bucketed by class name, ascending.
    pub fn class_histogram(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for obj in &self.objects {
            *counts.entry(obj.class_name.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> PropertyTree {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_kind_classification() {
        let go = SceneObject::new(1, 10, props(json!({"m_Name": "A"})));
        let tr = SceneObject::new(4, 11, props(json!({"m_GameObject": {"fileID": 10}})));
        let comp = SceneObject::new(212, 12, props(json!({"m_GameObject": {"fileID": 10}})));
        let asset = SceneObject::new(21, 13, props(json!({"m_Shader": {"fileID": 0}})));
        let inst = SceneObject::new(1001, 14, PropertyTree::new());

        assert_eq!(go.kind(), ObjectKind::PlainNode);
        assert_eq!(tr.kind(), ObjectKind::TransformEdge);
        assert_eq!(comp.kind(), ObjectKind::Component);
        assert_eq!(asset.kind(), ObjectKind::Other);
        assert_eq!(inst.kind(), ObjectKind::InstanceRef);
        assert_eq!(asset.class_name, "Unknown(21)");
    }

    #[test]
    fn test_accessors() {
        let tr = SceneObject::stripped(
            4,
            5,
            props(json!({
                "m_PrefabInstance": {"fileID": 9},
                "m_CorrespondingSourceObject": {"fileID": 400, "guid": "abc"},
                "m_Father": {"fileID": 0},
                "m_Children": [{"fileID": 7}, {"fileID": 0}, {"fileID": 8}],
            })),
        );
        assert_eq!(tr.placeholder_of(), Some(9));
        assert_eq!(tr.source_object(), Some(400));
        assert_eq!(tr.parent_pointer(), None);
        assert_eq!(tr.child_pointers(), vec![7, 8]);
    }

    #[test]
    fn test_script_identity() {
        let mono = SceneObject::new(
            114,
            3,
            props(json!({"m_Script": {"fileID": 11500000, "guid": "g1", "type": 3}})),
        );
        assert_eq!(mono.script_identity().as_deref(), Some("g1"));
    }

    #[test]
    fn test_remap_refs_only_touches_pure_refs() {
        let remap = HashMap::from([(1, 100), (2, 200)]);
        let value = json!({
            "a": {"fileID": 1},
            "b": [{"fileID": 2}, {"fileID": 3}],
            "target": {"fileID": 1, "guid": "x"},
        });
        let out = remap_refs(&value, &remap);
        assert_eq!(out["a"], json!({"fileID": 100}));
        assert_eq!(out["b"], json!([{"fileID": 200}, {"fileID": 3}]));
        assert_eq!(out["target"], json!({"fileID": 1, "guid": "x"}));
    }

    #[test]
    fn test_remove_keeps_duplicates_shadowed() {
        let mut doc = Document::from_objects(vec![
            SceneObject::new(1, 5, props(json!({"m_Name": "first"}))),
            SceneObject::new(1, 5, props(json!({"m_Name": "second"}))),
            SceneObject::new(4, 6, PropertyTree::new()),
        ]);
        assert_eq!(doc.get(5).unwrap().name(), Some("first"));

        let removed = doc.remove(5).unwrap();
        assert_eq!(removed.name(), Some("first"));
        assert!(doc.get(5).is_none());
        assert!(!doc.contains(5));
        assert_eq!(doc.get(6).unwrap().class_id, 4);
        assert_eq!(doc.ids(), vec![6]);
        assert!(doc.remove(5).is_none());
    }

    #[test]
    fn test_arena_operations() {
        let mut doc = Document::new();
        doc.push(SceneObject::new(1, 10, PropertyTree::new()));
        doc.push(SceneObject::new(4, 20, PropertyTree::new()));
        doc.push(SceneObject::new(114, 30, PropertyTree::new()));
        assert_eq!(doc.ids(), vec![10, 20, 30]);
        assert_eq!(doc.max_local_id(), 30);

        let removed = doc.remove(20).unwrap();
        assert_eq!(removed.class_id, 4);
        assert!(doc.get(30).is_some());
        assert!(!doc.contains(20));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_game_object_name() {
        let doc = Document::from_objects(vec![
            SceneObject::new(1, 10, props(json!({"m_Name": "Player"}))),
            SceneObject::new(54, 11, props(json!({"m_GameObject": {"fileID": 10}}))),
            SceneObject::new(21, 12, PropertyTree::new()),
        ]);
        assert_eq!(doc.game_object_name(10), Some("Player"));
        assert_eq!(doc.game_object_name(11), Some("Player"));
        assert_eq!(doc.game_object_name(12), None);
    }

    #[test]
    fn test_duplicate_id_first_seen_wins() {
        let doc = Document::from_objects(vec![
            SceneObject::new(1, 10, props(json!({"m_Name": "first"}))),
            SceneObject::new(1, 10, props(json!({"m_Name": "second"}))),
        ]);
        assert_eq!(doc.get(10).and_then(SceneObject::name), Some("first"));
    }

    #[test]
    fn test_json_roundtrip_rebuilds_index() {
        let doc = Document::from_objects(vec![SceneObject::new(
            1,
            10,
            props(json!({"m_Name": "Root"})),
        )]);
        let json = doc.to_json_string().unwrap();
        let back = Document::from_json_str(&json).unwrap();
        assert_eq!(back.get(10).and_then(SceneObject::name), Some("Root"));
        assert_eq!(back, doc);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let result = Document::from_json_str("{not json");
        assert!(matches!(result, Err(DocumentError::Json(_))));
    }
}
