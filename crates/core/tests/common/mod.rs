//! Shared document builders for integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};

use scenemerge_core::document::{LocalId, PropertyTree, SceneObject};
use scenemerge_core::Document;

pub const GAME_OBJECT: u32 = 1;
pub const TRANSFORM: u32 = 4;
pub const MONO_BEHAVIOUR: u32 = 114;
pub const PREFAB_INSTANCE: u32 = 1001;

pub fn props(value: Value) -> PropertyTree {
    value.as_object().cloned().unwrap_or_default()
}

/// Builds scene documents out of nodes and components. Every ID passed in
/// is shifted by the builder's offset, so the same layout can be produced
/// under a different numbering.
pub struct SceneBuilder {
    offset: LocalId,
    objects: Vec<SceneObject>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    pub fn with_offset(offset: LocalId) -> Self {
        Self {
            offset,
            objects: Vec::new(),
        }
    }

    fn id(&self, id: LocalId) -> LocalId {
        if id == 0 {
            0
        } else {
            id + self.offset
        }
    }

    fn find_mut(&mut self, id: LocalId) -> &mut SceneObject {
        self.objects
            .iter_mut()
            .find(|o| o.local_id == id)
            .unwrap_or_else(|| panic!("no object {id}"))
    }

    /// Add a node `go` with transform `tr` at local position `x`, under the
    /// node whose transform is `parent_tr`.
    pub fn node(mut self, go: LocalId, tr: LocalId, name: &str, parent_tr: Option<LocalId>, x: f64) -> Self {
        let (go, tr) = (self.id(go), self.id(tr));
        let father = parent_tr.map(|p| self.id(p)).unwrap_or(0);
        self.objects.push(SceneObject::new(
            GAME_OBJECT,
            go,
            props(json!({
                "m_Name": name,
                "m_IsActive": 1,
                "m_Component": [{"component": {"fileID": tr}}],
            })),
        ));
        self.objects.push(SceneObject::new(
            TRANSFORM,
            tr,
            props(json!({
                "m_GameObject": {"fileID": go},
                "m_LocalPosition": {"x": x, "y": 0.0, "z": 0.0},
                "m_Children": [],
                "m_Father": {"fileID": father},
            })),
        ));
        if father != 0 {
            if let Some(Value::Array(children)) = self.find_mut(father).properties.get_mut("m_Children") {
                children.push(json!({"fileID": tr}));
            }
        }
        self
    }

    /// Attach a component of `class_id` to node `go`.
    pub fn component(mut self, class_id: u32, id: LocalId, go: LocalId, fields: Value) -> Self {
        let (id, go) = (self.id(id), self.id(go));
        let mut properties = props(json!({"m_GameObject": {"fileID": go}}));
        properties.extend(props(fields));
        self.objects.push(SceneObject::new(class_id, id, properties));
        if let Some(Value::Array(list)) = self.find_mut(go).properties.get_mut("m_Component") {
            list.push(json!({"component": {"fileID": id}}));
        }
        self
    }

    /// Attach a script component identified by `guid`.
    pub fn script(self, id: LocalId, go: LocalId, guid: &str, fields: Value) -> Self {
        let mut all = props(json!({"m_Script": {"fileID": 11500000, "guid": guid, "type": 3}}));
        all.extend(props(fields));
        self.component(MONO_BEHAVIOUR, id, go, Value::Object(all))
    }

    /// Reverse every transform's child list.
    pub fn reversed_children(mut self) -> Self {
        for obj in &mut self.objects {
            if let Some(Value::Array(children)) = obj.properties.get_mut("m_Children") {
                children.reverse();
            }
        }
        self
    }

    pub fn build(self) -> Document {
        Document::from_objects(self.objects)
    }
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Set a top-level property on an object of `doc`.
pub fn set(doc: &mut Document, id: LocalId, key: &str, value: Value) {
    let obj = doc.get_mut(id).unwrap_or_else(|| panic!("no object {id}"));
    obj.properties.insert(key.to_string(), value);
}

/// Read a top-level property of an object of `doc`.
pub fn get(doc: &Document, id: LocalId, key: &str) -> Value {
    doc.get(id)
        .and_then(|o| o.properties.get(key))
        .cloned()
        .unwrap_or(Value::Null)
}
