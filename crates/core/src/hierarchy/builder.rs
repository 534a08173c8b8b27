//! Reconstruction of the logical tree from a flat document.
//!
//! Four passes over hash-map indices: index, node, component attach, link.
//! Edges are resolved by ID lookup only after every node exists, so malformed
//! pointers can at worst leave a node parentless.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::DiffContext;
use crate::document::{
    non_null_ref, ref_id, ref_list, Document, LocalId, ObjectKind, SceneObject,
    CLASS_RECT_TRANSFORM,
};

use super::tree::{
    ComponentRef, Hierarchy, InstanceSource, NodeId, NodeKind, OverrideRecord, TreeNode,
};

impl Hierarchy {
    /// Build with an empty context.
    pub fn build(doc: &Document) -> Self {
        Self::build_with(doc, &DiffContext::default())
    }

    /// Build the hierarchy of `doc`. Never fails; malformed objects are
    /// skipped.
    pub fn build_with(doc: &Document, ctx: &DiffContext) -> Self {
        let mut builder = HierarchyBuilder::new(doc, ctx);
        builder.index_pass();
        builder.node_pass();
        builder.attach_pass();
        builder.link_pass();
        let hierarchy = builder.finish();
        info!(
            objects = doc.len(),
            nodes = hierarchy.len(),
            roots = hierarchy.roots().len(),
            "built hierarchy"
        );
        hierarchy
    }
}

struct HierarchyBuilder<'a> {
    doc: &'a Document,
    ctx: &'a DiffContext,
    plain_nodes: Vec<LocalId>,
    instances: Vec<LocalId>,
    components: Vec<LocalId>,
    /// Node -> its (first) transform edge.
    transform_of_node: HashMap<LocalId, LocalId>,
    /// Non-stripped transform -> parent transform.
    transform_parent: HashMap<LocalId, Option<LocalId>>,
    placeholder_transforms: HashSet<LocalId>,
    placeholder_nodes: HashSet<LocalId>,
    hierarchy: Hierarchy,
}

impl<'a> HierarchyBuilder<'a> {
    fn new(doc: &'a Document, ctx: &'a DiffContext) -> Self {
        Self {
            doc,
            ctx,
            plain_nodes: Vec::new(),
            instances: Vec::new(),
            components: Vec::new(),
            transform_of_node: HashMap::new(),
            transform_parent: HashMap::new(),
            placeholder_transforms: HashSet::new(),
            placeholder_nodes: HashSet::new(),
            hierarchy: Hierarchy::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Pass 1: index
    // -----------------------------------------------------------------------

    fn index_pass(&mut self) {
        for obj in self.doc.iter() {
            // Only the indexed object of a duplicated ID takes part.
            if !self
                .doc
                .get(obj.local_id)
                .is_some_and(|indexed| std::ptr::eq(indexed, obj))
            {
                continue;
            }
            if obj.stripped {
                self.index_placeholder(obj);
                continue;
            }
            match obj.kind() {
                ObjectKind::PlainNode => self.plain_nodes.push(obj.local_id),
                ObjectKind::InstanceRef => self.instances.push(obj.local_id),
                ObjectKind::Component => self.components.push(obj.local_id),
                ObjectKind::TransformEdge => match obj.owning_node_id() {
                    Some(node) => {
                        self.transform_of_node.entry(node).or_insert(obj.local_id);
                        self.transform_parent
                            .insert(obj.local_id, obj.parent_pointer());
                    }
                    None => {
                        debug!(local_id = obj.local_id, "transform without owning node, skipped");
                    }
                },
                ObjectKind::Other => {}
            }
        }
    }

    fn index_placeholder(&mut self, obj: &SceneObject) {
        let instance = obj.placeholder_of().filter(|inst| {
            self.doc
                .get(*inst)
                .is_some_and(|o| o.kind() == ObjectKind::InstanceRef)
        });
        let Some(instance) = instance else {
            debug!(local_id = obj.local_id, "placeholder without a live instance, dropped");
            return;
        };
        self.hierarchy.placeholder_of.insert(obj.local_id, instance);
        self.hierarchy
            .instance_placeholders
            .entry(instance)
            .or_default()
            .push(obj.local_id);
        match obj.kind() {
            ObjectKind::TransformEdge => {
                self.placeholder_transforms.insert(obj.local_id);
            }
            ObjectKind::PlainNode => {
                self.placeholder_nodes.insert(obj.local_id);
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Pass 2: nodes
    // -----------------------------------------------------------------------

    fn node_pass(&mut self) {
        for &id in &self.plain_nodes {
            let Some(obj) = self.doc.get(id) else {
                continue;
            };
            let transform_id = self.transform_of_node.get(&id).copied();
            let node = TreeNode {
                local_id: id,
                name: obj.name().unwrap_or_default().to_string(),
                transform_id,
                is_ui: self.is_rect_transform(transform_id),
                kind: NodeKind::Plain,
                components: Vec::new(),
                parent: None,
                children: Vec::new(),
            };
            push_node(&mut self.hierarchy, node);
        }

        for &id in &self.instances {
            let Some(obj) = self.doc.get(id) else {
                continue;
            };
            let source = instance_source(obj);
            let overrides = overrides_of(obj);
            let name = overrides
                .iter()
                .find(|o| o.property_path == "m_Name")
                .and_then(OverrideRecord::value_text)
                .unwrap_or_else(|| match &source {
                    Some(src) if !src.guid.is_empty() => format!("PrefabInstance({})", src.guid),
                    _ => format!("PrefabInstance_{id}"),
                });
            let transform_id = self
                .hierarchy
                .placeholders_for_instance(id)
                .iter()
                .copied()
                .find(|p| self.placeholder_transforms.contains(p) && self.is_root_placeholder(*p, obj));
            let node = TreeNode {
                local_id: id,
                name,
                transform_id,
                is_ui: self.is_rect_transform(transform_id),
                kind: NodeKind::Instance {
                    source: source.unwrap_or_default(),
                    overrides,
                },
                components: Vec::new(),
                parent: None,
                children: Vec::new(),
            };
            push_node(&mut self.hierarchy, node);
        }
    }

    /// The boundary transform of an instance is the placeholder transform
    /// that has no placeholder parent inside the same instance.
    fn is_root_placeholder(&self, placeholder: LocalId, instance: &SceneObject) -> bool {
        let Some(obj) = self.doc.get(placeholder) else {
            return false;
        };
        match obj.parent_pointer() {
            None => true,
            Some(parent) => {
                self.hierarchy.placeholder_of.get(&parent) != Some(&instance.local_id)
            }
        }
    }

    fn is_rect_transform(&self, transform: Option<LocalId>) -> bool {
        transform
            .and_then(|t| self.doc.get(t))
            .is_some_and(|t| t.class_id == CLASS_RECT_TRANSFORM)
    }

    // -----------------------------------------------------------------------
    // Pass 3: components
    // -----------------------------------------------------------------------

    fn attach_pass(&mut self) {
        let mut by_owner: HashMap<LocalId, Vec<LocalId>> = HashMap::new();
        for &id in &self.components {
            if let Some(owner) = self.doc.get(id).and_then(SceneObject::owning_node_id) {
                by_owner.entry(owner).or_default().push(id);
            }
        }

        for node_index in 0..self.hierarchy.nodes.len() {
            let node_id = NodeId(node_index);
            let local_id = self.hierarchy.nodes[node_index].local_id;
            let mut attached: Vec<(LocalId, bool)> = Vec::new();

            if self.hierarchy.nodes[node_index].is_instance() {
                for placeholder in self.hierarchy.placeholders_for_instance(local_id) {
                    if !self.placeholder_nodes.contains(placeholder) {
                        continue;
                    }
                    for &comp in by_owner.get(placeholder).into_iter().flatten() {
                        attached.push((comp, true));
                    }
                }
            } else {
                let owned = by_owner.get(&local_id).map(Vec::as_slice).unwrap_or(&[]);
                let listed: Vec<LocalId> = self
                    .doc
                    .get(local_id)
                    .map(|obj| ref_list(obj.get("m_Component")))
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|c| owned.contains(c))
                    .collect();
                let mut seen = HashSet::new();
                for comp in listed.iter().chain(owned.iter()) {
                    if seen.insert(*comp) {
                        attached.push((*comp, false));
                    }
                }
            }

            let components: Vec<ComponentRef> = attached
                .into_iter()
                .filter_map(|(comp, on_instanced_node)| {
                    let obj = self.doc.get(comp)?;
                    let script_identity = obj.script_identity();
                    let script_name = script_identity
                        .as_deref()
                        .and_then(|guid| self.ctx.script_name(guid))
                        .map(str::to_string);
                    Some(ComponentRef {
                        owner: node_id,
                        local_id: comp,
                        class_id: obj.class_id,
                        class_name: obj.class_name.clone(),
                        script_identity,
                        script_name,
                        on_instanced_node,
                    })
                })
                .collect();

            for comp in &components {
                self.hierarchy.component_owner.insert(comp.local_id, node_id);
            }
            self.hierarchy.nodes[node_index].components = components;
        }
    }

    // -----------------------------------------------------------------------
    // Pass 4: links
    // -----------------------------------------------------------------------

    fn link_pass(&mut self) {
        let count = self.hierarchy.nodes.len();
        let mut parents: Vec<Option<NodeId>> = vec![None; count];

        for (index, parent_slot) in parents.iter_mut().enumerate() {
            let node = &self.hierarchy.nodes[index];
            let parent_transform = match &node.kind {
                NodeKind::Plain => node
                    .transform_id
                    .and_then(|t| self.transform_parent.get(&t).copied().flatten()),
                NodeKind::Instance { .. } => self
                    .doc
                    .get(node.local_id)
                    .and_then(|obj| obj.get("m_Modification"))
                    .and_then(|m| non_null_ref(m.get("m_TransformParent"))),
            };
            let parent = parent_transform.and_then(|t| self.node_for_transform(t));
            *parent_slot = match parent {
                Some(p) if p.0 == index => {
                    warn!(local_id = node.local_id, "node is its own parent, treated as root");
                    None
                }
                other => other,
            };
        }

        break_cycles(&mut parents, &self.hierarchy.nodes);

        let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); count];
        for (index, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[p.0].push(NodeId(index)),
                None => self.hierarchy.roots.push(NodeId(index)),
            }
        }

        for (index, kids) in children.iter_mut().enumerate() {
            let order = self.hierarchy.nodes[index]
                .transform_id
                .and_then(|t| self.doc.get(t))
                .map(SceneObject::child_pointers)
                .unwrap_or_default();
            if !order.is_empty() {
                let nodes = &self.hierarchy.nodes;
                kids.sort_by_key(|kid| {
                    nodes[kid.0]
                        .transform_id
                        .and_then(|t| order.iter().position(|c| *c == t))
                        .unwrap_or(usize::MAX)
                });
            }
        }

        for (index, node) in self.hierarchy.nodes.iter_mut().enumerate() {
            node.parent = parents[index];
            node.children = std::mem::take(&mut children[index]);
        }
    }

    /// Node owning a transform: a plain node's own edge, or the instance
    /// behind a placeholder transform.
    fn node_for_transform(&self, transform: LocalId) -> Option<NodeId> {
        self.hierarchy.by_transform.get(&transform).copied().or_else(|| {
            self.hierarchy
                .placeholder_of
                .get(&transform)
                .and_then(|inst| self.hierarchy.by_local_id.get(inst).copied())
        })
    }

    fn finish(self) -> Hierarchy {
        self.hierarchy
    }
}

fn push_node(hierarchy: &mut Hierarchy, node: TreeNode) {
    let id = NodeId(hierarchy.nodes.len());
    hierarchy.by_local_id.insert(node.local_id, id);
    if let Some(t) = node.transform_id {
        hierarchy.by_transform.entry(t).or_insert(id);
    }
    hierarchy.nodes.push(node);
}

/// Cut the parent edge of the first node found on each cycle.
fn break_cycles(parents: &mut [Option<NodeId>], nodes: &[TreeNode]) {
    for start in 0..parents.len() {
        let mut seen = HashSet::from([start]);
        let mut current = parents[start];
        while let Some(next) = current {
            if next.0 == start {
                warn!(local_id = nodes[start].local_id, "parent cycle, treated as root");
                parents[start] = None;
                break;
            }
            if !seen.insert(next.0) {
                break;
            }
            current = parents[next.0];
        }
    }
}

fn instance_source(obj: &SceneObject) -> Option<InstanceSource> {
    let source = obj.get("m_SourcePrefab")?;
    Some(InstanceSource {
        guid: source
            .get("guid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        file_id: ref_id(source).unwrap_or(0),
    })
}

fn overrides_of(obj: &SceneObject) -> Vec<OverrideRecord> {
    obj.get("m_Modification")
        .and_then(|m| m.get("m_Modifications"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(OverrideRecord::from_value).collect())
        .unwrap_or_default()
}
