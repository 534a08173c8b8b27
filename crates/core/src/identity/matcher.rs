//! Match-key registration and cross-document pairing.
//!
//! [`MatchMap`] assigns every object reached by a hierarchy walk a
//! [`MatchKey`]. [`DocumentPairing`] lines up two documents through their
//! match maps, falling back to raw local IDs for whatever the walk missed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::DiffContext;
use crate::document::{Document, LocalId};
use crate::hierarchy::{Hierarchy, NodeId};

use super::match_key::{MatchKey, INSTANCE_TAG, NODE_TAG};

// ---------------------------------------------------------------------------
// MatchMap
// ---------------------------------------------------------------------------

/// Bijection between match keys and local IDs of one document.
#[derive(Debug, Clone, Default)]
pub struct MatchMap {
    forward: BTreeMap<MatchKey, LocalId>,
    reverse: BTreeMap<LocalId, MatchKey>,
}

impl MatchMap {
    /// Walk `hierarchy` depth-first and register every node, transform,
    /// component and placeholder.
    pub fn build(hierarchy: &Hierarchy, doc: &Document) -> Self {
        let mut map = Self::default();
        let mut paths: HashMap<NodeId, String> = HashMap::new();

        for node_id in hierarchy.iter_all() {
            let node = hierarchy.node(node_id);
            let name = hierarchy.disambiguated_name(node_id);
            let path = match node.parent.and_then(|p| paths.get(&p)) {
                Some(parent_path) => format!("{parent_path}/{name}"),
                None => name,
            };

            let node_tag = if node.is_instance() {
                INSTANCE_TAG
            } else {
                NODE_TAG
            };
            map.register(MatchKey::node(&path, node_tag), node.local_id);

            if let Some(transform) = node.transform_id.and_then(|t| doc.get(t)) {
                map.register(
                    MatchKey::node(&path, transform.class_name.as_str()),
                    transform.local_id,
                );
            }

            let mut counts: HashMap<(String, String), usize> = HashMap::new();
            let mut next_index = |tag: &str, script: &str| {
                let slot = counts.entry((tag.to_string(), script.to_string())).or_insert(0);
                let index = *slot;
                *slot += 1;
                index
            };

            for comp in &node.components {
                let script = comp.script_identity.clone().unwrap_or_default();
                let index = next_index(&comp.class_name, &script);
                map.register(
                    MatchKey::new(&path, comp.class_name.as_str(), script, index),
                    comp.local_id,
                );
            }

            if node.is_instance() {
                for &placeholder in hierarchy.placeholders_for_instance(node.local_id) {
                    if Some(placeholder) == node.transform_id {
                        continue;
                    }
                    let Some(obj) = doc.get(placeholder) else {
                        continue;
                    };
                    let script = obj
                        .source_object()
                        .map(|src| format!("source:{src}"))
                        .unwrap_or_else(|| "source:".to_string());
                    let index = next_index(&obj.class_name, &script);
                    map.register(
                        MatchKey::new(&path, obj.class_name.as_str(), script, index),
                        placeholder,
                    );
                }
            }

            paths.insert(node_id, path);
        }

        debug!(keys = map.len(), "built match map");
        map
    }

    fn register(&mut self, key: MatchKey, local_id: LocalId) {
        if self.forward.contains_key(&key) || self.reverse.contains_key(&local_id) {
            warn!(key = %key, local_id, "ambiguous match key, keeping first");
            return;
        }
        self.reverse.insert(local_id, key.clone());
        self.forward.insert(key, local_id);
    }

    pub fn get(&self, key: &MatchKey) -> Option<LocalId> {
        self.forward.get(key).copied()
    }

    pub fn key_of(&self, local_id: LocalId) -> Option<&MatchKey> {
        self.reverse.get(&local_id)
    }

    pub fn contains_key(&self, key: &MatchKey) -> bool {
        self.forward.contains_key(key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&MatchKey, LocalId)> {
        self.forward.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Objects of `doc` the walk never reached, ascending.
    pub fn unmapped(&self, doc: &Document) -> Vec<LocalId> {
        doc.ids()
            .into_iter()
            .filter(|id| !self.reverse.contains_key(id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// How a pair of objects was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchVia {
    /// Same match key on both sides.
    Key,
    /// Keyed on both sides under different keys, same raw ID.
    RawId,
    /// Unreached by either walk, same raw ID.
    Orphan,
}

/// Two objects describing the same thing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub left: LocalId,
    pub right: LocalId,
    pub via: MatchVia,
    /// Hierarchy path used for presentation.
    pub hierarchy_path: Option<String>,
}

/// An object present on one side only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpairedObject {
    pub local_id: LocalId,
    pub key: Option<MatchKey>,
}

impl UnpairedObject {
    pub fn hierarchy_path(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.path.as_str())
    }
}

/// Object correspondence between a left and a right document.
#[derive(Debug, Clone, Default)]
pub struct DocumentPairing {
    pub matched: Vec<MatchedPair>,
    /// Left objects without a counterpart.
    pub removed: Vec<UnpairedObject>,
    /// Right objects without a counterpart.
    pub added: Vec<UnpairedObject>,
    /// Left ID -> right ID for every matched pair.
    pub remap: HashMap<LocalId, LocalId>,
}

impl DocumentPairing {
    /// Build both hierarchies and match maps, then pair.
    pub fn compute(left: &Document, right: &Document, ctx: &DiffContext) -> Self {
        let left_map = MatchMap::build(&Hierarchy::build_with(left, ctx), left);
        let right_map = MatchMap::build(&Hierarchy::build_with(right, ctx), right);
        Self::from_maps(left, &left_map, right, &right_map, ctx)
    }

    /// Pair two documents whose match maps are already built.
    pub fn from_maps(
        left: &Document,
        left_map: &MatchMap,
        right: &Document,
        right_map: &MatchMap,
        ctx: &DiffContext,
    ) -> Self {
        let mut pairing = Self::default();

        let mut left_unmatched: BTreeMap<LocalId, &MatchKey> = BTreeMap::new();
        for (key, left_id) in left_map.iter() {
            match right_map.get(key) {
                Some(right_id) => pairing.push_pair(left_id, right_id, MatchVia::Key, Some(key.path.as_str())),
                None => {
                    left_unmatched.insert(left_id, key);
                }
            }
        }
        let mut right_unmatched: BTreeMap<LocalId, &MatchKey> = right_map
            .iter()
            .filter(|(key, _)| !left_map.contains_key(key))
            .map(|(key, id)| (id, key))
            .collect();

        if ctx.orphan_fallback {
            let common: Vec<LocalId> = left_unmatched
                .keys()
                .copied()
                .filter(|id| right_unmatched.contains_key(id) && same_class(left, right, *id))
                .collect();
            for id in common {
                left_unmatched.remove(&id);
                if let Some(key) = right_unmatched.remove(&id) {
                    pairing.push_pair(id, id, MatchVia::RawId, Some(key.path.as_str()));
                }
            }
        }

        for (id, key) in left_unmatched {
            pairing.removed.push(UnpairedObject {
                local_id: id,
                key: Some(key.clone()),
            });
        }
        for (id, key) in right_unmatched {
            pairing.added.push(UnpairedObject {
                local_id: id,
                key: Some(key.clone()),
            });
        }

        let left_orphans: BTreeSet<LocalId> = left_map.unmapped(left).into_iter().collect();
        let right_orphans: BTreeSet<LocalId> = right_map.unmapped(right).into_iter().collect();
        for &id in &left_orphans {
            if ctx.orphan_fallback && right_orphans.contains(&id) && same_class(left, right, id) {
                pairing.push_pair(id, id, MatchVia::Orphan, None);
            } else {
                pairing.removed.push(UnpairedObject { local_id: id, key: None });
            }
        }
        for &id in &right_orphans {
            if !pairing.is_paired_right(id) {
                pairing.added.push(UnpairedObject { local_id: id, key: None });
            }
        }

        pairing.matched.sort_by_key(|p| (p.right, p.left));
        pairing.removed.sort_by_key(|o| o.local_id);
        pairing.added.sort_by_key(|o| o.local_id);

        info!(
            matched = pairing.matched.len(),
            removed = pairing.removed.len(),
            added = pairing.added.len(),
            "paired documents"
        );
        pairing
    }

    fn push_pair(&mut self, left: LocalId, right: LocalId, via: MatchVia, path: Option<&str>) {
        self.remap.insert(left, right);
        self.matched.push(MatchedPair {
            left,
            right,
            via,
            hierarchy_path: path.map(str::to_string),
        });
    }

    fn is_paired_right(&self, right: LocalId) -> bool {
        self.matched.iter().any(|p| p.right == right)
    }

    pub fn right_for(&self, left: LocalId) -> Option<LocalId> {
        self.remap.get(&left).copied()
    }

    pub fn left_for(&self, right: LocalId) -> Option<LocalId> {
        self.matched.iter().find(|p| p.right == right).map(|p| p.left)
    }

    /// Right ID -> left ID.
    pub fn inverse_remap(&self) -> HashMap<LocalId, LocalId> {
        self.remap.iter().map(|(l, r)| (*r, *l)).collect()
    }
}

fn same_class(left: &Document, right: &Document, id: LocalId) -> bool {
    match (left.get(id), right.get(id)) {
        (Some(l), Some(r)) => l.class_id == r.class_id,
        _ => false,
    }
}
