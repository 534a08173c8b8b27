//! Three-way merge engine.
//!
//! Both sides are paired against the base by identity and their content is
//! renumbered into the base ID space before anything is compared. The merged
//! document therefore lives in base IDs; objects added by a side keep their
//! own ID unless it is already taken.
//!
//! Property trees merge at the differ's granularity: maps by key, reference
//! lists as sets, override lists by `(target, propertyPath)`, other lists by
//! index. Where both sides changed the same value differently, the merged
//! document keeps the base value and a [`Conflict`] is emitted.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::context::DiffContext;
use crate::diff::property::{is_ignored, list_shape, override_map, ref_set, ListShape};
use crate::diff::{compare_trees, Change, ChangeKind, ObjectChange, PropertyPath};
use crate::document::{ref_id, remap_tree, Document, LocalId, PropertyTree, SceneObject};
use crate::errors::ConflictError;
use crate::hierarchy::Hierarchy;
use crate::identity::{DocumentPairing, MatchKey, MatchMap, UnpairedObject};

use super::detector::{
    classify_object, Conflict, ConflictKind, ConflictScope, ConflictStatus, ObjectDelta,
    ObjectOutcome,
};
use super::resolver::{apply_resolution, Resolution};

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// The result of a three-way merge.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Merged document. Conflicting values hold the base value.
    pub merged: Document,
    /// Property changes applied relative to base.
    pub auto_merged: Vec<Change>,
    /// Objects added or removed relative to base.
    pub auto_merged_objects: Vec<ObjectChange>,
    /// Unresolved conflicts (detected or deferred).
    pub conflicts: Vec<Conflict>,
    /// Conflicts whose resolution has been applied.
    pub resolved: Vec<Conflict>,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Look a conflict up by ID, pending or resolved.
    pub fn conflict(&self, id: &str) -> Option<&Conflict> {
        self.conflicts
            .iter()
            .chain(self.resolved.iter())
            .find(|c| c.id == id)
    }

    /// Apply `resolution` to the conflict `id` and move it to `resolved`.
    ///
    /// Re-applying the resolution a conflict was resolved with is a no-op.
    /// `Deferred` leaves the conflict pending.
    pub fn apply_resolution(&mut self, id: &str, resolution: Resolution) -> Result<(), ConflictError> {
        if let Some(done) = self.resolved.iter().find(|c| c.id == id) {
            if done.resolution.as_ref() == Some(&resolution) {
                debug!(conflict_id = id, "resolution already applied");
                return Ok(());
            }
            return Err(ConflictError::AlreadyResolved(id.to_string()));
        }
        let pos = self
            .conflicts
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ConflictError::NotFound(id.to_string()))?;

        if resolution == Resolution::Deferred {
            let conflict = &mut self.conflicts[pos];
            conflict.status = ConflictStatus::Deferred;
            conflict.resolution = Some(Resolution::Deferred);
            info!(conflict_id = id, "conflict deferred");
            return Ok(());
        }

        apply_resolution(&mut self.merged, &self.conflicts[pos], &resolution)?;
        let mut conflict = self.conflicts.remove(pos);
        conflict.status = ConflictStatus::Resolved;
        conflict.resolution = Some(resolution);
        conflict.resolved_at = Some(chrono::Utc::now());
        info!(conflict_id = id, path = %conflict.display_path(), "conflict resolved");
        self.resolved.push(conflict);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Stateless three-way merge engine.
pub struct Merger;

impl Merger {
    /// Merge `ours` and `theirs`, both derived from `base`. Never fails;
    /// malformed objects degrade to whole-object adds and removes.
    pub fn three_way_merge(
        base: &Document,
        ours: &Document,
        theirs: &Document,
        ctx: &DiffContext,
    ) -> MergeResult {
        info!(
            base = base.len(),
            ours = ours.len(),
            theirs = theirs.len(),
            "performing three-way merge"
        );

        let base_map = MatchMap::build(&Hierarchy::build_with(base, ctx), base);
        let ours_map = MatchMap::build(&Hierarchy::build_with(ours, ctx), ours);
        let theirs_map = MatchMap::build(&Hierarchy::build_with(theirs, ctx), theirs);
        let ours_pairing = DocumentPairing::from_maps(base, &base_map, ours, &ours_map, ctx);
        let theirs_pairing = DocumentPairing::from_maps(base, &base_map, theirs, &theirs_map, ctx);

        let mut run = MergeRun {
            ctx,
            base,
            base_map: &base_map,
            ours: Side::new(ours, &ours_pairing),
            theirs: Side::new(theirs, &theirs_pairing),
            result: MergeResult::default(),
        };
        run.assign_added_ids();
        run.merge_base_objects();
        run.merge_added_objects();

        let result = run.result;
        info!(
            auto_merged = result.auto_merged.len(),
            objects = result.auto_merged_objects.len(),
            conflicts = result.conflicts.len(),
            "three-way merge complete"
        );
        result
    }

    /// Quick check: can these three versions be merged without conflicts?
    pub fn can_auto_merge(
        base: &Document,
        ours: &Document,
        theirs: &Document,
        ctx: &DiffContext,
    ) -> bool {
        !Self::three_way_merge(base, ours, theirs, ctx).has_conflicts()
    }
}

/// One derived document and its relation to base.
struct Side<'a> {
    doc: &'a Document,
    pairing: &'a DocumentPairing,
    /// Side ID -> merged ID.
    to_merged: HashMap<LocalId, LocalId>,
    /// Base ID -> side ID.
    from_base: HashMap<LocalId, LocalId>,
}

impl<'a> Side<'a> {
    fn new(doc: &'a Document, pairing: &'a DocumentPairing) -> Self {
        Self {
            doc,
            pairing,
            to_merged: pairing.inverse_remap(),
            from_base: pairing.remap.clone(),
        }
    }

    /// Side object with its content renumbered into merged IDs.
    fn renumbered(&self, side_id: LocalId, merged_id: LocalId) -> Option<SceneObject> {
        let obj = self.doc.get(side_id)?;
        Some(SceneObject {
            local_id: merged_id,
            properties: remap_tree(&obj.properties, &self.to_merged),
            ..obj.clone()
        })
    }
}

struct MergeRun<'a> {
    ctx: &'a DiffContext,
    base: &'a Document,
    base_map: &'a MatchMap,
    ours: Side<'a>,
    theirs: Side<'a>,
    result: MergeResult,
}

impl<'a> MergeRun<'a> {
    // -----------------------------------------------------------------------
    // ID assignment
    // -----------------------------------------------------------------------

    /// Give every added object a merged ID. Objects both sides added under
    /// the same match key share one.
    fn assign_added_ids(&mut self) {
        let mut used: HashSet<LocalId> = self.base.ids().into_iter().collect();
        let mut next = self
            .base
            .max_local_id()
            .max(self.ours.doc.max_local_id())
            .max(self.theirs.doc.max_local_id())
            + 1;
        let mut allocate = |wanted: LocalId, used: &mut HashSet<LocalId>| {
            let id = if used.contains(&wanted) {
                let fresh = next;
                next += 1;
                debug!(wanted, fresh, "added object id collides, renumbering");
                fresh
            } else {
                wanted
            };
            used.insert(id);
            id
        };

        let mut by_key: BTreeMap<MatchKey, LocalId> = BTreeMap::new();
        for added in &self.ours.pairing.added {
            let merged = allocate(added.local_id, &mut used);
            self.ours.to_merged.insert(added.local_id, merged);
            if let Some(key) = &added.key {
                by_key.insert(key.clone(), merged);
            }
        }
        for added in &self.theirs.pairing.added {
            let shared = added.key.as_ref().and_then(|k| by_key.get(k)).copied();
            let merged = match shared {
                Some(id) => id,
                None => allocate(added.local_id, &mut used),
            };
            self.theirs.to_merged.insert(added.local_id, merged);
        }
    }

    // -----------------------------------------------------------------------
    // Base objects
    // -----------------------------------------------------------------------

    fn merge_base_objects(&mut self) {
        let base = self.base;
        for base_obj in base.iter() {
            if !base
                .get(base_obj.local_id)
                .is_some_and(|indexed| std::ptr::eq(indexed, base_obj))
            {
                continue;
            }
            let id = base_obj.local_id;
            let ours = self.ours.from_base.get(&id).and_then(|s| self.ours.renumbered(*s, id));
            let theirs = self
                .theirs
                .from_base
                .get(&id)
                .and_then(|s| self.theirs.renumbered(*s, id));

            let outcome = classify_object(
                self.delta(base_obj, ours.as_ref()),
                self.delta(base_obj, theirs.as_ref()),
            );
            match (outcome, ours, theirs) {
                // Ignored properties are the only possible difference; keep ours.
                (ObjectOutcome::Keep, ours, _) => {
                    self.result.merged.push(ours.unwrap_or_else(|| base_obj.clone()))
                }
                (ObjectOutcome::Remove, _, _) => {
                    debug!(local_id = id, "object removed");
                    self.push_object_change(base_obj, ChangeKind::Removed, base);
                }
                (ObjectOutcome::Conflict(kind), ours, theirs) => {
                    let mut conflict =
                        Conflict::new(id, base_obj.class_name.as_str(), ConflictScope::Object, kind)
                            .with_values(
                                object_value(Some(base_obj)),
                                object_value(ours.as_ref()),
                                object_value(theirs.as_ref()),
                            );
                    self.annotate(&mut conflict, self.base, id);
                    debug!(local_id = id, kind = %kind, "object conflict");
                    self.result.conflicts.push(conflict);
                    self.result.merged.push(base_obj.clone());
                }
                (ObjectOutcome::Merge, Some(ours), Some(theirs)) => {
                    let merged = self.merge_object(Some(base_obj), &ours, &theirs);
                    self.record_property_changes(&base_obj.properties, &merged);
                    self.result.merged.push(merged);
                }
                (ObjectOutcome::Merge, ours, theirs) => {
                    // Classification only merges when both sides kept the object.
                    warn!(local_id = id, "merge outcome without both sides, keeping one");
                    let side = ours.or(theirs).unwrap_or_else(|| base_obj.clone());
                    self.result.merged.push(side);
                }
            }
        }
    }

    fn delta(&self, base_obj: &SceneObject, side: Option<&SceneObject>) -> ObjectDelta {
        match side {
            None => ObjectDelta::Removed,
            Some(obj) if compare_trees(&base_obj.properties, &obj.properties, self.ctx).is_empty() => {
                ObjectDelta::Unchanged
            }
            Some(_) => ObjectDelta::Modified,
        }
    }

    // -----------------------------------------------------------------------
    // Added objects
    // -----------------------------------------------------------------------

    fn merge_added_objects(&mut self) {
        let theirs_pairing = self.theirs.pairing;
        let theirs_added: BTreeMap<LocalId, &UnpairedObject> = theirs_pairing
            .added
            .iter()
            .filter_map(|a| self.theirs.to_merged.get(&a.local_id).map(|m| (*m, a)))
            .collect();
        let mut taken: BTreeSet<LocalId> = BTreeSet::new();

        let ours_pairing = self.ours.pairing;
        for added in &ours_pairing.added {
            let Some(&merged_id) = self.ours.to_merged.get(&added.local_id) else {
                continue;
            };
            let Some(ours) = self.ours.renumbered(added.local_id, merged_id) else {
                continue;
            };
            let first_conflict = self.result.conflicts.len();
            let object = match theirs_added.get(&merged_id) {
                Some(theirs_obj) => {
                    taken.insert(merged_id);
                    match self.theirs.renumbered(theirs_obj.local_id, merged_id) {
                        Some(theirs) if theirs.class_id == ours.class_id => {
                            self.merge_object(None, &ours, &theirs)
                        }
                        Some(theirs) => {
                            debug!(
                                local_id = merged_id,
                                ours = ours.class_id,
                                theirs = theirs.class_id,
                                "both sides added different objects under one key"
                            );
                            let conflict = Conflict::new(
                                merged_id,
                                ours.class_name.as_str(),
                                ConflictScope::Object,
                                ConflictKind::AddVsAdd,
                            )
                            .with_values(None, object_value(Some(&ours)), object_value(Some(&theirs)));
                            self.result.conflicts.push(conflict);
                            ours
                        }
                        None => ours,
                    }
                }
                None => ours,
            };
            let path = added.hierarchy_path().map(str::to_string);
            let name = self.ours.doc.game_object_name(added.local_id).map(str::to_string);
            for conflict in &mut self.result.conflicts[first_conflict..] {
                conflict.hierarchy_path = path.clone();
                conflict.game_object_name = name.clone();
            }
            self.push_added(object, self.ours.doc, added);
        }

        for (merged_id, added) in theirs_added {
            if taken.contains(&merged_id) {
                continue;
            }
            if let Some(theirs) = self.theirs.renumbered(added.local_id, merged_id) {
                self.push_added(theirs, self.theirs.doc, added);
            }
        }
    }

    fn push_added(&mut self, object: SceneObject, source: &Document, added: &UnpairedObject) {
        debug!(local_id = object.local_id, class = %object.class_name, "object added");
        self.result.auto_merged_objects.push(ObjectChange {
            local_id: object.local_id,
            class_name: object.class_name.clone(),
            kind: ChangeKind::Added,
            data: Value::Object(object.properties.clone()),
            game_object_name: source.game_object_name(added.local_id).map(str::to_string),
            hierarchy_path: added.hierarchy_path().map(str::to_string),
        });
        self.result.merged.push(object);
    }

    // -----------------------------------------------------------------------
    // Property merge
    // -----------------------------------------------------------------------

    /// Merge one object's property trees. Conflicts are recorded against the
    /// merged object ID.
    fn merge_object(
        &mut self,
        base: Option<&SceneObject>,
        ours: &SceneObject,
        theirs: &SceneObject,
    ) -> SceneObject {
        let mut merge = PropertyMerge::new(self.ctx);
        let properties = merge.merge_maps(
            &PropertyPath::root(),
            base.map(|b| &b.properties),
            &ours.properties,
            &theirs.properties,
        );

        for (path, kind, values) in merge.conflicts {
            let mut conflict = Conflict::new(
                ours.local_id,
                ours.class_name.as_str(),
                ConflictScope::Property { path },
                kind,
            )
            .with_values(values.0, values.1, values.2);
            if base.is_some() {
                self.annotate(&mut conflict, self.base, ours.local_id);
            }
            debug!(
                local_id = conflict.local_id,
                path = %conflict.display_path(),
                kind = %conflict.kind,
                "property conflict"
            );
            self.result.conflicts.push(conflict);
        }

        SceneObject {
            properties,
            ..ours.clone()
        }
    }

    fn record_property_changes(&mut self, base: &PropertyTree, merged: &SceneObject) {
        let hierarchy_path = self.base_map.key_of(merged.local_id).map(|k| k.path.clone());
        let name = self.base.game_object_name(merged.local_id).map(str::to_string);
        let conflicted: Vec<PropertyPath> = self
            .result
            .conflicts
            .iter()
            .filter(|c| c.local_id == merged.local_id)
            .filter_map(|c| c.property_path().cloned())
            .collect();
        for change in compare_trees(base, &merged.properties, self.ctx) {
            if conflicted.iter().any(|p| change.path.starts_with(p)) {
                continue;
            }
            let mut change = Change::from_property(merged.local_id, merged.class_name.as_str(), change);
            change.hierarchy_path = hierarchy_path.clone();
            change.game_object_name = name.clone();
            self.result.auto_merged.push(change);
        }
    }

    fn push_object_change(&mut self, obj: &SceneObject, kind: ChangeKind, doc: &Document) {
        self.result.auto_merged_objects.push(ObjectChange {
            local_id: obj.local_id,
            class_name: obj.class_name.clone(),
            kind,
            data: Value::Object(obj.properties.clone()),
            game_object_name: doc.game_object_name(obj.local_id).map(str::to_string),
            hierarchy_path: self.base_map.key_of(obj.local_id).map(|k| k.path.clone()),
        });
    }

    fn annotate(&self, conflict: &mut Conflict, doc: &Document, local_id: LocalId) {
        conflict.game_object_name = doc.game_object_name(local_id).map(str::to_string);
        conflict.hierarchy_path = self.base_map.key_of(local_id).map(|k| k.path.clone());
    }
}

fn object_value(obj: Option<&SceneObject>) -> Option<Value> {
    obj.and_then(|o| serde_json::to_value(o).ok())
}

type ConflictValues = (Option<Value>, Option<Value>, Option<Value>);

/// Recursive three-way merge of property values.
struct PropertyMerge<'c> {
    ctx: &'c DiffContext,
    conflicts: Vec<(PropertyPath, ConflictKind, ConflictValues)>,
}

impl<'c> PropertyMerge<'c> {
    fn new(ctx: &'c DiffContext) -> Self {
        Self {
            ctx,
            conflicts: Vec::new(),
        }
    }

    fn merge_value(
        &mut self,
        path: &PropertyPath,
        base: Option<&Value>,
        ours: Option<&Value>,
        theirs: Option<&Value>,
    ) -> Option<Value> {
        if is_ignored(self.ctx, path) {
            return ours.cloned();
        }
        if ours == theirs || theirs == base {
            return ours.cloned();
        }
        if ours == base {
            return theirs.cloned();
        }

        match (base, ours, theirs) {
            (None | Some(Value::Object(_)), Some(Value::Object(o)), Some(Value::Object(t))) => {
                let b = base.and_then(Value::as_object);
                Some(Value::Object(self.merge_maps(path, b, o, t)))
            }
            (None | Some(Value::Array(_)), Some(Value::Array(o)), Some(Value::Array(t))) => {
                let b = base.and_then(Value::as_array).map(Vec::as_slice);
                self.merge_lists(path, b, o, t).map(Value::Array)
            }
            _ => {
                let kind = match (base, ours, theirs) {
                    (None, _, _) => ConflictKind::AddVsAdd,
                    (Some(_), Some(_), Some(_)) => ConflictKind::BothModified,
                    _ => ConflictKind::ModifyVsRemove,
                };
                self.conflicts.push((
                    path.clone(),
                    kind,
                    (base.cloned(), ours.cloned(), theirs.cloned()),
                ));
                base.cloned()
            }
        }
    }

    /// Keys keep their base order, then ours' additions, then theirs'.
    fn merge_maps(
        &mut self,
        path: &PropertyPath,
        base: Option<&Map<String, Value>>,
        ours: &Map<String, Value>,
        theirs: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut keys: Vec<&String> = Vec::new();
        let mut seen: HashSet<&String> = HashSet::new();
        let base_keys = base.into_iter().flat_map(|b| b.keys());
        for key in base_keys.chain(ours.keys()).chain(theirs.keys()) {
            if seen.insert(key) {
                keys.push(key);
            }
        }

        let mut merged = Map::new();
        for key in keys {
            let child = path.key(key.as_str());
            let value = self.merge_value(
                &child,
                base.and_then(|b| b.get(key)),
                ours.get(key),
                theirs.get(key),
            );
            if let Some(value) = value {
                merged.insert(key.clone(), value);
            }
        }
        merged
    }

    fn merge_lists(
        &mut self,
        path: &PropertyPath,
        base: Option<&[Value]>,
        ours: &[Value],
        theirs: &[Value],
    ) -> Option<Vec<Value>> {
        let empty: &[Value] = &[];
        match list_shape(&[base.unwrap_or(empty), ours, theirs]) {
            ListShape::RefSet => Some(merge_ref_sets(base.unwrap_or(empty), ours, theirs)),
            ListShape::Overrides => Some(self.merge_overrides(path, base.unwrap_or(empty), ours, theirs)),
            ListShape::Positional => Some(self.merge_positional(path, base, ours, theirs)),
        }
    }

    /// Slot-by-slot merge. Slots that merge to nothing are dropped and the
    /// conflicts recorded under later slots follow their value to its new index.
    fn merge_positional(
        &mut self,
        path: &PropertyPath,
        base: Option<&[Value]>,
        ours: &[Value],
        theirs: &[Value],
    ) -> Vec<Value> {
        let len = base.map_or(0, <[Value]>::len).max(ours.len()).max(theirs.len());
        let mut slots = Vec::with_capacity(len);
        for i in 0..len {
            let first = self.conflicts.len();
            let (o, t) = (ours.get(i), theirs.get(i));
            let mut value = self.merge_value(&path.index(i), base.and_then(|b| b.get(i)), o, t);
            // A conflicting slot with no base value holds ours until resolved.
            if value.is_none() && self.conflicts.len() > first {
                value = o.or(t).cloned();
            }
            slots.push((value, first..self.conflicts.len()));
        }

        let mut merged = Vec::with_capacity(len);
        for (i, (value, recorded)) in slots.into_iter().enumerate() {
            let Some(value) = value else {
                continue;
            };
            let at = merged.len();
            if at != i {
                for (conflict_path, _, _) in &mut self.conflicts[recorded] {
                    *conflict_path = conflict_path.reindexed(path.len(), at);
                }
            }
            merged.push(value);
        }
        merged
    }

    fn merge_overrides(
        &mut self,
        path: &PropertyPath,
        base: &[Value],
        ours: &[Value],
        theirs: &[Value],
    ) -> Vec<Value> {
        let b = override_map(base);
        let o = override_map(ours);
        let t = override_map(theirs);

        let mut keys: Vec<(LocalId, String)> = Vec::new();
        let mut seen = HashSet::new();
        for key in ordered_override_keys(ours).into_iter().chain(ordered_override_keys(theirs)) {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        // Entries only base still has: removed by a side, maybe modified by the other.
        for key in b.keys() {
            if seen.insert(key.clone()) {
                keys.push(key.clone());
            }
        }

        keys.into_iter()
            .filter_map(|key| {
                let child = path.override_entry(key.0, key.1.as_str());
                self.merge_value(
                    &child,
                    b.get(&key).copied(),
                    o.get(&key).copied(),
                    t.get(&key).copied(),
                )
            })
            .collect()
    }
}

fn ordered_override_keys(list: &[Value]) -> Vec<(LocalId, String)> {
    list.iter()
        .filter_map(|item| crate::diff::path::override_key(item).map(|(t, p)| (t, p.to_string())))
        .collect()
}

/// Three-way merge of reference sets. Ours' order is kept; theirs' removals
/// are dropped from it and theirs' additions appended.
fn merge_ref_sets(base: &[Value], ours: &[Value], theirs: &[Value]) -> Vec<Value> {
    let base_ids = ref_set(base);
    let ours_ids = ref_set(ours);
    let theirs_ids = ref_set(theirs);

    let mut merged: Vec<Value> = ours
        .iter()
        .filter(|item| {
            ref_id(item).map_or(true, |id| !base_ids.contains(&id) || theirs_ids.contains(&id))
        })
        .cloned()
        .collect();
    let mut appended = BTreeSet::new();
    for item in theirs {
        let Some(id) = ref_id(item) else { continue };
        if !base_ids.contains(&id) && !ours_ids.contains(&id) && appended.insert(id) {
            merged.push(item.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> PropertyTree {
        value.as_object().cloned().unwrap()
    }

    /// Root node with a transform and one script component.
    fn doc(children: &[LocalId], health: i64, pos_x: i64) -> Document {
        let kids: Vec<Value> = children.iter().map(|c| json!({"fileID": c})).collect();
        Document::from_objects(vec![
            SceneObject::new(1, 100, props(json!({
                "m_Name": "Root",
                "m_Component": [{"component": {"fileID": 101}}, {"component": {"fileID": 102}}],
            }))),
            SceneObject::new(4, 101, props(json!({
                "m_GameObject": {"fileID": 100},
                "m_Father": {"fileID": 0},
                "m_Children": kids,
                "m_LocalPosition": {"x": pos_x, "y": 0, "z": 0},
            }))),
            SceneObject::new(114, 102, props(json!({
                "m_GameObject": {"fileID": 100},
                "m_Script": {"fileID": 11500000, "guid": "hp"},
                "health": health,
            }))),
        ])
    }

    #[test]
    fn test_disjoint_edits_merge_cleanly() {
        let base = doc(&[], 50, 0);
        let ours = doc(&[], 80, 0);
        let theirs = doc(&[], 50, 5);
        let result = Merger::three_way_merge(&base, &ours, &theirs, &DiffContext::default());
        assert!(!result.has_conflicts());
        assert_eq!(result.merged.get(102).unwrap().properties["health"], json!(80));
        assert_eq!(result.merged.get(101).unwrap().properties["m_LocalPosition"]["x"], json!(5));
        assert_eq!(result.auto_merged.len(), 2);
    }

    #[test]
    fn test_both_modified_conflict_keeps_base() {
        let base = doc(&[], 50, 0);
        let result = Merger::three_way_merge(
            &base,
            &doc(&[], 80, 0),
            &doc(&[], 100, 0),
            &DiffContext::default(),
        );
        assert_eq!(result.conflicts.len(), 1);
        let c = &result.conflicts[0];
        assert_eq!(c.kind, ConflictKind::BothModified);
        assert_eq!((c.base.clone(), c.ours.clone(), c.theirs.clone()), (Some(json!(50)), Some(json!(80)), Some(json!(100))));
        assert_eq!(c.hierarchy_path.as_deref(), Some("Root"));
        assert_eq!(c.game_object_name.as_deref(), Some("Root"));
        assert_eq!(result.merged.get(102).unwrap().properties["health"], json!(50));
    }

    #[test]
    fn test_same_change_on_both_sides() {
        let base = doc(&[], 50, 0);
        let side = doc(&[], 70, 0);
        let result = Merger::three_way_merge(&base, &side, &side, &DiffContext::default());
        assert!(!result.has_conflicts());
        assert_eq!(result.merged.get(102).unwrap().properties["health"], json!(70));
    }

    fn with_items(mut doc: Document, items: Value) -> Document {
        doc.get_mut(102).unwrap().properties.insert("items".into(), items);
        doc
    }

    #[test]
    fn test_divergent_positional_appends_resolve_in_place() {
        let base = with_items(doc(&[], 50, 0), json!([1]));
        let ours = with_items(doc(&[], 50, 0), json!([1, 2, 3]));
        let theirs = with_items(doc(&[], 50, 0), json!([1, 4, 3]));
        let mut result = Merger::three_way_merge(&base, &ours, &theirs, &DiffContext::default());

        assert_eq!(result.conflicts.len(), 1);
        let conflict = result.conflicts[0].clone();
        assert_eq!(conflict.kind, ConflictKind::AddVsAdd);
        assert_eq!(conflict.property_path(), Some(&PropertyPath::root().key("items").index(1)));
        assert_eq!(result.merged.get(102).unwrap().properties["items"], json!([1, 2, 3]));
        let auto: Vec<String> = result.auto_merged.iter().map(|c| c.property_path.to_string()).collect();
        assert_eq!(auto, vec!["items[2]"]);

        result.apply_resolution(&conflict.id, Resolution::AcceptTheirs).unwrap();
        assert_eq!(result.merged.get(102).unwrap().properties["items"], json!([1, 4, 3]));
    }

    #[test]
    fn test_conflict_path_follows_compacted_slot() {
        let base = with_items(doc(&[], 50, 0), json!([1, 2, 3]));
        let ours = with_items(doc(&[], 50, 0), json!([1]));
        let theirs = with_items(doc(&[], 50, 0), json!([1, 2, 9]));
        let mut result = Merger::three_way_merge(&base, &ours, &theirs, &DiffContext::default());

        assert_eq!(result.conflicts.len(), 1);
        let conflict = result.conflicts[0].clone();
        assert_eq!(conflict.kind, ConflictKind::ModifyVsRemove);
        let path = conflict.property_path().unwrap().clone();
        assert_eq!(path, PropertyPath::root().key("items").index(1));
        let merged = &result.merged.get(102).unwrap().properties;
        assert_eq!(path.lookup(merged), conflict.base.as_ref());

        result.apply_resolution(&conflict.id, Resolution::AcceptTheirs).unwrap();
        assert_eq!(result.merged.get(102).unwrap().properties["items"], json!([1, 9]));
    }

    #[test]
    fn test_added_objects_of_different_class_conflict() {
        let add_component = |class_id: u32| {
            let mut side = doc(&[], 50, 0);
            side.get_mut(100).unwrap().properties.insert(
                "m_Component".into(),
                json!([
                    {"component": {"fileID": 101}},
                    {"component": {"fileID": 102}},
                    {"component": {"fileID": 150}},
                ]),
            );
            let mut extra = SceneObject::new(114, 150, props(json!({
                "m_GameObject": {"fileID": 100},
                "m_Script": {"fileID": 11500000, "guid": "ext"},
            })));
            extra.class_id = class_id;
            side.push(extra);
            side
        };
        let base = doc(&[], 50, 0);
        let mut result = Merger::three_way_merge(
            &base,
            &add_component(114),
            &add_component(115),
            &DiffContext::default(),
        );

        assert_eq!(result.conflicts.len(), 1);
        let conflict = result.conflicts[0].clone();
        assert!(conflict.is_object_level());
        assert_eq!(conflict.kind, ConflictKind::AddVsAdd);
        assert_eq!(conflict.base, None);
        assert_eq!(conflict.hierarchy_path.as_deref(), Some("Root"));
        assert_eq!(result.merged.get(150).unwrap().class_id, 114);

        result.apply_resolution(&conflict.id, Resolution::AcceptTheirs).unwrap();
        assert_eq!(result.merged.get(150).unwrap().class_id, 115);
    }

    #[test]
    fn test_ref_set_merge() {
        let base = [json!({"fileID": 1}), json!({"fileID": 2})];
        let ours = [json!({"fileID": 2}), json!({"fileID": 1}), json!({"fileID": 3})];
        let theirs = [json!({"fileID": 1}), json!({"fileID": 4})];
        let merged = merge_ref_sets(&base, &ours, &theirs);
        assert_eq!(merged, vec![json!({"fileID": 1}), json!({"fileID": 3}), json!({"fileID": 4})]);
    }

    #[test]
    fn test_ignored_path_keeps_ours() {
        let ctx = DiffContext::default().with_ignored("health");
        let result = Merger::three_way_merge(
            &doc(&[], 50, 0),
            &doc(&[], 80, 0),
            &doc(&[], 100, 0),
            &ctx,
        );
        assert!(!result.has_conflicts());
        assert_eq!(result.merged.get(102).unwrap().properties["health"], json!(80));
    }

    #[test]
    fn test_modify_vs_remove_object() {
        let base = doc(&[], 50, 0);
        let mut ours = doc(&[], 50, 0);
        ours.remove(102);
        ours.get_mut(100).unwrap().properties.insert(
            "m_Component".into(),
            json!([{"component": {"fileID": 101}}]),
        );
        let theirs = doc(&[], 75, 0);
        let mut result = Merger::three_way_merge(&base, &ours, &theirs, &DiffContext::default());

        let object_conflict = result
            .conflicts
            .iter()
            .find(|c| c.is_object_level())
            .cloned()
            .expect("object conflict");
        assert_eq!(object_conflict.kind, ConflictKind::ModifyVsRemove);
        assert_eq!(object_conflict.ours, None);
        assert!(result.merged.contains(102));

        result
            .apply_resolution(&object_conflict.id, Resolution::AcceptOurs)
            .unwrap();
        assert!(!result.merged.contains(102));
    }

    #[test]
    fn test_unchanged_removal_is_applied() {
        let base = doc(&[], 50, 0);
        let mut theirs = doc(&[], 50, 0);
        theirs.remove(102);
        let result = Merger::three_way_merge(&base, &base, &theirs, &DiffContext::default());
        assert!(!result.has_conflicts());
        assert!(!result.merged.contains(102));
        assert_eq!(result.auto_merged_objects.len(), 1);
        assert_eq!(result.auto_merged_objects[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn test_added_object_id_collision_is_renumbered() {
        let base = doc(&[], 50, 0);
        let mut ours = doc(&[], 50, 0);
        ours.push(SceneObject::new(21, 500, props(json!({"m_Shader": "a"}))));
        let mut theirs = doc(&[], 50, 0);
        theirs.push(SceneObject::new(21, 500, props(json!({"m_Shader": "b"}))));
        let result = Merger::three_way_merge(&base, &ours, &theirs, &DiffContext::default());
        assert!(!result.has_conflicts());
        assert_eq!(result.merged.get(500).unwrap().properties["m_Shader"], json!("a"));
        assert_eq!(result.merged.get(501).unwrap().properties["m_Shader"], json!("b"));
    }

    #[test]
    fn test_apply_resolution_lifecycle() {
        let mut result = Merger::three_way_merge(
            &doc(&[], 50, 0),
            &doc(&[], 80, 0),
            &doc(&[], 100, 0),
            &DiffContext::default(),
        );
        let id = result.conflicts[0].id.clone();

        result.apply_resolution(&id, Resolution::Deferred).unwrap();
        assert_eq!(result.conflict(&id).unwrap().status, ConflictStatus::Deferred);
        assert!(result.has_conflicts());

        result.apply_resolution(&id, Resolution::AcceptTheirs).unwrap();
        assert_eq!(result.merged.get(102).unwrap().properties["health"], json!(100));
        assert!(!result.has_conflicts());
        assert!(result.conflict(&id).unwrap().resolved_at.is_some());

        result.apply_resolution(&id, Resolution::AcceptTheirs).unwrap();
        assert!(matches!(
            result.apply_resolution(&id, Resolution::AcceptOurs),
            Err(ConflictError::AlreadyResolved(_))
        ));
        assert!(matches!(
            result.apply_resolution("nope", Resolution::AcceptOurs),
            Err(ConflictError::NotFound(_))
        ));
    }
}
