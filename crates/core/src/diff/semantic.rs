//! Document-level two-way diff over paired objects.

use serde_json::Value;
use tracing::{debug, info};

use crate::context::DiffContext;
use crate::document::{remap_tree, Document, LocalId};
use crate::identity::{DocumentPairing, UnpairedObject};

use super::model::{Change, ChangeKind, DiffResult, ObjectChange};
use super::property::compare_trees;

/// Diff `left` (old) against `right` (new).
///
/// Objects are paired by match key, so renumbered but otherwise identical
/// documents produce no changes. Property changes are reported against the
/// right-hand local ID.
pub fn semantic_diff(left: &Document, right: &Document, ctx: &DiffContext) -> DiffResult {
    let pairing = DocumentPairing::compute(left, right, ctx);
    diff_with_pairing(left, right, &pairing, ctx)
}

/// Diff two documents whose objects are already paired.
pub fn diff_with_pairing(
    left: &Document,
    right: &Document,
    pairing: &DocumentPairing,
    ctx: &DiffContext,
) -> DiffResult {
    let mut result = DiffResult::default();

    for unpaired in &pairing.removed {
        if let Some(change) = object_change(left, unpaired, ChangeKind::Removed) {
            result.object_changes.push(change);
        }
    }
    for unpaired in &pairing.added {
        if let Some(change) = object_change(right, unpaired, ChangeKind::Added) {
            result.object_changes.push(change);
        }
    }

    for pair in &pairing.matched {
        let (Some(old), Some(new)) = (left.get(pair.left), right.get(pair.right)) else {
            continue;
        };
        let old_props = remap_tree(&old.properties, &pairing.remap);
        let changes = compare_trees(&old_props, &new.properties, ctx);
        if changes.is_empty() {
            continue;
        }
        debug!(left = pair.left, right = pair.right, count = changes.len(), "object changed");
        let game_object_name = right.game_object_name(pair.right).map(str::to_string);
        for change in changes {
            let mut change = Change::from_property(pair.right, new.class_name.as_str(), change);
            change.game_object_name = game_object_name.clone();
            change.hierarchy_path = pair.hierarchy_path.clone();
            result.property_changes.push(change);
        }
    }

    result
        .property_changes
        .sort_by(|a, b| (a.local_id, &a.property_path).cmp(&(b.local_id, &b.property_path)));
    result.object_changes.sort_by_key(|c| c.local_id);

    info!(
        added = result.added_count(),
        removed = result.removed_count(),
        modified = result.modified_count(),
        "semantic diff complete"
    );
    result
}

fn object_change(doc: &Document, unpaired: &UnpairedObject, kind: ChangeKind) -> Option<ObjectChange> {
    let obj = doc.get(unpaired.local_id)?;
    Some(ObjectChange {
        local_id: obj.local_id,
        class_name: obj.class_name.clone(),
        kind,
        data: Value::Object(obj.properties.clone()),
        game_object_name: doc.game_object_name(obj.local_id).map(str::to_string),
        hierarchy_path: unpaired.hierarchy_path().map(str::to_string),
    })
}

/// Local IDs touched by `result`, ascending.
pub fn touched_objects(result: &DiffResult) -> Vec<LocalId> {
    let mut ids: Vec<LocalId> = result
        .property_changes
        .iter()
        .map(|c| c.local_id)
        .chain(result.object_changes.iter().map(|c| c.local_id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
