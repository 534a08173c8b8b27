//! Recursive comparison of two property values.
//!
//! Rules, first match wins:
//! 1. equal values produce nothing;
//! 2. a value present on one side only is `Added`/`Removed` as a whole;
//! 3. two maps recurse over the sorted union of their keys;
//! 4. two reference lists compare as sets of IDs;
//! 5. two override lists compare as maps keyed by `(target, propertyPath)`;
//! 6. any other pair of lists compares slot by slot;
//! 7. anything else is `Modified`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::context::DiffContext;
use crate::document::{is_ref, make_ref, ref_id, LocalId, PropertyTree};

use super::model::{ChangeKind, PropertyChange};
use super::path::{override_key, PropertyPath};

/// How a group of lists is compared and merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListShape {
    RefSet,
    Overrides,
    Positional,
}

/// Shape shared by every list in `lists`. Empty lists fit any shape; at
/// least one list must be non-empty for a keyed shape.
pub(crate) fn list_shape(lists: &[&[Value]]) -> ListShape {
    let non_empty: Vec<&[Value]> = lists.iter().copied().filter(|l| !l.is_empty()).collect();
    if non_empty.is_empty() {
        return ListShape::Positional;
    }
    if non_empty.iter().all(|l| l.iter().all(is_ref)) {
        ListShape::RefSet
    } else if non_empty
        .iter()
        .all(|l| l.iter().all(|item| override_key(item).is_some()))
    {
        ListShape::Overrides
    } else {
        ListShape::Positional
    }
}

/// Referenced IDs of a reference list, including the null reference.
pub(crate) fn ref_set(list: &[Value]) -> BTreeSet<LocalId> {
    list.iter().filter_map(ref_id).collect()
}

/// Override entries keyed by `(target, propertyPath)`; later entries win.
pub(crate) fn override_map(list: &[Value]) -> BTreeMap<(LocalId, String), &Value> {
    list.iter()
        .filter_map(|item| {
            override_key(item).map(|(target, path)| ((target, path.to_string()), item))
        })
        .collect()
}

/// Whether changes at `path` are suppressed by the context.
pub(crate) fn is_ignored(ctx: &DiffContext, path: &PropertyPath) -> bool {
    !ctx.ignored_properties.is_empty() && !path.is_root() && ctx.is_ignored(&path.to_string())
}

/// Compare two values. `None` means absent.
pub fn compare_values(old: Option<&Value>, new: Option<&Value>) -> Vec<PropertyChange> {
    let mut walker = Walker::new(None);
    walker.visit(&PropertyPath::root(), old, new);
    walker.changes
}

/// Compare two property trees, skipping paths the context ignores.
pub fn compare_trees(old: &PropertyTree, new: &PropertyTree, ctx: &DiffContext) -> Vec<PropertyChange> {
    let mut walker = Walker::new(Some(ctx));
    walker.visit_maps(&PropertyPath::root(), old, new);
    walker.changes
}

struct Walker<'c> {
    ctx: Option<&'c DiffContext>,
    changes: Vec<PropertyChange>,
}

impl<'c> Walker<'c> {
    fn new(ctx: Option<&'c DiffContext>) -> Self {
        Self {
            ctx,
            changes: Vec::new(),
        }
    }

    fn emit(&mut self, path: PropertyPath, kind: ChangeKind, old: Option<&Value>, new: Option<&Value>) {
        self.changes.push(PropertyChange {
            path,
            kind,
            old_value: old.cloned(),
            new_value: new.cloned(),
        });
    }

    fn visit(&mut self, path: &PropertyPath, old: Option<&Value>, new: Option<&Value>) {
        if old == new {
            return;
        }
        if self.ctx.is_some_and(|ctx| is_ignored(ctx, path)) {
            return;
        }
        match (old, new) {
            (None, None) => {}
            (None, Some(_)) => self.emit(path.clone(), ChangeKind::Added, None, new),
            (Some(_), None) => self.emit(path.clone(), ChangeKind::Removed, old, None),
            (Some(Value::Object(a)), Some(Value::Object(b))) => self.visit_maps(path, a, b),
            (Some(Value::Array(a)), Some(Value::Array(b))) => match list_shape(&[a.as_slice(), b.as_slice()]) {
                ListShape::RefSet => self.visit_ref_sets(path, a, b),
                ListShape::Overrides => self.visit_overrides(path, a, b),
                ListShape::Positional => {
                    for i in 0..a.len().max(b.len()) {
                        self.visit(&path.index(i), a.get(i), b.get(i));
                    }
                }
            },
            (Some(_), Some(_)) => self.emit(path.clone(), ChangeKind::Modified, old, new),
        }
    }

    fn visit_maps(&mut self, path: &PropertyPath, a: &Map<String, Value>, b: &Map<String, Value>) {
        let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
        for key in keys {
            self.visit(&path.key(key.as_str()), a.get(key), b.get(key));
        }
    }

    fn visit_ref_sets(&mut self, path: &PropertyPath, a: &[Value], b: &[Value]) {
        let old_ids = ref_set(a);
        let new_ids = ref_set(b);
        for id in new_ids.difference(&old_ids) {
            let child = path.reference(*id);
            if !self.ctx.is_some_and(|ctx| is_ignored(ctx, &child)) {
                self.emit(child, ChangeKind::Added, None, Some(&make_ref(*id)));
            }
        }
        for id in old_ids.difference(&new_ids) {
            let child = path.reference(*id);
            if !self.ctx.is_some_and(|ctx| is_ignored(ctx, &child)) {
                self.emit(child, ChangeKind::Removed, Some(&make_ref(*id)), None);
            }
        }
    }

    fn visit_overrides(&mut self, path: &PropertyPath, a: &[Value], b: &[Value]) {
        let old = override_map(a);
        let new = override_map(b);
        let keys: BTreeSet<&(LocalId, String)> = old.keys().chain(new.keys()).collect();
        for key in keys {
            let child = path.override_entry(key.0, key.1.as_str());
            self.visit(&child, old.get(key).copied(), new.get(key).copied());
        }
    }
}
