//! Typed property paths.
//!
//! A [`PropertyPath`] addresses one value inside an object's property tree.
//! Segments follow the differ's granularity, so a path can name a member of
//! a reference set or an entry of an override list by its key instead of by
//! its (unstable) position.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::{ref_id, LocalId, PropertyTree};

/// One step into a property tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    /// Map member.
    Key(String),
    /// Positional list slot.
    Index(usize),
    /// Member of a reference set, by referenced ID.
    Ref(LocalId),
    /// Entry of an override list, by `(target.fileID, propertyPath)`.
    Override {
        target: LocalId,
        property_path: String,
    },
}

/// Path from an object's property root to a value. The empty path is the
/// root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyPath(Vec<PathSegment>);

/// Why a path could not be navigated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PathError(pub String);

impl PropertyPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.child(PathSegment::Key(key.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    pub fn reference(&self, id: LocalId) -> Self {
        self.child(PathSegment::Ref(id))
    }

    pub fn override_entry(&self, target: LocalId, property_path: impl Into<String>) -> Self {
        self.child(PathSegment::Override {
            target,
            property_path: property_path.into(),
        })
    }

    /// Copy with the list index at segment `depth` replaced by `index`.
    pub(crate) fn reindexed(&self, depth: usize, index: usize) -> Self {
        let mut segments = self.0.clone();
        if let Some(segment @ PathSegment::Index(_)) = segments.get_mut(depth) {
            *segment = PathSegment::Index(index);
        }
        Self(segments)
    }

    /// Last map key on the path, e.g. `x` for `m_LocalPosition.x`.
    pub fn leaf_name(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|seg| match seg {
            PathSegment::Key(k) => Some(k.as_str()),
            _ => None,
        })
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &PropertyPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Value at this path, if every step resolves.
    pub fn lookup<'a>(&self, root: &'a PropertyTree) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let PathSegment::Key(key) = first else {
            return None;
        };
        let mut current = root.get(key)?;
        for segment in rest {
            current = step(current, segment)?;
        }
        Some(current)
    }

    /// Set (`Some`) or delete (`None`) the value at this path.
    ///
    /// Missing maps along a chain of keys are created. Any other missing
    /// container is an error.
    pub fn assign(&self, root: &mut PropertyTree, value: Option<Value>) -> Result<(), PathError> {
        let Some((last, parents)) = self.0.split_last() else {
            return Err(PathError("cannot assign to the root path".into()));
        };
        let Some((first, middle)) = parents.split_first() else {
            let PathSegment::Key(key) = last else {
                return Err(PathError(format!("'{self}' does not start with a key")));
            };
            match value {
                Some(v) => {
                    root.insert(key.clone(), v);
                }
                None => {
                    root.shift_remove(key);
                }
            }
            return Ok(());
        };

        let PathSegment::Key(first_key) = first else {
            return Err(PathError(format!("'{self}' does not start with a key")));
        };
        let mut current = root
            .entry(first_key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        for segment in middle {
            current = step_mut(current, segment)
                .ok_or_else(|| PathError(format!("'{self}' does not resolve at '{segment}'")))?;
        }
        assign_in(current, last, value)
            .map_err(|detail| PathError(format!("cannot assign '{self}': {detail}")))
    }
}

fn step<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (segment, value) {
        (PathSegment::Key(k), Value::Object(map)) => map.get(k),
        (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
        (PathSegment::Ref(id), Value::Array(items)) => {
            items.iter().find(|item| ref_id(item) == Some(*id))
        }
        (PathSegment::Override { target, property_path }, Value::Array(items)) => items
            .iter()
            .rev()
            .find(|item| override_key(item) == Some((*target, property_path.as_str()))),
        _ => None,
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match (segment, value) {
        (PathSegment::Key(k), Value::Object(map)) => {
            Some(map.entry(k.clone()).or_insert_with(|| Value::Object(Map::new())))
        }
        (PathSegment::Index(i), Value::Array(items)) => items.get_mut(*i),
        (PathSegment::Ref(id), Value::Array(items)) => {
            items.iter_mut().find(|item| ref_id(item) == Some(*id))
        }
        (PathSegment::Override { target, property_path }, Value::Array(items)) => items
            .iter_mut()
            .rev()
            .find(|item| override_key(item) == Some((*target, property_path.as_str()))),
        _ => None,
    }
}

fn assign_in(container: &mut Value, segment: &PathSegment, value: Option<Value>) -> Result<(), String> {
    match (segment, container) {
        (PathSegment::Key(k), Value::Object(map)) => {
            match value {
                Some(v) => {
                    map.insert(k.clone(), v);
                }
                None => {
                    map.shift_remove(k);
                }
            }
            Ok(())
        }
        (PathSegment::Index(i), Value::Array(items)) => match value {
            Some(v) if *i < items.len() => {
                items[*i] = v;
                Ok(())
            }
            Some(v) if *i == items.len() => {
                items.push(v);
                Ok(())
            }
            Some(_) => Err(format!("index {i} is past the end of a list of {}", items.len())),
            None => {
                if *i < items.len() {
                    items.remove(*i);
                }
                Ok(())
            }
        },
        (PathSegment::Ref(id), Value::Array(items)) => {
            let pos = items.iter().position(|item| ref_id(item) == Some(*id));
            match (pos, value) {
                (Some(p), Some(v)) => items[p] = v,
                (None, Some(v)) => items.push(v),
                (Some(_), None) => items.retain(|item| ref_id(item) != Some(*id)),
                (None, None) => {}
            }
            Ok(())
        }
        (PathSegment::Override { target, property_path }, Value::Array(items)) => {
            let key = Some((*target, property_path.as_str()));
            let pos = items.iter().rposition(|item| override_key(item) == key);
            match (pos, value) {
                (Some(p), Some(v)) => items[p] = v,
                (None, Some(v)) => items.push(v),
                (Some(_), None) => items.retain(|item| override_key(item) != key),
                (None, None) => {}
            }
            Ok(())
        }
        (segment, other) => Err(format!("'{segment}' does not apply to {}", type_name(other))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

/// `(target.fileID, propertyPath)` of an override entry.
pub(crate) fn override_key(item: &Value) -> Option<(LocalId, &str)> {
    let map = item.as_object()?;
    let property_path = map.get("propertyPath")?.as_str().unwrap_or_default();
    let target = map.get("target")?;
    Some((ref_id(target).unwrap_or(0), property_path))
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Ref(id) => write!(f, "[fileID={id}]"),
            Self::Override {
                target,
                property_path,
            } => write!(f, "[target.fileID={target},propertyPath={property_path}]"),
        }
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 && matches!(segment, PathSegment::Key(_)) {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<PathSegment>> for PropertyPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}
