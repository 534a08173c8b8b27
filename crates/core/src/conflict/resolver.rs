//! Conflict resolution actions.
//!
//! [`apply_resolution`] writes the chosen value into a merged document. The
//! [`ConflictResolver`] wraps it with named operations over a
//! [`MergeResult`]: accept one side, accept base, supply a value, or defer.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::document::{Document, SceneObject};
use crate::errors::ConflictError;

use super::detector::{Conflict, ConflictScope};
use super::merger::MergeResult;

/// Named resolution strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    AcceptOurs,
    AcceptTheirs,
    AcceptBase,
    /// Use a hand-made value. For object conflicts this is a serialized
    /// object, or `null` to drop it.
    AcceptValue(Value),
    /// Leave the conflict for later.
    Deferred,
}

/// The value a resolution selects. `None` means the value (or object) is
/// absent; `Deferred` selects nothing.
pub fn resolved_value(conflict: &Conflict, resolution: &Resolution) -> Option<Option<Value>> {
    match resolution {
        Resolution::AcceptOurs => Some(conflict.ours.clone()),
        Resolution::AcceptTheirs => Some(conflict.theirs.clone()),
        Resolution::AcceptBase => Some(conflict.base.clone()),
        Resolution::AcceptValue(Value::Null) if conflict.is_object_level() => Some(None),
        Resolution::AcceptValue(value) => Some(Some(value.clone())),
        Resolution::Deferred => None,
    }
}

/// Write `resolution` for `conflict` into `doc`.
///
/// Applying the same resolution twice leaves the document unchanged.
pub fn apply_resolution(
    doc: &mut Document,
    conflict: &Conflict,
    resolution: &Resolution,
) -> Result<(), ConflictError> {
    let Some(value) = resolved_value(conflict, resolution) else {
        debug!(conflict_id = %conflict.id, "deferred, nothing to apply");
        return Ok(());
    };
    let invalid = |detail: String| ConflictError::InvalidResolution {
        id: conflict.id.clone(),
        detail,
    };

    match &conflict.scope {
        ConflictScope::Property { path } => {
            let obj = doc
                .get_mut(conflict.local_id)
                .ok_or_else(|| invalid(format!("object {} is not in the document", conflict.local_id)))?;
            path.assign(&mut obj.properties, value)
                .map_err(|e| invalid(e.to_string()))?;
        }
        ConflictScope::Object => match value {
            None => {
                doc.remove(conflict.local_id);
            }
            Some(value) => {
                let mut obj: SceneObject =
                    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
                obj.local_id = conflict.local_id;
                doc.upsert(obj);
            }
        },
    }

    info!(
        conflict_id = %conflict.id,
        local_id = conflict.local_id,
        path = %conflict.display_path(),
        "resolution applied"
    );
    Ok(())
}

/// Stateless conflict resolution operations over a [`MergeResult`].
pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve a conflict by accepting our side.
    pub fn accept_ours(result: &mut MergeResult, conflict_id: &str) -> Result<(), ConflictError> {
        info!(conflict_id, "resolving conflict: accept ours");
        result.apply_resolution(conflict_id, Resolution::AcceptOurs)
    }

    /// Resolve a conflict by accepting their side.
    pub fn accept_theirs(result: &mut MergeResult, conflict_id: &str) -> Result<(), ConflictError> {
        info!(conflict_id, "resolving conflict: accept theirs");
        result.apply_resolution(conflict_id, Resolution::AcceptTheirs)
    }

    /// Resolve a conflict by restoring the base value.
    pub fn accept_base(result: &mut MergeResult, conflict_id: &str) -> Result<(), ConflictError> {
        info!(conflict_id, "resolving conflict: accept base");
        result.apply_resolution(conflict_id, Resolution::AcceptBase)
    }

    /// Resolve a conflict with a custom value.
    pub fn accept_value(
        result: &mut MergeResult,
        conflict_id: &str,
        value: Value,
    ) -> Result<(), ConflictError> {
        info!(conflict_id, "resolving conflict: accept custom value");
        result.apply_resolution(conflict_id, Resolution::AcceptValue(value))
    }

    /// Defer resolution of a conflict.
    pub fn defer(result: &mut MergeResult, conflict_id: &str) -> Result<(), ConflictError> {
        info!(conflict_id, "deferring conflict resolution");
        result.apply_resolution(conflict_id, Resolution::Deferred)
    }
}
