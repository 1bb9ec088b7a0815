//! Relaxed JSON Patch over the canonical schema
//!
//! Operations address the canonical JSON form of a [`Schema`]
//! (`/tables/users/columns/id`, ...) and differ from RFC 6902 in three ways:
//!
//! - `add` and `replace` create missing intermediate objects, and `replace`
//!   does not require the target to exist
//! - `remove` of a path that does not exist does nothing
//! - path segments are taken literally; `~0` and `~1` are not decoded
//!
//! `move`, `copy` and `test` keep their strict meaning and fail on missing
//! paths. This is the only mutating stage of the pipeline.

use schemaloom_core::Schema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// One edit, tagged by `op` as in JSON Patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl Operation {
    /// The `op` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Replace { .. } => "replace",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
            Self::Test { .. } => "test",
        }
    }

    /// Target path of the operation
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }
}

/// Errors that stop a patch
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Test failed at '{path}': expected {expected}, found {actual}")]
    TestFailed {
        path: String,
        expected: Value,
        actual: Value,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Patched document is not a valid schema: {0}")]
    InvalidSchema(String),
}

/// Apply `operations` to `schema` in order.
///
/// On error, the operations before the failing one stay applied. If the
/// patched document no longer describes a schema, `schema` is left as it was
/// and `InvalidSchema` is returned.
pub fn apply_patch(schema: &mut Schema, operations: &[Operation]) -> Result<(), PatchError> {
    tracing::debug!(operations = operations.len(), "applying patch");

    let mut document =
        serde_json::to_value(&*schema).map_err(|e| PatchError::InvalidSchema(e.to_string()))?;

    let mut outcome = Ok(());
    for operation in operations {
        if let Err(e) = apply_operation(&mut document, operation) {
            tracing::warn!(path = %operation.path(), error = %e, "patch operation failed");
            outcome = Err(e);
            break;
        }
    }

    let mut patched: Schema =
        serde_json::from_value(document).map_err(|e| PatchError::InvalidSchema(e.to_string()))?;
    patched.normalize_names();
    *schema = patched;

    outcome
}

/// Apply one operation to a JSON document. A failed operation leaves the
/// document as it was.
pub fn apply_operation(document: &mut Value, operation: &Operation) -> Result<(), PatchError> {
    tracing::trace!(?operation, "applying operation");

    if let Operation::Test { .. } = operation {
        return apply_in_place(document, operation);
    }
    let mut staged = document.clone();
    apply_in_place(&mut staged, operation)?;
    *document = staged;
    Ok(())
}

fn apply_in_place(document: &mut Value, operation: &Operation) -> Result<(), PatchError> {
    match operation {
        Operation::Add { path, value } => insert(document, path, value.clone(), Mode::Add, true),
        Operation::Replace { path, value } => {
            insert(document, path, value.clone(), Mode::Replace, true)
        }
        Operation::Remove { path } => {
            remove(document, path)?;
            Ok(())
        }
        Operation::Move { from, path } => {
            if path.starts_with(&format!("{}/", from)) {
                return Err(PatchError::InvalidPath(format!(
                    "cannot move '{}' into its own child '{}'",
                    from, path
                )));
            }
            let value = remove(document, from)?.ok_or_else(|| PatchError::PathNotFound(from.clone()))?;
            insert(document, path, value, Mode::Add, false)
        }
        Operation::Copy { from, path } => {
            let value = lookup(document, from)?
                .cloned()
                .ok_or_else(|| PatchError::PathNotFound(from.clone()))?;
            insert(document, path, value, Mode::Add, false)
        }
        Operation::Test { path, value } => {
            let actual = lookup(document, path)?.ok_or_else(|| PatchError::PathNotFound(path.clone()))?;
            if actual == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed {
                    path: path.clone(),
                    expected: value.clone(),
                    actual: actual.clone(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// Array indexes insert
    Add,

    /// Array indexes overwrite
    Replace,
}

/// Split a path into literal segments; `""` is the whole document
fn segments(path: &str) -> Result<Vec<&str>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    match path.strip_prefix('/') {
        Some(rest) => Ok(rest.split('/').collect()),
        None => Err(PatchError::InvalidPath(format!("'{}' does not start with '/'", path))),
    }
}

fn array_index(segment: &str, len: usize, path: &str) -> Result<usize, PatchError> {
    if segment == "-" {
        return Ok(len);
    }
    segment
        .parse::<usize>()
        .map_err(|_| PatchError::InvalidPath(format!("'{}' in '{}' is not an array index", segment, path)))
}

fn lookup<'a>(document: &'a Value, path: &str) -> Result<Option<&'a Value>, PatchError> {
    let mut current = document;
    for segment in segments(path)? {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Walk to the container holding the last segment. With `vivify`, missing
/// or null members along the way become empty objects.
fn parent_mut<'a>(
    document: &'a mut Value,
    parents: &[&str],
    path: &str,
    vivify: bool,
) -> Result<Option<&'a mut Value>, PatchError> {
    let mut current = document;
    for segment in parents {
        current = match current {
            Value::Object(map) => {
                if vivify {
                    let child = map.entry(segment.to_string()).or_insert(Value::Null);
                    if child.is_null() {
                        *child = Value::Object(Map::new());
                    }
                    child
                } else {
                    match map.get_mut(*segment) {
                        Some(child) => child,
                        None => return Ok(None),
                    }
                }
            }
            Value::Array(items) => {
                let index = array_index(segment, items.len(), path)?;
                match items.get_mut(index) {
                    Some(child) => child,
                    None => return Ok(None),
                }
            }
            _ => {
                return Err(PatchError::InvalidPath(format!(
                    "'{}' runs through a scalar value",
                    path
                )))
            }
        };
    }
    Ok(Some(current))
}

fn insert(document: &mut Value, path: &str, value: Value, mode: Mode, vivify: bool) -> Result<(), PatchError> {
    let segments = segments(path)?;
    let Some((last, parents)) = segments.split_last() else {
        *document = value;
        return Ok(());
    };

    let parent = parent_mut(document, parents, path, vivify)?
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;

    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(last, items.len(), path)?;
            match mode {
                Mode::Add if index <= items.len() => {
                    items.insert(index, value);
                    Ok(())
                }
                Mode::Replace if index < items.len() => {
                    items[index] = value;
                    Ok(())
                }
                Mode::Replace if index == items.len() => {
                    items.push(value);
                    Ok(())
                }
                _ => Err(PatchError::PathNotFound(path.to_string())),
            }
        }
        _ => Err(PatchError::InvalidPath(format!(
            "'{}' runs through a scalar value",
            path
        ))),
    }
}

/// Remove and return the value at `path`; `None` when there is nothing there
fn remove(document: &mut Value, path: &str) -> Result<Option<Value>, PatchError> {
    let segments = segments(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Ok(Some(std::mem::take(document)));
    };

    let Some(parent) = parent_mut(document, parents, path, false).unwrap_or(None) else {
        return Ok(None);
    };

    Ok(match parent {
        Value::Object(map) => map.remove(*last),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => Some(items.remove(index)),
            _ => None,
        },
        _ => None,
    })
}
