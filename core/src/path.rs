//! Addressing into nested model values.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One accessor step: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    /// Sequence index.
    Index(usize),
    /// Mapping key.
    Key(String),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "[{index}]"),
            Self::Key(key) => write!(f, "[{key:?}]"),
        }
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

/// Ordered accessor sequence. Empty addresses the whole value.
pub type Path = Vec<PathKey>;

/// Formats a path as `["a"][1]`, or `.` for the empty path.
#[must_use]
pub fn display_path(path: &[PathKey]) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }
    path.iter().map(ToString::to_string).collect()
}

/// Why an addressed mutation could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// An intermediate step does not exist.
    #[error("no value at step {depth} of the path")]
    Missing {
        /// Index of the failing step.
        depth: usize,
    },
    /// A step addresses into a scalar, or uses a key on a sequence / an index on a mapping.
    #[error("step {depth} does not address a container of the matching kind")]
    NotAContainer {
        /// Index of the failing step.
        depth: usize,
    },
    /// Final sequence index is beyond the append position.
    #[error("index {index} is out of range for a sequence of length {len}")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Sequence length.
        len: usize,
    },
}

/// Returns the value at `path`, if every step exists.
#[must_use]
pub fn lookup<'v>(value: &'v Value, path: &[PathKey]) -> Option<&'v Value> {
    path.iter().try_fold(value, |node, step| match (step, node) {
        (PathKey::Key(key), Value::Object(map)) => map.get(key),
        (PathKey::Index(index), Value::Array(items)) => items.get(*index),
        _ => None,
    })
}

/// Writes `new` at `path` inside `value`.
///
/// Every intermediate step must exist. The final step may replace an existing entry,
/// insert a new mapping key, or append when the index equals the sequence length.
///
/// # Errors
///
/// Returns a [`PathError`] and leaves `value` untouched when the path cannot be applied.
pub fn assign(value: &mut Value, path: &[PathKey], new: Value) -> Result<(), PathError> {
    let Some((last, parents)) = path.split_last() else {
        *value = new;
        return Ok(());
    };

    let mut node = value;
    for (depth, step) in parents.iter().enumerate() {
        node = match (step, node) {
            (PathKey::Key(key), Value::Object(map)) => {
                map.get_mut(key).ok_or(PathError::Missing { depth })?
            }
            (PathKey::Index(index), Value::Array(items)) => {
                items.get_mut(*index).ok_or(PathError::Missing { depth })?
            }
            _ => return Err(PathError::NotAContainer { depth }),
        };
    }

    let depth = parents.len();
    match (last, node) {
        (PathKey::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), new);
            Ok(())
        }
        (PathKey::Index(index), Value::Array(items)) => {
            let len = items.len();
            match (*index).cmp(&len) {
                core::cmp::Ordering::Less => {
                    items[*index] = new;
                    Ok(())
                }
                core::cmp::Ordering::Equal => {
                    items.push(new);
                    Ok(())
                }
                core::cmp::Ordering::Greater => Err(PathError::OutOfRange { index: *index, len }),
            }
        }
        _ => Err(PathError::NotAContainer { depth }),
    }
}
