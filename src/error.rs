use aqueduct_core::{ComponentId, ModelId, PathError, path::display_path, PathKey};
use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised inside the core.
///
/// None of them crosses the render boundary: assembly degrades to empty output and the
/// session logs the error. Host-call and store APIs still return them so embedders can
/// observe failures.
#[derive(Debug, Error)]
pub enum Error {
    /// A child, root or method target points at an unregistered id.
    #[error("component {id} is not registered")]
    MissingReference {
        /// The unresolved id.
        id: ComponentId,
    },

    /// A descriptor references one of its own ancestors.
    #[error("component {id} references itself through its descendants")]
    CyclicReference {
        /// The repeated id.
        id: ComponentId,
    },

    /// A prop value matched no known variant.
    #[error("prop `{prop}` has an unsupported shape: {reason}")]
    UnsupportedPropShape {
        /// Prop name.
        prop: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A backend call was unreachable or rejected.
    #[error("backend call `{operation}` failed: {source}")]
    BackendCallFailure {
        /// Which backend interface was called.
        operation: &'static str,
        /// Failure reported by the backend.
        #[source]
        source: BackendError,
    },

    /// A load event was about to fire twice for one mounted instance.
    #[error("load event of component {id} fired twice for the same instance")]
    DuplicateLoadEvent {
        /// Component whose load event was repeated.
        id: ComponentId,
    },

    /// An addressed mutation could not be applied.
    #[error("cannot write model `{model}` at {path}: {source}")]
    InvalidPath {
        /// Target model.
        model: ModelId,
        /// Rendered path.
        path: String,
        /// Why the path did not apply.
        #[source]
        source: PathError,
    },

    /// A host message could not be decoded.
    #[error("malformed host message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid_path(model: &ModelId, path: &[PathKey], source: PathError) -> Self {
        Self::InvalidPath {
            model: model.clone(),
            path: display_path(path),
            source,
        }
    }
}

/// Result alias for core operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;
