use crate::core::nested::NestedPath;
use thiserror::Error;

/// Usage errors raised by reducer operations.
///
/// None of these are transient: the reducer does no I/O, so every failure is a
/// mismatch between what the caller passed and what the state was built for.
#[derive(Debug, Error)]
pub enum ReducerError {
    #[error("structure mismatch at {path}: expected {expected}, found {found}")]
    StructureMismatch {
        path: NestedPath,
        expected: String,
        found: String,
    },

    #[error("shape error at {path}: {reason}")]
    Shape { path: NestedPath, reason: String },

    #[error(transparent)]
    Layout(#[from] ndarray::ShapeError),
}

impl ReducerError {
    pub(crate) fn shape<R: Into<String>>(path: &NestedPath, reason: R) -> Self {
        ReducerError::Shape {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch<E: Into<String>, F: Into<String>>(
        path: &NestedPath,
        expected: E,
        found: F,
    ) -> Self {
        ReducerError::StructureMismatch {
            path: path.clone(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Re-anchors a leaf-level error at `path` when it was raised without one.
    pub(crate) fn at(self, path: &NestedPath) -> Self {
        match self {
            ReducerError::Shape { path: p, reason } if p.is_root() => ReducerError::Shape {
                path: path.clone(),
                reason,
            },
            ReducerError::StructureMismatch {
                path: p,
                expected,
                found,
            } if p.is_root() => ReducerError::StructureMismatch {
                path: path.clone(),
                expected,
                found,
            },
            other => other,
        }
    }
}
