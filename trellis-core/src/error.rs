//! Error types.
//!
//! Only recoverable conditions are errors. Contract violations inside the
//! proxy layer (a map operation on an array, a non-numeric array key) panic,
//! and panics raised by effect bodies or render functions propagate to the
//! caller unchanged.

use thiserror::Error;

/// Errors raised while loading a [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON, or a field has the wrong type
    #[error("Invalid configuration document: {source}")]
    Parse {
        /// The underlying parse error
        #[from]
        source: serde_json::Error,
    },

    /// A setting is outside its allowed range
    #[error("Invalid configuration: {field} must be greater than zero")]
    Zero {
        /// Name of the offending setting
        field: &'static str,
    },
}

/// Errors raised by the [`Renderer`](crate::render::Renderer).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// A mounted node's host handle is no longer attached to a parent, so
    /// the host tree diverged from the last rendered tree
    #[error("Cannot unmount a {kind} node that is not attached to the host tree")]
    NotMounted {
        /// Variant of the offending node
        kind: &'static str,
    },
}

/// Result alias for reconciler operations.
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
