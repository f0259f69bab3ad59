//! Error types for strata.

use thiserror::Error;

use crate::handle::{ModelHandle, ObjectId};

/// The main error type for strata core operations.
///
/// Every variant that concerns a model carries the offending handle so that
/// caller bugs surface with enough context to be traced.
#[derive(Error, Debug)]
pub enum StrataError {
    /// A model handle was used that is not registered.
    #[error("model {0} is not registered")]
    UnknownModel(ModelHandle),

    /// A model handle was registered twice.
    #[error("model {0} is already registered")]
    ModelAlreadyRegistered(ModelHandle),

    /// An object id lies outside `[0, object_count)`.
    #[error("object {object} is out of range for a model with {count} objects")]
    ObjectOutOfRange { object: ObjectId, count: u32 },

    /// A record did not have the size expected by its arena.
    #[error("record size mismatch: expected a multiple of {expected} bytes, got {actual}")]
    InvalidRecordSize { expected: usize, actual: usize },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for strata core operations.
pub type Result<T> = std::result::Result<T, StrataError>;
