//! Error types shared by every engine and by the typed [`crate::Store`] API.
//!
//! All operations return [`StoreError`]; nothing is retried or swallowed inside
//! the crate. Field-level record problems are reported as [`ValidationError`]
//! wrapped in [`StoreError::Validation`].

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The host environment denies persistent storage.
    #[error("persistent storage is unavailable: {0}")]
    StorageUnavailable(String),

    /// I/O, quota or engine-level failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("{collection} record {id:?} not found")]
    NotFound { collection: String, id: String },

    #[error("invalid {collection} record: {source}")]
    Validation {
        collection: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("database {name:?} is at version {stored}, newer than requested version {requested}")]
    VersionDowngrade {
        name: String,
        stored: u32,
        requested: u32,
    },

    #[error("unknown collection {0:?}")]
    UnknownCollection(String),

    #[error("unknown index {index:?} on collection {collection:?}")]
    UnknownIndex { collection: String, index: String },

    #[error("index {index:?} takes {expected} key part(s), got {actual}")]
    KeyArity {
        index: String,
        expected: usize,
        actual: usize,
    },

    #[error("{collection} record has no string value at primary key {key_path:?}")]
    MissingKey { collection: String, key_path: String },

    #[error("unique index {index:?} on {collection:?} already holds key {key}")]
    ConstraintViolation {
        collection: String,
        index: String,
        key: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Storage(format!("{context}: {err}"))
    }

    /// True for errors caused by a missing record on a required lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Field-level problems detected before a record is written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("field `{field}` is not a YYYY-MM-DD date: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("field `{field}` is not an RFC 3339 timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("field `{field}` must be a finite non-negative number, got {value}")]
    InvalidNumber { field: &'static str, value: f64 },

    #[error("targetMin ({min}) is greater than targetMax ({max})")]
    TargetRange { min: f64, max: f64 },

    #[error("mimeType {0:?} is not an image type")]
    InvalidMimeType(String),

    #[error("size {declared} does not match blob length {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
}
