//! Error types and result alias for mapper operations.
//!
//! The taxonomy has two tiers. Store-level failures (`NotFound`, `Duplicate`,
//! `InvalidId`) are expected runtime outcomes a caller handles per call.
//! Misuse failures (`Configuration`, `Schema`) report contract violations --
//! executing a query in the wrong mode, saving a relation whose in-memory
//! shape contradicts its declared kind, referencing an unsaved child -- as
//! typed values instead of aborting the process.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// All failures that can surface from mapper operations.
#[derive(Error, Debug)]
pub enum MapperError {
    /// Serialization/deserialization failure converting records to or from
    /// their BSON/JSON form.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Failure while constructing a backend or establishing its session.
    #[error("initialization error: {0}")]
    Initialization(String),
    /// API misuse: wrong execution mode, unregistered record type, and
    /// similar contract violations.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A relation declaration and the value found in a record disagree:
    /// kind/shape mismatch, an unsaved child, an undeclared populate field,
    /// or an unsupported relation element shape.
    #[error("schema error: {0}")]
    Schema(String),
    /// No document matched a single-result query. The argument names the
    /// collection that was searched.
    #[error("no matching record in collection {0}")]
    NotFound(String),
    /// A unique-key constraint was violated on insert or upsert.
    #[error("duplicate key in collection {0}")]
    Duplicate(String),
    /// A string supplied as a relation reference does not decode as a
    /// canonical identifier.
    #[error("invalid reference id: {0}")]
    InvalidId(String),
    /// Reserved for the validation hook; never raised by the engine today.
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),
    /// An unclassified error from the underlying storage backend, passed
    /// through unchanged in message form.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias used throughout the mapper.
pub type MapperResult<T> = Result<T, MapperError>;

impl From<BsonError> for MapperError {
    fn from(err: BsonError) -> Self {
        MapperError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MapperError {
    fn from(err: SerdeJsonError) -> Self {
        MapperError::Serialization(err.to_string())
    }
}
