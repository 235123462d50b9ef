//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - The record trait and binding metadata
//! - Relation declarations and field values
//! - The connection, model, and chainable query types
//! - Query construction and filtering
//! - Store backends, builders, and error types

pub use docmap_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    connection::Connection,
    document::{Record, RecordExt, RecordMeta},
    error::{MapperError, MapperResult},
    finder::ModelQuery,
    model::Model,
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    relation::{Many, One, Related, RelationField, RelationKind, RelationSchema},
};
