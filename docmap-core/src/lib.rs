//! Core types for the docmap object-document mapper.
//!
//! This crate defines the record trait and binding metadata, relation
//! declarations, the structured query model, the storage backend
//! abstraction, and the connection/model layer that ties them together.
//! Backend implementations live in sibling crates; most applications
//! depend on the `docmap` facade instead of this crate directly.
//!
//! # Overview
//!
//! - [`document`]: the [`Record`](document::Record) trait and
//!   [`RecordMeta`](document::RecordMeta) binding metadata
//! - [`relation`]: relation declarations and the
//!   [`Related`](relation::Related) field value
//! - [`query`]: filter expressions, sorting, and pagination
//! - [`backend`]: the [`StoreBackend`](backend::StoreBackend) primitives
//! - [`connection`]: the registry of record types and collections
//! - [`model`] and [`finder`]: typed saves, chainable queries, and
//!   one-level relation population

pub mod backend;
pub mod connection;
pub mod document;
pub mod error;
pub mod finder;
pub mod model;
pub mod query;
pub mod relation;

pub use backend::{StoreBackend, StoreBackendBuilder};
pub use connection::Connection;
pub use document::{Record, RecordExt, RecordMeta};
pub use error::{MapperError, MapperResult};
pub use finder::ModelQuery;
pub use model::Model;
pub use query::{Expr, FieldOp, Filter, Query, QueryBuilder, Sort, SortDirection};
pub use relation::{Many, One, Related, RelationField, RelationKind, RelationSchema};
