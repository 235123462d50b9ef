//! Storage backend abstraction.
//!
//! A [`StoreBackend`] provides the handful of primitives the mapping layer
//! is built on: insert, upsert, structured query, count, index creation,
//! and shutdown. Everything else (registries, relation handling, chainable
//! finders) lives above this trait, so a backend stays small.
//!
//! Implementations must be thread-safe (`Send + Sync`) and tolerate
//! concurrent calls from multiple async tasks.

use std::fmt::Debug;

use async_trait::async_trait;
use bson::{Bson, Uuid};

use crate::{error::MapperResult, query::Query};

/// Abstract interface for document storage backends.
///
/// Collections spring into existence on first write; no backend call is
/// needed to create one. All operations return
/// [`MapperResult`](crate::error::MapperResult); implementers document
/// which error variants each operation can produce.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a new document under the given identifier.
    ///
    /// Fails with `Duplicate` if the identifier, or a value covered by a
    /// unique index, is already present in the collection.
    async fn insert_document(
        &self,
        id: Uuid,
        document: Bson,
        collection: &str,
    ) -> MapperResult<()>;

    /// Replaces the document stored under the given identifier, inserting
    /// it if absent.
    ///
    /// Fails with `Duplicate` only when the replacement violates a unique
    /// index against a *different* document.
    async fn upsert_document(
        &self,
        id: Uuid,
        document: Bson,
        collection: &str,
    ) -> MapperResult<()>;

    /// Runs a structured query and returns matching documents.
    ///
    /// Honors the query's filter, projection, sort keys, limit, and
    /// offset. An unknown collection yields an empty result.
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> MapperResult<Vec<Bson>>;

    /// Counts documents matching the query's filter.
    ///
    /// Projection, sort, limit, and offset are ignored.
    async fn count_documents(&self, query: Query, collection: &str) -> MapperResult<u64>;

    /// Creates an index on a field, idempotently.
    ///
    /// With `unique`, later writes that would duplicate an indexed value
    /// fail with `Duplicate`.
    async fn ensure_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> MapperResult<()>;

    /// Releases backend resources. Further use after shutdown is an error.
    ///
    /// The default implementation is a no-op; backends holding external
    /// connections override it.
    async fn shutdown(&self) -> MapperResult<()> {
        Ok(())
    }
}

/// Factory for backend instances.
///
/// Builders hold connection configuration and validate it when `build` is
/// awaited, so misconfiguration surfaces as an `Initialization` error
/// instead of a panic.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> MapperResult<Self::Backend>;
}
