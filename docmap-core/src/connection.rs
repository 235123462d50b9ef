//! The connection: backend handle plus the type registry.
//!
//! A [`Connection`] owns a storage backend and a registry mapping logical
//! record type names to collection names. Models are checked out from the
//! connection and borrow it through an `Arc`, so a connection is created
//! once and shared across tasks.

use std::{collections::HashMap, sync::Arc};

use mea::rwlock::RwLock;
use tracing::debug;

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::Record,
    error::{MapperError, MapperResult},
    model::Model,
};

/// A shared handle to a storage backend and the record type registry.
///
/// Logical type names are case-insensitive; the registry stores them
/// lowercased.
pub struct Connection<B: StoreBackend> {
    backend: B,
    registry: RwLock<HashMap<String, String>>,
}

impl<B: StoreBackend> std::fmt::Debug for Connection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl<B: StoreBackend> Connection<B> {
    /// Wraps an already built backend.
    pub fn new(backend: B) -> Arc<Self> {
        Arc::new(Connection { backend, registry: RwLock::new(HashMap::new()) })
    }

    /// Builds the backend from its builder and wraps it.
    pub async fn connect<Builder>(builder: Builder) -> MapperResult<Arc<Self>>
    where
        Builder: StoreBackendBuilder<Backend = B>,
    {
        let backend = builder.build().await?;
        Ok(Self::new(backend))
    }

    /// Registers a record type under a collection name.
    ///
    /// An empty collection name is a `Configuration` error. Registering the
    /// same type again rebinds it; the last registration wins.
    pub async fn register<D: Record>(&self, collection: &str) -> MapperResult<()> {
        if collection.is_empty() {
            return Err(MapperError::Configuration(format!(
                "record type {:?} registered with an empty collection name",
                D::type_name()
            )));
        }
        let mut registry = self.registry.write().await;
        if let Some(previous) = registry.insert(D::type_name().to_lowercase(), collection.to_string())
        {
            debug!(
                record = D::type_name(),
                previous, collection, "record type rebound to a new collection"
            );
        } else {
            debug!(record = D::type_name(), collection, "record type registered");
        }
        Ok(())
    }

    /// Resolves the collection a type name is bound to.
    ///
    /// Unregistered names are a `Configuration` error.
    pub async fn resolve_collection(&self, type_name: &str) -> MapperResult<String> {
        self.registry
            .read()
            .await
            .get(&type_name.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                MapperError::Configuration(format!(
                    "record type {type_name:?} is not registered with this connection"
                ))
            })
    }

    /// Resolves a type name's collection, binding it to a collection of the
    /// same name when absent. Used when following relation declarations, so
    /// a relation target never needs explicit registration.
    pub(crate) async fn resolve_or_bind(&self, type_name: &str) -> String {
        let key = type_name.to_lowercase();
        if let Some(found) = self.registry.read().await.get(&key) {
            return found.clone();
        }
        let mut registry = self.registry.write().await;
        registry
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(record = type_name, "relation target bound to its default collection");
                key
            })
            .clone()
    }

    /// Checks out a model for a registered record type.
    pub async fn model<D: Record>(self: &Arc<Self>) -> MapperResult<Model<D, B>> {
        let collection = self.resolve_collection(D::type_name()).await?;
        Ok(Model::new(Arc::clone(self), collection))
    }

    /// Direct access to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Shuts the backend down. The connection must not be used afterwards.
    pub async fn shutdown(&self) -> MapperResult<()> {
        self.backend.shutdown().await
    }
}
