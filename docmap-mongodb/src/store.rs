//! MongoDB storage backend.
//!
//! Maps the backend primitives onto the official driver: inserts and
//! replace-with-upsert writes, translated find queries, server-side counts,
//! and index creation. Duplicate-key failures (server code 11000) surface
//! as the mapper's `Duplicate` error so callers never match on driver
//! errors.

use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document, Uuid, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, Credential, FindOptions, IndexOptions},
};
use tracing::debug;

use docmap_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::ID_FIELD,
    error::{MapperError, MapperResult},
    query::{Query, QueryVisitor, SortDirection},
};

use crate::query::MongoQueryTranslator;

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Duplicate-key write failures become `Duplicate`; everything else is an
/// opaque `Backend` error.
fn map_error(error: MongoError, collection: &str) -> MapperError {
    if let ErrorKind::Write(WriteFailure::WriteError(ref write)) = *error.kind {
        if write.code == 11000 {
            return MapperError::Duplicate(collection.to_string());
        }
    }
    MapperError::Backend(error.to_string())
}

#[derive(Debug)]
pub struct MongoStore {
    client: Client,
    database: String,
}

impl MongoStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(database: &str) -> MongoStoreBuilder {
        MongoStoreBuilder::new(database)
    }

    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(name)
    }

    /// The stored document always carries the caller's identifier, whatever
    /// the serialized body said.
    fn prepare(&self, id: Uuid, document: Bson) -> MapperResult<Document> {
        match document {
            Bson::Document(mut document) => {
                document.insert(ID_FIELD, id);
                Ok(document)
            }
            other => Err(MapperError::Backend(format!(
                "expected a document to store, found {:?}",
                other.element_type()
            ))),
        }
    }

    fn find_options(query: &Query) -> FindOptions {
        let mut options = FindOptions::default();
        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if !query.sort.is_empty() {
            let mut sort = Document::new();
            for key in &query.sort {
                sort.insert(
                    key.field.clone(),
                    match key.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    },
                );
            }
            options.sort = Some(sort);
        }
        if !query.projection.is_empty() {
            let mut projection = Document::new();
            for field in &query.projection {
                projection.insert(field.clone(), 1);
            }
            options.projection = Some(projection);
        }
        options
    }

    fn filter_document(query: &Query) -> MapperResult<Document> {
        match &query.filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }
}

#[async_trait]
impl StoreBackend for MongoStore {
    async fn insert_document(
        &self,
        id: Uuid,
        document: Bson,
        collection: &str,
    ) -> MapperResult<()> {
        self.collection(collection)
            .insert_one(self.prepare(id, document)?)
            .await
            .map_err(|e| map_error(e, collection))?;
        Ok(())
    }

    async fn upsert_document(
        &self,
        id: Uuid,
        document: Bson,
        collection: &str,
    ) -> MapperResult<()> {
        self.collection(collection)
            .replace_one(doc! { ID_FIELD: id }, self.prepare(id, document)?)
            .upsert(true)
            .await
            .map_err(|e| map_error(e, collection))?;
        Ok(())
    }

    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> MapperResult<Vec<Bson>> {
        let options = Self::find_options(&query);
        let filter = Self::filter_document(&query)?;
        Ok(self
            .collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| map_error(e, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(e, collection))?
            .into_iter()
            .map(Bson::Document)
            .collect())
    }

    async fn count_documents(&self, query: Query, collection: &str) -> MapperResult<u64> {
        let filter = Self::filter_document(&query)?;
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| map_error(e, collection))
    }

    async fn ensure_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> MapperResult<()> {
        self.collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(IndexOptions::builder().unique(unique).build())
                    .build(),
            )
            .await
            .map_err(|e| map_error(e, collection))?;
        debug!(collection, field, unique, "index ensured");
        Ok(())
    }

    async fn shutdown(&self) -> MapperResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Builds a [`MongoStore`] from hosts, a database name, and optional
/// credentials. Server selection is capped at three seconds so an
/// unreachable deployment fails fast instead of hanging startup.
pub struct MongoStoreBuilder {
    uri: Option<String>,
    hosts: Vec<String>,
    database: String,
    credentials: Option<Credential>,
}

impl MongoStoreBuilder {
    pub fn new(database: &str) -> Self {
        Self {
            uri: None,
            hosts: Vec::new(),
            database: database.to_string(),
            credentials: None,
        }
    }

    /// Connects with a full connection string instead of a host list.
    pub fn with_uri(uri: impl Into<String>, database: &str) -> Self {
        Self {
            uri: Some(uri.into()),
            hosts: Vec::new(),
            database: database.to_string(),
            credentials: None,
        }
    }

    /// Adds a `host` or `host:port` address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    /// Authenticates with a username and password.
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(
            Credential::builder()
                .username(username.into())
                .password(password.into())
                .build(),
        );
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoStoreBuilder {
    type Backend = MongoStore;

    async fn build(self) -> MapperResult<Self::Backend> {
        if self.database.is_empty() {
            return Err(MapperError::Initialization(
                "no MongoDB database configured".to_string(),
            ));
        }
        let uri = match &self.uri {
            Some(uri) => uri.clone(),
            None if self.hosts.is_empty() => {
                return Err(MapperError::Initialization(
                    "no MongoDB hosts configured".to_string(),
                ));
            }
            None => format!("mongodb://{}", self.hosts.join(",")),
        };

        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| MapperError::Initialization(e.to_string()))?;
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        options.credential = self.credentials;

        let client = Client::with_options(options)
            .map_err(|e| MapperError::Initialization(e.to_string()))?;
        debug!(database = %self.database, "MongoDB client initialized");
        Ok(MongoStore::new(client, self.database))
    }
}
