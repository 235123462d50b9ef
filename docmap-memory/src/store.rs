//! In-memory storage backend.
//!
//! Documents are held as BSON values in nested HashMaps behind an
//! async-aware read-write lock. Queries scan the whole collection, which is
//! fine for tests and small datasets; unique indexes are enforced with a
//! scan on every write so duplicate-key behavior matches a real store.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document, Uuid};
use mea::rwlock::RwLock;
use tracing::debug;

use docmap_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::ID_FIELD,
    error::{MapperError, MapperResult},
    query::{Query, Sort, SortDirection},
};

use crate::evaluator::{Comparable, matches};

type CollectionMap = HashMap<String, Bson>;

#[derive(Debug, Clone, PartialEq)]
struct IndexSpec {
    field: String,
    unique: bool,
}

#[derive(Debug, Default)]
struct Inner {
    /// collection name -> (identifier string -> document)
    collections: HashMap<String, CollectionMap>,
    indexes: HashMap<String, Vec<IndexSpec>>,
}

/// Thread-safe in-memory storage backend.
///
/// Cloneable; clones share the same underlying data. Collections spring
/// into existence on first write.
#[derive(Default, Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing a `MemoryStore`.
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }
}

fn field_value<'a>(document: &'a Bson, field: &str) -> Option<&'a Bson> {
    document
        .as_document()
        .and_then(|doc| doc.get(field))
        .filter(|value| !matches!(value, Bson::Null))
}

/// Fails when any unique index on the collection already covers a value
/// the candidate document carries. `skip_key` exempts the document being
/// replaced.
fn check_unique_indexes(
    inner: &Inner,
    collection: &str,
    skip_key: Option<&str>,
    candidate: &Bson,
) -> MapperResult<()> {
    let Some(specs) = inner.indexes.get(collection) else {
        return Ok(());
    };
    let Some(existing) = inner.collections.get(collection) else {
        return Ok(());
    };
    for spec in specs.iter().filter(|spec| spec.unique) {
        let Some(value) = field_value(candidate, &spec.field) else {
            continue;
        };
        for (key, stored) in existing {
            if skip_key == Some(key.as_str()) {
                continue;
            }
            if let Some(other) = field_value(stored, &spec.field) {
                if Comparable::from(value) == Comparable::from(other) {
                    return Err(MapperError::Duplicate(collection.to_string()));
                }
            }
        }
    }
    Ok(())
}

fn compare_documents(a: &Bson, b: &Bson, sort: &[Sort]) -> Ordering {
    for key in sort {
        let left = field_value(a, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let right = field_value(b, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let ordering = match key.direction {
            SortDirection::Asc => left.partial_cmp(&right),
            SortDirection::Desc => right.partial_cmp(&left),
        }
        .unwrap_or(Ordering::Equal);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Keeps only the projected fields; the identifier always survives.
fn project(value: &Bson, fields: &[String]) -> Bson {
    let Some(source) = value.as_document() else {
        return value.clone();
    };
    let mut projected = Document::new();
    if let Some(id) = source.get(ID_FIELD) {
        projected.insert(ID_FIELD, id.clone());
    }
    for field in fields {
        if field == ID_FIELD {
            continue;
        }
        if let Some(found) = source.get(field) {
            projected.insert(field.clone(), found.clone());
        }
    }
    Bson::Document(projected)
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn insert_document(
        &self,
        id: Uuid,
        document: Bson,
        collection: &str,
    ) -> MapperResult<()> {
        let mut inner = self.inner.write().await;
        let key = id.to_string();
        if inner
            .collections
            .get(collection)
            .is_some_and(|map| map.contains_key(&key))
        {
            return Err(MapperError::Duplicate(collection.to_string()));
        }
        check_unique_indexes(&inner, collection, None, &document)?;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key, document);
        Ok(())
    }

    async fn upsert_document(
        &self,
        id: Uuid,
        document: Bson,
        collection: &str,
    ) -> MapperResult<()> {
        let mut inner = self.inner.write().await;
        let key = id.to_string();
        check_unique_indexes(&inner, collection, Some(&key), &document)?;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key, document);
        Ok(())
    }

    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> MapperResult<Vec<Bson>> {
        let inner = self.inner.read().await;
        let Some(map) = inner.collections.get(collection) else {
            return Ok(vec![]);
        };

        let mut results: Vec<Bson> = match &query.filter {
            Some(filter) => map
                .values()
                .filter(|value| matches(value, filter))
                .cloned()
                .collect(),
            None => map.values().cloned().collect(),
        };

        if !query.sort.is_empty() {
            results.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        let selected = results
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX));
        if query.projection.is_empty() {
            Ok(selected.collect())
        } else {
            Ok(selected
                .map(|value| project(&value, &query.projection))
                .collect())
        }
    }

    async fn count_documents(&self, query: Query, collection: &str) -> MapperResult<u64> {
        let inner = self.inner.read().await;
        let Some(map) = inner.collections.get(collection) else {
            return Ok(0);
        };
        let count = match &query.filter {
            Some(filter) => map.values().filter(|value| matches(value, filter)).count(),
            None => map.len(),
        };
        Ok(count as u64)
    }

    async fn ensure_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> MapperResult<()> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if unique {
            // Existing documents must not already collide.
            if let Some(map) = inner.collections.get(collection) {
                let mut seen: Vec<&Bson> = Vec::new();
                for stored in map.values() {
                    if let Some(value) = field_value(stored, field) {
                        if seen
                            .iter()
                            .any(|other| Comparable::from(*other) == Comparable::from(value))
                        {
                            return Err(MapperError::Duplicate(collection.to_string()));
                        }
                        seen.push(value);
                    }
                }
            }
        }

        let specs = inner.indexes.entry(collection.to_string()).or_default();
        let spec = IndexSpec { field: field.to_string(), unique };
        if !specs.contains(&spec) {
            debug!(collection, field, unique, "index created");
            specs.push(spec);
        }
        Ok(())
    }
}

/// Builder for [`MemoryStore`] instances. Holds no configuration today.
#[derive(Default)]
pub struct MemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for MemoryStoreBuilder {
    type Backend = MemoryStore;

    async fn build(self) -> MapperResult<Self::Backend> {
        Ok(MemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmap_core::query::Filter;

    fn person(name: &str, age: i32) -> (Uuid, Bson) {
        let id = Uuid::new();
        (id, Bson::Document(doc! { "_id": id, "name": name, "age": age }))
    }

    #[tokio::test]
    async fn insert_rejects_reused_identifiers() {
        let store = MemoryStore::new();
        let (id, doc) = person("Arthur", 42);
        store.insert_document(id, doc.clone(), "people").await.unwrap();
        let err = store.insert_document(id, doc, "people").await.unwrap_err();
        assert!(matches!(err, MapperError::Duplicate(collection) if collection == "people"));
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let store = MemoryStore::new();
        let (id, doc) = person("Arthur", 42);
        store.upsert_document(id, doc, "people").await.unwrap();
        let replacement = Bson::Document(doc! { "_id": id, "name": "Arthur", "age": 43 });
        store.upsert_document(id, replacement, "people").await.unwrap();

        let query = Query {
            filter: Some(Filter::eq("_id", id)),
            ..Query::default()
        };
        let found = store.query_documents(query, "people").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_document().unwrap().get_i32("age").unwrap(), 43);
    }

    #[tokio::test]
    async fn unique_index_blocks_colliding_writes() {
        let store = MemoryStore::new();
        store.ensure_index("people", "name", true).await.unwrap();

        let (id, doc) = person("Arthur", 42);
        store.insert_document(id, doc, "people").await.unwrap();

        let (other, rival) = person("Arthur", 30);
        let err = store
            .insert_document(other, rival, "people")
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::Duplicate(_)));

        // Replacing a document with itself is not a collision.
        let replacement = Bson::Document(doc! { "_id": id, "name": "Arthur", "age": 43 });
        store.upsert_document(id, replacement, "people").await.unwrap();
    }

    #[tokio::test]
    async fn unique_index_rejects_existing_collisions() {
        let store = MemoryStore::new();
        let (a, doc_a) = person("Arthur", 42);
        let (b, doc_b) = person("Arthur", 30);
        store.insert_document(a, doc_a, "people").await.unwrap();
        store.insert_document(b, doc_b, "people").await.unwrap();

        let err = store.ensure_index("people", "name", true).await.unwrap_err();
        assert!(matches!(err, MapperError::Duplicate(_)));
    }

    #[tokio::test]
    async fn query_honors_filter_sort_and_pagination() {
        let store = MemoryStore::new();
        for (name, age) in [("Arthur", 42), ("Ford", 200), ("Tricia", 30), ("Zaphod", 250)] {
            let (id, doc) = person(name, age);
            store.insert_document(id, doc, "people").await.unwrap();
        }

        let query = Query::builder()
            .filter(Filter::gt("age", 35))
            .sort("age", SortDirection::Desc)
            .limit(2)
            .offset(1)
            .build();
        let found = store.query_documents(query, "people").await.unwrap();
        let names: Vec<&str> = found
            .iter()
            .map(|value| value.as_document().unwrap().get_str("name").unwrap())
            .collect();
        assert_eq!(names, vec!["Ford", "Arthur"]);
    }

    #[tokio::test]
    async fn projection_always_keeps_the_identifier() {
        let store = MemoryStore::new();
        let (id, doc) = person("Arthur", 42);
        store.insert_document(id, doc, "people").await.unwrap();

        let query = Query::builder().project(["age"]).build();
        let found = store.query_documents(query, "people").await.unwrap();
        let projected = found[0].as_document().unwrap();
        assert!(projected.get("_id").is_some());
        assert!(projected.get("age").is_some());
        assert!(projected.get("name").is_none());
    }

    #[tokio::test]
    async fn count_ignores_pagination() {
        let store = MemoryStore::new();
        for (name, age) in [("Arthur", 42), ("Ford", 200), ("Tricia", 30)] {
            let (id, doc) = person(name, age);
            store.insert_document(id, doc, "people").await.unwrap();
        }

        let query = Query::builder()
            .filter(Filter::gt("age", 35))
            .limit(1)
            .build();
        assert_eq!(store.count_documents(query, "people").await.unwrap(), 2);
        assert_eq!(
            store
                .count_documents(Query::default(), "missing")
                .await
                .unwrap(),
            0
        );
    }
}
