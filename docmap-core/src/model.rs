//! Models: typed handles over one collection.
//!
//! A [`Model`] pairs a record type with its registered collection and the
//! shared [`Connection`](crate::connection::Connection). Reads go through
//! the chainable [`ModelQuery`](crate::finder::ModelQuery); writes go
//! through [`Model::save`], which reduces declared relation fields to bare
//! references before anything reaches the backend.

use std::{marker::PhantomData, sync::Arc};

use bson::{Bson, DateTime, Document, Uuid, de::deserialize_from_bson};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    connection::Connection,
    document::{CREATED_AT_FIELD, ID_FIELD, Record, RecordExt, UPDATED_AT_FIELD},
    error::{MapperError, MapperResult},
    finder::{ModelQuery, normalize_relations, populate_field},
    query::{Expr, Filter},
    relation::{RelationField, RelationKind, RelationSchema, reference_of},
};

/// A typed handle over one collection.
///
/// Checked out from a connection with
/// [`Connection::model`](crate::connection::Connection::model); cheap to
/// clone and to recreate.
pub struct Model<D: Record, B: StoreBackend> {
    connection: Arc<Connection<B>>,
    collection: String,
    _record: PhantomData<fn() -> D>,
}

impl<D: Record, B: StoreBackend> Clone for Model<D, B> {
    fn clone(&self) -> Self {
        Model {
            connection: Arc::clone(&self.connection),
            collection: self.collection.clone(),
            _record: PhantomData,
        }
    }
}

impl<D: Record, B: StoreBackend> std::fmt::Debug for Model<D, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("record", &D::type_name())
            .field("collection", &self.collection)
            .finish()
    }
}

impl<D: Record, B: StoreBackend> Model<D, B> {
    pub(crate) fn new(connection: Arc<Connection<B>>, collection: String) -> Self {
        Model { connection, collection, _record: PhantomData }
    }

    /// The collection this model reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Starts a query matching every record in the collection.
    pub fn find_all(&self) -> ModelQuery<D, B> {
        ModelQuery::new(Arc::clone(&self.connection), self.collection.clone(), None)
    }

    /// Starts a query with a filter expression.
    pub fn find(&self, filter: Expr) -> ModelQuery<D, B> {
        ModelQuery::new(
            Arc::clone(&self.connection),
            self.collection.clone(),
            Some(filter),
        )
    }

    /// Starts a query for the first record matching a filter.
    ///
    /// Identical to [`find`](Self::find); terminate it with
    /// [`one`](ModelQuery::one).
    pub fn find_one(&self, filter: Expr) -> ModelQuery<D, B> {
        self.find(filter)
    }

    /// Starts a query for the record with the given identifier.
    pub fn find_by_id(&self, id: Uuid) -> ModelQuery<D, B> {
        self.find(Filter::eq(ID_FIELD, id))
    }

    /// Expands relation fields of an already fetched record in place, one
    /// level deep.
    ///
    /// The named fields must be declared in the record type's relation
    /// schema and must currently hold reference form, as fetched records
    /// do. Repeats are harmless.
    pub async fn populate(&self, record: &mut D, fields: &[&str]) -> MapperResult<()> {
        let schema = D::relations();
        let mut requested: Vec<RelationField> = Vec::with_capacity(fields.len());
        for name in fields {
            let Some(field) = schema.get(name) else {
                return Err(MapperError::Schema(format!(
                    "record type {:?} declares no relation field {name:?}",
                    D::type_name()
                )));
            };
            if !requested.iter().any(|f| f.name() == field.name()) {
                requested.push(field.clone());
            }
        }

        let mut document = match record.to_bson()? {
            Bson::Document(document) => document,
            other => {
                return Err(MapperError::Schema(format!(
                    "record type {:?} serialized as {:?}, expected a document",
                    D::type_name(),
                    other.element_type()
                )));
            }
        };
        normalize_relations::<D>(&mut document);
        let mut documents = vec![document];
        for field in &requested {
            populate_field(&self.connection, &mut documents, field).await?;
        }
        if let Some(document) = documents.pop() {
            *record = deserialize_from_bson(Bson::Document(document))?;
        }
        Ok(())
    }

    /// Creates an index on a field of this collection, idempotently.
    pub async fn ensure_index(&self, field: &str, unique: bool) -> MapperResult<()> {
        self.connection
            .backend()
            .ensure_index(&self.collection, field, unique)
            .await
    }

    /// Persists a record, assigning identity and timestamps.
    ///
    /// Declared relation fields are reduced to bare references on a
    /// serialized copy; the record's own fields are never rewritten. A
    /// record without an identifier is inserted under a fresh one; a record
    /// with an identifier replaces the stored document wholesale. The
    /// record's binding metadata is updated only after the backend write
    /// succeeds, so a failed save leaves the record exactly as it was.
    pub async fn save(&self, record: &mut D) -> MapperResult<()> {
        let mut document = match record.to_bson()? {
            Bson::Document(document) => document,
            other => {
                return Err(MapperError::Schema(format!(
                    "record type {:?} serialized as {:?}, expected a document",
                    D::type_name(),
                    other.element_type()
                )));
            }
        };
        flatten_relations(&mut document, &D::relations())?;

        let now = DateTime::now();
        match record.meta().id {
            None => {
                let id = Uuid::new();
                document.insert(ID_FIELD, id);
                document.insert(CREATED_AT_FIELD, now);
                document.insert(UPDATED_AT_FIELD, now);
                self.connection
                    .backend()
                    .insert_document(id, Bson::Document(document), &self.collection)
                    .await?;
                let meta = record.meta_mut();
                meta.id = Some(id);
                meta.created_at = Some(now);
                meta.updated_at = Some(now);
                debug!(collection = %self.collection, %id, "record inserted");
            }
            Some(id) => {
                document.insert(ID_FIELD, id);
                document.insert(UPDATED_AT_FIELD, now);
                self.connection
                    .backend()
                    .upsert_document(id, Bson::Document(document), &self.collection)
                    .await?;
                record.meta_mut().updated_at = Some(now);
                debug!(collection = %self.collection, %id, "record replaced");
            }
        }
        Ok(())
    }
}

/// Reduces every declared relation field in a serialized document to its
/// reference form.
///
/// One-to-one fields become a single identifier; one-to-many fields become
/// an identifier array preserving element order. Absent and null fields are
/// left alone. A live child without an identifier fails the whole save.
pub(crate) fn flatten_relations(
    document: &mut Document,
    schema: &RelationSchema,
) -> MapperResult<()> {
    for field in schema.iter() {
        let Some(value) = document.get(field.name()) else {
            continue;
        };
        if matches!(value, Bson::Null) {
            continue;
        }
        let flattened = match field.kind() {
            RelationKind::OneToOne => Bson::from(reference_of(value)?),
            RelationKind::OneToMany => match value {
                Bson::Array(items) => {
                    let mut references = Vec::with_capacity(items.len());
                    for item in items {
                        references.push(Bson::from(reference_of(item)?));
                    }
                    Bson::Array(references)
                }
                other => {
                    return Err(MapperError::Schema(format!(
                        "relation field {:?} is declared {} but serialized as {:?}",
                        field.name(),
                        field.kind().as_str(),
                        other.element_type()
                    )));
                }
            },
        };
        document.insert(field.name(), flattened);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn schema() -> RelationSchema {
        RelationSchema::new()
            .one("manager", "person")
            .many("reports", "person")
    }

    #[test]
    fn flatten_reduces_live_children_to_references() {
        let manager_id = Uuid::new();
        let first = Uuid::new();
        let second = Uuid::new();
        let mut document = doc! {
            "first_name": "Arthur",
            "manager": { "_id": manager_id, "first_name": "Tricia" },
            "reports": [
                { "_id": first, "first_name": "Ford" },
                Bson::from(second),
            ],
        };

        flatten_relations(&mut document, &schema()).unwrap();

        assert_eq!(document.get("manager"), Some(&Bson::from(manager_id)));
        assert_eq!(
            document.get("reports"),
            Some(&Bson::Array(vec![Bson::from(first), Bson::from(second)]))
        );
        assert_eq!(document.get_str("first_name").unwrap(), "Arthur");
    }

    #[test]
    fn flatten_leaves_null_and_absent_fields_alone() {
        let mut document = doc! { "manager": Bson::Null };
        flatten_relations(&mut document, &schema()).unwrap();
        assert_eq!(document.get("manager"), Some(&Bson::Null));
        assert!(document.get("reports").is_none());
    }

    #[test]
    fn flatten_rejects_unsaved_children() {
        let mut document = doc! { "manager": { "first_name": "Zaphod" } };
        let err = flatten_relations(&mut document, &schema()).unwrap_err();
        assert!(matches!(err, MapperError::Schema(_)));
    }

    #[test]
    fn flatten_rejects_scalar_many_fields() {
        let mut document = doc! { "reports": Bson::from(Uuid::new()) };
        let err = flatten_relations(&mut document, &schema()).unwrap_err();
        assert!(matches!(err, MapperError::Schema(_)));
    }
}
