//! Chainable finders and one-level relation population.
//!
//! A [`ModelQuery`] is started from a [`Model`](crate::model::Model),
//! refined with chainable settings, and terminated with
//! [`count`](ModelQuery::count), [`all`](ModelQuery::all), or
//! [`one`](ModelQuery::one). Fields named with
//! [`populate`](ModelQuery::populate) are swapped from stored references to
//! live sub-documents before decoding, one batched lookup per relation
//! field. Population goes exactly one level deep: relation fields of the
//! fetched targets stay in reference form.

use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use bson::{Bson, Document, Uuid, de::deserialize_from_bson};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    connection::Connection,
    document::{ID_FIELD, Record},
    error::{MapperError, MapperResult},
    query::{Expr, Filter, Query, Sort, SortDirection},
    relation::{RelationField, RelationKind, decode_reference},
};

/// A query under construction against one model's collection.
///
/// Chainable settings consume and return the finder; nothing touches the
/// backend until a terminal operation is awaited.
pub struct ModelQuery<D: Record, B: StoreBackend> {
    connection: Arc<Connection<B>>,
    collection: String,
    query: Query,
    populate: Vec<String>,
    _record: PhantomData<fn() -> D>,
}

impl<D: Record, B: StoreBackend> ModelQuery<D, B> {
    pub(crate) fn new(
        connection: Arc<Connection<B>>,
        collection: String,
        filter: Option<Expr>,
    ) -> Self {
        ModelQuery {
            connection,
            collection,
            query: Query { filter, ..Query::default() },
            populate: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Restricts returned documents to the given fields.
    ///
    /// The identifier is always kept, and fields named in
    /// [`populate`](Self::populate) are re-added before the query runs so
    /// population always has its references.
    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.query
            .projection
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Appends a sort key; later keys break ties.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Caps the number of returned records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Skips the first `skip` matching records.
    pub fn skip(mut self, skip: usize) -> Self {
        self.query.offset = Some(skip);
        self
    }

    /// Requests population of a declared relation field.
    ///
    /// Naming a field the record type does not declare fails the terminal
    /// operation with a `Schema` error. Repeats are harmless.
    pub fn populate(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.populate.contains(&field) {
            self.populate.push(field);
        }
        self
    }

    /// Counts matching records without fetching them.
    ///
    /// Projection, sorting, and pagination settings are ignored.
    pub async fn count(self) -> MapperResult<u64> {
        let query = Query { filter: self.query.filter, ..Query::default() };
        self.connection
            .backend()
            .count_documents(query, &self.collection)
            .await
    }

    /// Runs the query and decodes every match.
    pub async fn all(self) -> MapperResult<Vec<D>> {
        let documents = self.fetch().await?;
        documents
            .into_iter()
            .map(|document| Ok(deserialize_from_bson(Bson::Document(document))?))
            .collect()
    }

    /// Runs the query and decodes the first match.
    ///
    /// No match is a `NotFound` error naming the collection.
    pub async fn one(mut self) -> MapperResult<D> {
        self.query.limit = Some(1);
        let collection = self.collection.clone();
        let mut documents = self.fetch().await?;
        match documents.pop() {
            Some(document) => Ok(deserialize_from_bson(Bson::Document(document))?),
            None => Err(MapperError::NotFound(collection)),
        }
    }

    /// Resolves requested population names against the record type's
    /// relation declarations.
    fn requested_relations(&self) -> MapperResult<Vec<RelationField>> {
        let schema = D::relations();
        self.populate
            .iter()
            .map(|name| {
                schema.get(name).cloned().ok_or_else(|| {
                    MapperError::Schema(format!(
                        "record type {:?} declares no relation field {name:?}",
                        D::type_name()
                    ))
                })
            })
            .collect()
    }

    async fn fetch(mut self) -> MapperResult<Vec<Document>> {
        let relations = self.requested_relations()?;
        if !self.query.projection.is_empty() {
            for field in &relations {
                if !self.query.projection.iter().any(|f| f == field.name()) {
                    self.query.projection.push(field.name().to_string());
                }
            }
        }

        let raw = self
            .connection
            .backend()
            .query_documents(self.query, &self.collection)
            .await?;
        let mut documents = Vec::with_capacity(raw.len());
        for value in raw {
            match value {
                Bson::Document(document) => documents.push(document),
                other => {
                    return Err(MapperError::Backend(format!(
                        "collection {:?} returned a non-document value: {:?}",
                        self.collection,
                        other.element_type()
                    )));
                }
            }
        }

        for document in &mut documents {
            normalize_relations::<D>(document);
        }
        for field in &relations {
            populate_field(&self.connection, &mut documents, field).await?;
        }
        Ok(documents)
    }
}

/// A one-to-many relation field absent or null in the raw document becomes
/// an empty array, so decoded records always hold a sequence.
pub(crate) fn normalize_relations<D: Record>(document: &mut Document) {
    for field in D::relations().iter() {
        if field.kind() != RelationKind::OneToMany {
            continue;
        }
        match document.get(field.name()) {
            None | Some(Bson::Null) => {
                document.insert(field.name(), Bson::Array(Vec::new()));
            }
            Some(_) => {}
        }
    }
}

/// Swaps one relation field from references to sub-documents across a
/// result set, with a single batched lookup against the target collection.
///
/// A one-to-one reference whose target is gone is a `NotFound` error; a
/// one-to-many sequence silently drops vanished targets, so the field is
/// always a (possibly empty) sequence of live records afterwards.
pub(crate) async fn populate_field<B: StoreBackend>(
    connection: &Arc<Connection<B>>,
    documents: &mut [Document],
    field: &RelationField,
) -> MapperResult<()> {
    let mut wanted: Vec<Uuid> = Vec::new();
    for document in documents.iter() {
        match document.get(field.name()) {
            None | Some(Bson::Null) => {}
            Some(Bson::Array(items)) if field.kind() == RelationKind::OneToMany => {
                for item in items {
                    wanted.push(decode_reference(item)?);
                }
            }
            Some(value) if field.kind() == RelationKind::OneToOne => {
                wanted.push(decode_reference(value)?);
            }
            Some(other) => {
                return Err(MapperError::Schema(format!(
                    "relation field {:?} is declared {} but stored as {:?}",
                    field.name(),
                    field.kind().as_str(),
                    other.element_type()
                )));
            }
        }
    }
    wanted.sort_unstable();
    wanted.dedup();
    if wanted.is_empty() {
        return Ok(());
    }

    let target = connection.resolve_or_bind(field.target()).await;
    let references: Vec<Bson> = wanted.iter().map(|id| Bson::from(*id)).collect();
    let query = Query {
        filter: Some(Filter::any_of(ID_FIELD, Bson::Array(references))),
        ..Query::default()
    };
    let fetched = connection
        .backend()
        .query_documents(query, &target)
        .await?;
    debug!(
        field = field.name(),
        target = %target,
        requested = wanted.len(),
        found = fetched.len(),
        "relation field populated"
    );

    let mut by_id: HashMap<Uuid, Document> = HashMap::with_capacity(fetched.len());
    for value in fetched {
        if let Bson::Document(child) = value {
            if let Some(id) = child.get(ID_FIELD) {
                by_id.insert(decode_reference(id)?, child);
            }
        }
    }

    for document in documents.iter_mut() {
        let Some(value) = document.get(field.name()) else {
            continue;
        };
        let substituted = match value {
            Bson::Null => continue,
            Bson::Array(items) => {
                let mut populated = Vec::with_capacity(items.len());
                for item in items {
                    let id = decode_reference(item)?;
                    if let Some(child) = by_id.get(&id) {
                        populated.push(Bson::Document(child.clone()));
                    }
                }
                Bson::Array(populated)
            }
            reference => {
                let id = decode_reference(reference)?;
                match by_id.get(&id) {
                    Some(child) => Bson::Document(child.clone()),
                    None => return Err(MapperError::NotFound(target)),
                }
            }
        };
        document.insert(field.name(), substituted);
    }
    Ok(())
}
