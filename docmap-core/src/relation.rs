//! Relation declarations and relation field values.
//!
//! Relations are declared per record type as an explicit [`RelationSchema`]
//! consulted by the save and populate engines; the engine never inspects
//! live field metadata at runtime. An in-memory relation field holds a
//! [`Related`] value: either a bare reference ([`Related::Id`]) or a live
//! nested record ([`Related::Doc`]). Storage form is always the reference:
//! a single identifier for one-to-one, an ordered identifier array for
//! one-to-many, never an embedded sub-document.

use bson::{Bson, Uuid, de::deserialize_from_bson, spec::BinarySubtype};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{DeserializeOwned, Error as _},
};

use crate::{
    document::{ID_FIELD, Record},
    error::{MapperError, MapperResult},
};

/// Cardinality of a relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// A single reference to one target record.
    OneToOne,
    /// An ordered sequence of references to target records.
    OneToMany,
}

impl RelationKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneToOne => "one-to-one",
            RelationKind::OneToMany => "one-to-many",
        }
    }
}

/// Declaration of one relation field: its document field name, the logical
/// name of the target record type, its kind, and the autosave flag.
///
/// Autosave is carried so declarations round-trip, but the save engine does
/// not act on it: children must be saved before the parent.
#[derive(Debug, Clone)]
pub struct RelationField {
    name: &'static str,
    target: &'static str,
    kind: RelationKind,
    autosave: bool,
}

impl RelationField {
    /// Declares a one-to-one relation field.
    pub fn one(name: &'static str, target: &'static str) -> Self {
        Self { name, target, kind: RelationKind::OneToOne, autosave: false }
    }

    /// Declares a one-to-many relation field.
    pub fn many(name: &'static str, target: &'static str) -> Self {
        Self { name, target, kind: RelationKind::OneToMany, autosave: false }
    }

    /// Sets the autosave flag (carried, not acted on).
    pub fn autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// The document field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Logical name of the target record type.
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// The declared cardinality.
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Whether autosave was requested for this field.
    pub fn is_autosave(&self) -> bool {
        self.autosave
    }
}

/// The set of relation fields a record type declares.
///
/// Built fluently alongside the type:
///
/// ```ignore
/// RelationSchema::new()
///     .one("manager", "person")
///     .many("reports", "person")
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelationSchema {
    fields: Vec<RelationField>,
}

impl RelationSchema {
    /// An empty schema (no relations).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fully built field declaration.
    pub fn field(mut self, field: RelationField) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a one-to-one relation.
    pub fn one(self, name: &'static str, target: &'static str) -> Self {
        self.field(RelationField::one(name, target))
    }

    /// Adds a one-to-many relation.
    pub fn many(self, name: &'static str, target: &'static str) -> Self {
        self.field(RelationField::many(name, target))
    }

    /// Looks up a declaration by document field name.
    pub fn get(&self, name: &str) -> Option<&RelationField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterates the declarations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationField> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// An in-memory relation value: a bare reference or a live nested record.
///
/// Serializes as whichever form it holds; deserializes from a stored
/// reference (binary uuid or canonical string) or from a populated
/// sub-document.
#[derive(Debug, Clone, PartialEq)]
pub enum Related<D> {
    /// Reference form: the target's store identifier.
    Id(Uuid),
    /// Live form: the nested target record.
    Doc(Box<D>),
}

/// A one-to-one relation field.
pub type One<D> = Option<Related<D>>;

/// A one-to-many relation field: an ordered sequence of relation values.
pub type Many<D> = Vec<Related<D>>;

impl<D> Related<D> {
    /// Wraps a live record.
    pub fn doc(record: D) -> Self {
        Related::Doc(Box::new(record))
    }

    /// Returns the nested record, if this value is in live form.
    pub fn record(&self) -> Option<&D> {
        match self {
            Related::Doc(doc) => Some(doc),
            Related::Id(_) => None,
        }
    }

    /// Consumes the value, returning the nested record if live.
    pub fn into_record(self) -> Option<D> {
        match self {
            Related::Doc(doc) => Some(*doc),
            Related::Id(_) => None,
        }
    }
}

impl<D: Record> Related<D> {
    /// The target's identifier, from either form. `None` for a live record
    /// that has never been saved.
    pub fn reference(&self) -> Option<Uuid> {
        match self {
            Related::Id(id) => Some(*id),
            Related::Doc(doc) => doc.meta().id,
        }
    }
}

impl<D> From<Uuid> for Related<D> {
    fn from(id: Uuid) -> Self {
        Related::Id(id)
    }
}

impl<D: Serialize> Serialize for Related<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Related::Id(id) => id.serialize(serializer),
            Related::Doc(doc) => doc.serialize(serializer),
        }
    }
}

impl<'de, D: DeserializeOwned> Deserialize<'de> for Related<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let value = Bson::deserialize(deserializer)?;
        match &value {
            Bson::Binary(_) | Bson::String(_) => decode_reference(&value)
                .map(Related::Id)
                .map_err(De::Error::custom),
            Bson::Document(_) => deserialize_from_bson::<D>(value)
                .map(Related::doc)
                .map_err(De::Error::custom),
            other => Err(De::Error::custom(format!(
                "expected a reference or sub-document for relation field, found {:?}",
                other.element_type()
            ))),
        }
    }
}

/// Decodes a stored reference value into an identifier.
///
/// Binary uuid values are taken as-is; strings must parse as a canonical
/// uuid (`InvalidId` otherwise); every other shape is a `Schema` error.
pub(crate) fn decode_reference(value: &Bson) -> MapperResult<Uuid> {
    match value {
        Bson::Binary(bin) if bin.subtype == BinarySubtype::Uuid => {
            let bytes: [u8; 16] = bin
                .bytes
                .as_slice()
                .try_into()
                .map_err(|_| MapperError::InvalidId("malformed uuid binary".to_string()))?;
            Ok(Uuid::from_bytes(bytes))
        }
        Bson::String(hex) => {
            Uuid::parse_str(hex).map_err(|_| MapperError::InvalidId(hex.clone()))
        }
        other => Err(MapperError::Schema(format!(
            "unsupported relation element shape: {:?}",
            other.element_type()
        ))),
    }
}

/// Reduces a serialized relation element to its reference.
///
/// A sub-document is a serialized live record and must already carry an
/// identifier: children are saved before parents.
pub(crate) fn reference_of(value: &Bson) -> MapperResult<Uuid> {
    match value {
        Bson::Document(child) => match child.get(ID_FIELD) {
            Some(id) => decode_reference(id),
            None => Err(MapperError::Schema(
                "relation child has no identifier; it was not saved before its parent"
                    .to_string(),
            )),
        },
        other => decode_reference(other),
    }
}
