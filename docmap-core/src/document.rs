//! Record traits and the storage metadata every persisted record carries.
//!
//! A record type is a plain serde struct that embeds [`RecordMeta`]
//! (flattened) and implements [`Record`]. The meta block is the only state
//! the engine writes back into a record: the store-assigned identifier and
//! the creation/update timestamps. Records hold no collection or connection
//! handles; binding lives in [`Model`](crate::model::Model).

use bson::{Bson, DateTime, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::{error::MapperResult, relation::RelationSchema};

/// Document field holding the record identifier.
pub const ID_FIELD: &str = "_id";
/// Document field holding the creation timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Document field holding the last-update timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Core trait every persisted record type must implement.
///
/// # Example
///
/// ```ignore
/// use docmap_core::document::{Record, RecordMeta};
/// use docmap_core::relation::{One, Many, RelationSchema};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Person {
///     #[serde(flatten)]
///     pub meta: RecordMeta,
///     pub name: String,
///     pub manager: One<Person>,
///     #[serde(default)]
///     pub reports: Many<Person>,
/// }
///
/// impl Record for Person {
///     fn type_name() -> &'static str {
///         "person"
///     }
///
///     fn meta(&self) -> &RecordMeta {
///         &self.meta
///     }
///
///     fn meta_mut(&mut self) -> &mut RecordMeta {
///         &mut self.meta
///     }
///
///     fn relations() -> RelationSchema {
///         RelationSchema::new()
///             .one("manager", "person")
///             .many("reports", "person")
///     }
/// }
/// ```
pub trait Record: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Logical type name used as the registry key. Matched
    /// case-insensitively; keep it a lowercase identifier.
    fn type_name() -> &'static str;

    /// Returns this record's storage metadata.
    fn meta(&self) -> &RecordMeta;

    /// Returns mutable storage metadata. Only the engine should assign the
    /// identifier; it is set once, at first successful save.
    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Declares the record's relation fields. Defaults to no relations.
    fn relations() -> RelationSchema {
        RelationSchema::new()
    }

    /// Validation hook. Present for forward compatibility; the save engine
    /// does not invoke it and [`MapperError::Validation`](crate::error::MapperError)
    /// is never raised.
    fn validate(&self) -> Result<(), Vec<String>> {
        Ok(())
    }
}

/// Storage metadata carried by every record, flattened into its document.
///
/// `id` is `None` until the first successful save assigns a store identifier.
/// Both timestamps are stamped on first save (equal); later saves advance
/// `updated_at` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl RecordMeta {
    /// A meta block for a record that has never been saved.
    pub fn unsaved() -> Self {
        Self::default()
    }

    /// Whether the record has been assigned a store identifier.
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// Extension trait with serialization utilities, implemented for every
/// [`Record`].
pub trait RecordExt: Record {
    /// Converts this record to its BSON storage form.
    fn to_bson(&self) -> MapperResult<Bson>;

    /// Rebuilds a record from a BSON value.
    fn from_bson(bson: Bson) -> MapperResult<Self>;

    /// Converts this record to a JSON value.
    fn to_json(&self) -> MapperResult<Value>;

    /// Rebuilds a record from a JSON value.
    fn from_json(value: Value) -> MapperResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_bson(&self) -> MapperResult<Bson> {
        Ok(serialize_to_bson(self)?)
    }

    fn from_bson(bson: Bson) -> MapperResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }

    fn to_json(&self) -> MapperResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> MapperResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        #[serde(flatten)]
        meta: RecordMeta,
        body: String,
    }

    impl Record for Note {
        fn type_name() -> &'static str {
            "note"
        }

        fn meta(&self) -> &RecordMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut RecordMeta {
            &mut self.meta
        }
    }

    #[test]
    fn unsaved_meta_serializes_without_identity_fields() {
        let note = Note { meta: RecordMeta::unsaved(), body: "hi".into() };
        let doc = note
            .to_bson()
            .unwrap()
            .as_document()
            .cloned()
            .unwrap();

        assert!(doc.get(ID_FIELD).is_none());
        assert!(doc.get(CREATED_AT_FIELD).is_none());
        assert_eq!(doc.get_str("body").unwrap(), "hi");
    }

    #[test]
    fn meta_round_trips_through_bson() {
        let mut note = Note { meta: RecordMeta::unsaved(), body: "hi".into() };
        note.meta.id = Some(Uuid::new());
        note.meta.created_at = Some(DateTime::now());
        note.meta.updated_at = note.meta.created_at;

        let restored = Note::from_bson(note.to_bson().unwrap()).unwrap();
        assert_eq!(restored.meta, note.meta);
        assert_eq!(restored.body, "hi");
    }
}
