//! Main docmap crate: relation-aware object-document mapping.
//!
//! This crate is the primary entry point for the docmap framework. It
//! re-exports the core mapping layer and provides convenient access to the
//! storage backends.
//!
//! # Features
//!
//! - **Typed records over schema-less storage** - Define record types with
//!   Serde; identity and timestamps are managed for you
//! - **Declared relations** - One-to-one and one-to-many relation fields
//!   stored as references, populated on demand
//! - **Chainable queries** - Composable filters, projection, sorting, and
//!   pagination against any backend
//! - **Multiple backends** - In-memory storage out of the box, MongoDB
//!   behind the `mongodb` feature
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::MemoryStore};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Person {
//!     #[serde(flatten)]
//!     pub meta: RecordMeta,
//!     pub first_name: String,
//!     pub last_name: String,
//!     pub manager: One<Person>,
//! }
//!
//! impl Record for Person {
//!     fn type_name() -> &'static str { "person" }
//!     fn meta(&self) -> &RecordMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut RecordMeta { &mut self.meta }
//!     fn relations() -> RelationSchema {
//!         RelationSchema::new().one("manager", "person")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> MapperResult<()> {
//!     let connection = Connection::new(MemoryStore::new());
//!     connection.register::<Person>("people").await?;
//!
//!     let people = connection.model::<Person>().await?;
//!
//!     let mut boss = Person {
//!         meta: RecordMeta::unsaved(),
//!         first_name: "Tricia".to_string(),
//!         last_name: "McMillan".to_string(),
//!         manager: None,
//!     };
//!     people.save(&mut boss).await?;
//!
//!     let mut arthur = Person {
//!         meta: RecordMeta::unsaved(),
//!         first_name: "Arthur".to_string(),
//!         last_name: "Dent".to_string(),
//!         manager: Some(Related::doc(boss)),
//!     };
//!     people.save(&mut arthur).await?;
//!
//!     // Stored as a reference, fetched back as a live record on demand.
//!     let found = people
//!         .find(Filter::eq("last_name", "Dent"))
//!         .populate("manager")
//!         .one()
//!         .await?;
//!     println!("{:?}", found.manager);
//!
//!     connection.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires the `mongodb`
//!   feature)

pub mod prelude;

pub use docmap_core::{backend, connection, document, error, finder, model, query, relation};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmap_memory::{MemoryStore, MemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoStore, MongoStoreBuilder};
}
