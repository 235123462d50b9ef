//! MongoDB backend for the docmap object-document mapper.
//!
//! [`MongoStore`] implements the backend primitives on top of the official
//! async driver. Build one with [`MongoStoreBuilder`], which takes hosts, a
//! database name, and optional credentials.

mod query;
mod store;

pub use store::{MongoStore, MongoStoreBuilder};
