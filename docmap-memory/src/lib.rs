//! In-memory backend for the docmap object-document mapper.
//!
//! [`MemoryStore`] keeps every collection in process memory behind an
//! async read-write lock. It backs tests and small tools; swap in a
//! persistent backend for real data.

mod evaluator;
mod store;

pub use store::{MemoryStore, MemoryStoreBuilder};
