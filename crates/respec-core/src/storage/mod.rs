//! # Storage Backends
//!
//! Concrete implementations of the database seams.
//!
//! Only the embedded in-memory backend lives in the core; production
//! deployments implement [`crate::backend::SchemaAdmin`] and
//! [`crate::backend::QueryBackend`] over their datastore's driver.

mod memory;

pub use memory::MemoryDatabase;
