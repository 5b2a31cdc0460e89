//! # Storage engine seam
//!
//! The typed [`crate::Store`] never touches storage directly; it talks to a
//! [`StorageEngine`] (the "factory" that opens databases by name) and to the
//! [`Connection`] it returns. Implementations live in sibling modules:
//!
//! | Engine | Module | Platform |
//! |--------|--------|----------|
//! | [`crate::MemoryEngine`] | `memory` | everywhere; tests and ephemeral use |
//! | [`crate::FileEngine`] | `file_store` | desktop and mobile |
//! | `IdbEngine` | `idb` | browser (`wasm32` + `web` feature) |
//!
//! Engines own index maintenance: a `put` replaces the record with the same
//! primary key and updates every index of the collection, and a `query` returns
//! all records whose key at the index's key path equals the given key.
//!
//! The futures carry no `Send` bound so the IndexedDB engine can implement the
//! same traits on a single-threaded browser executor.

use std::future::Future;

use crate::error::Result;
use crate::key::{Document, IndexKey};
use crate::schema::StoreSchema;

/// Opens named, versioned databases.
pub trait StorageEngine {
    type Connection: Connection;

    /// Open (creating if absent) the database described by `schema`, running the
    /// upgrade step when the declared version is newer than the stored one.
    fn open(&self, schema: &StoreSchema) -> impl Future<Output = Result<Self::Connection>>;

    /// Remove a database and all its records. Missing databases are ignored.
    fn delete_database(&self, name: &str) -> impl Future<Output = Result<()>>;
}

/// An open database.
pub trait Connection {
    /// Schema the database was opened with.
    fn schema(&self) -> &StoreSchema;

    /// Insert or replace a record. The primary key is read from the document.
    fn put(&self, collection: &str, doc: Document) -> impl Future<Output = Result<()>>;

    fn get(&self, collection: &str, id: &str) -> impl Future<Output = Result<Option<Document>>>;

    /// Delete a record. Deleting an absent id is not an error.
    fn delete(&self, collection: &str, id: &str) -> impl Future<Output = Result<()>>;

    fn query(
        &self,
        collection: &str,
        index: &str,
        key: &IndexKey,
    ) -> impl Future<Output = Result<Vec<Document>>>;

    fn all(&self, collection: &str) -> impl Future<Output = Result<Vec<Document>>>;

    fn count(&self, collection: &str) -> impl Future<Output = Result<usize>>;

    fn clear(&self, collection: &str) -> impl Future<Output = Result<()>>;

    fn close(self) -> impl Future<Output = ()>;
}
