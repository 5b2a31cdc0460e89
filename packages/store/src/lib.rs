//! # inochi-store — local data layer for the dog health tracker
//!
//! Typed, indexed storage for three record types ([`Dog`], [`DailyLog`],
//! [`Photo`]) on a single device. A [`Store`] is opened explicitly on a
//! [`StorageEngine`]: [`MemoryEngine`] for tests, [`FileEngine`] on desktop and
//! mobile, `IdbEngine` (IndexedDB) in the browser with the `web` feature.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod key;
pub mod models;
pub mod schema;
pub mod store;
pub mod validate;

mod memory;
pub use memory::{MemoryConnection, MemoryEngine};

#[cfg(not(target_arch = "wasm32"))]
mod file_store;
#[cfg(not(target_arch = "wasm32"))]
pub use file_store::{FileConnection, FileEngine};

#[cfg(all(target_arch = "wasm32", feature = "web"))]
mod idb;
#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub use idb::{IdbConnection, IdbEngine};

pub use config::StoreConfig;
pub use engine::{Connection, StorageEngine};
pub use error::{Result, StoreError, ValidationError};
pub use key::{Document, IndexKey};
pub use models::{DailyLog, Dog, Photo, Record};
pub use schema::{CollectionSchema, IndexDef, StoreSchema};
pub use store::{open_store, Store, Table};
pub use validate::Validate;
