//! # IndexedDB engine — browser-side persistence
//!
//! [`IdbEngine`] is the [`StorageEngine`] used on the **web platform**. It maps a
//! [`StoreSchema`] onto an IndexedDB database through the [`rexie`] crate (a Rust
//! wrapper around the IndexedDB API).
//!
//! ## Mapping
//!
//! | Schema | IndexedDB |
//! |--------|-----------|
//! | store name + version | database name + version |
//! | collection | object store with `keyPath` = primary key |
//! | index `dogId` | index `dogId` on key path `dogId` |
//! | index `dogId+logDate` | index `dogId+logDate` on array key path `["dogId", "logDate"]` |
//! | unique index | index with `unique: true` |
//!
//! Records cross the JS boundary as plain objects, converted from and to
//! [`Document`]s with `serde_wasm_bindgen`'s JSON-compatible serializer.
//!
//! ## Versioning
//!
//! IndexedDB runs its own upgrade transaction: opening with a higher version
//! creates the declared object stores and indexes, and opening with a lower
//! version than the browser holds fails. Every open failure (including a browser
//! that refuses IndexedDB altogether, such as some private modes) surfaces as
//! [`StoreError::StorageUnavailable`].

use rexie::{Index, KeyRange, ObjectStore as RexieObjectStore, Rexie, TransactionMode};
use serde::Serialize;
use tracing::{debug, info};
use wasm_bindgen::JsValue;

use crate::engine::{Connection, StorageEngine};
use crate::error::{Result, StoreError};
use crate::key::{Document, IndexKey};
use crate::schema::{CollectionSchema, StoreSchema};

/// IndexedDB-backed engine for the web platform.
#[derive(Clone, Debug, Default)]
pub struct IdbEngine;

impl IdbEngine {
    pub fn new() -> Self {
        Self
    }
}

fn object_store(def: &CollectionSchema) -> RexieObjectStore {
    let mut store = RexieObjectStore::new(&def.name)
        .key_path(&def.primary_key)
        .auto_increment(false);
    for index in &def.indexes {
        let idx = if index.is_composite() {
            Index::new_array(&index.name, index.key_path.iter().map(String::as_str))
        } else {
            Index::new(&index.name, &index.key_path[0])
        };
        store = store.add_index(idx.unique(index.unique));
    }
    store
}

fn to_js(doc: &Document) -> Result<JsValue> {
    doc.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| StoreError::storage("encode record", e))
}

fn from_js(value: JsValue) -> Result<Document> {
    serde_wasm_bindgen::from_value(value).map_err(|e| StoreError::storage("decode record", e))
}

fn key_to_js(key: &IndexKey) -> JsValue {
    match key.parts() {
        [single] => JsValue::from_str(single),
        parts => {
            let array = js_sys::Array::new();
            for part in parts {
                array.push(&JsValue::from_str(part));
            }
            array.into()
        }
    }
}

fn engine_err(context: &'static str) -> impl Fn(rexie::Error) -> StoreError {
    move |e| StoreError::storage(context, e)
}

impl StorageEngine for IdbEngine {
    type Connection = IdbConnection;

    async fn open(&self, schema: &StoreSchema) -> Result<IdbConnection> {
        schema.validate()?;

        let mut builder = Rexie::builder(&schema.name).version(schema.version);
        for def in &schema.collections {
            builder = builder.add_object_store(object_store(def));
        }
        let db = builder
            .build()
            .await
            .map_err(|e| StoreError::StorageUnavailable(format!("IndexedDB open failed: {e}")))?;

        info!(name = %schema.name, version = schema.version, "IndexedDB database ready");
        Ok(IdbConnection {
            db,
            schema: schema.clone(),
        })
    }

    async fn delete_database(&self, name: &str) -> Result<()> {
        Rexie::delete(name)
            .await
            .map_err(engine_err("delete database"))
    }
}

/// An open IndexedDB database.
pub struct IdbConnection {
    db: Rexie,
    schema: StoreSchema,
}

impl IdbConnection {
    fn check(&self, collection: &str) -> Result<()> {
        self.schema.require_collection(collection).map(|_| ())
    }
}

impl Connection for IdbConnection {
    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    async fn put(&self, collection: &str, doc: Document) -> Result<()> {
        self.schema
            .require_collection(collection)?
            .require_primary_key(&doc)?;
        let value = to_js(&doc)?;

        let tx = self
            .db
            .transaction(&[collection], TransactionMode::ReadWrite)
            .map_err(engine_err("begin put"))?;
        let store = tx.store(collection).map_err(engine_err("open store"))?;
        store.put(&value, None).await.map_err(engine_err("put"))?;
        tx.done().await.map_err(engine_err("commit put"))?;
        debug!(collection, "stored record");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check(collection)?;
        let tx = self
            .db
            .transaction(&[collection], TransactionMode::ReadOnly)
            .map_err(engine_err("begin get"))?;
        let store = tx.store(collection).map_err(engine_err("open store"))?;

        match store.get(JsValue::from_str(id)).await.map_err(engine_err("get"))? {
            Some(value) => from_js(value).map(Some),
            None => Ok(None),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check(collection)?;
        let tx = self
            .db
            .transaction(&[collection], TransactionMode::ReadWrite)
            .map_err(engine_err("begin delete"))?;
        let store = tx.store(collection).map_err(engine_err("open store"))?;
        store
            .delete(JsValue::from_str(id))
            .await
            .map_err(engine_err("delete"))?;
        tx.done().await.map_err(engine_err("commit delete"))?;
        Ok(())
    }

    async fn query(&self, collection: &str, index: &str, key: &IndexKey) -> Result<Vec<Document>> {
        self.schema
            .require_collection(collection)?
            .require_index(index, key)?;

        let tx = self
            .db
            .transaction(&[collection], TransactionMode::ReadOnly)
            .map_err(engine_err("begin query"))?;
        let store = tx.store(collection).map_err(engine_err("open store"))?;
        let idx = store.index(index).map_err(engine_err("open index"))?;
        let range = KeyRange::only(&key_to_js(key))
            .map_err(|e| StoreError::storage("key range", e))?;

        idx.get_all(Some(range), None)
            .await
            .map_err(engine_err("query"))?
            .into_iter()
            .map(from_js)
            .collect()
    }

    async fn all(&self, collection: &str) -> Result<Vec<Document>> {
        self.check(collection)?;
        let tx = self
            .db
            .transaction(&[collection], TransactionMode::ReadOnly)
            .map_err(engine_err("begin scan"))?;
        let store = tx.store(collection).map_err(engine_err("open store"))?;

        store
            .get_all(None, None)
            .await
            .map_err(engine_err("scan"))?
            .into_iter()
            .map(from_js)
            .collect()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.check(collection)?;
        let tx = self
            .db
            .transaction(&[collection], TransactionMode::ReadOnly)
            .map_err(engine_err("begin count"))?;
        let store = tx.store(collection).map_err(engine_err("open store"))?;
        let count = store.count(None).await.map_err(engine_err("count"))?;
        Ok(count as usize)
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.check(collection)?;
        let tx = self
            .db
            .transaction(&[collection], TransactionMode::ReadWrite)
            .map_err(engine_err("begin clear"))?;
        let store = tx.store(collection).map_err(engine_err("open store"))?;
        store.clear().await.map_err(engine_err("clear"))?;
        tx.done().await.map_err(engine_err("commit clear"))?;
        Ok(())
    }

    async fn close(self) {
        self.db.close();
        debug!(name = %self.schema.name, "closed IndexedDB database");
    }
}
