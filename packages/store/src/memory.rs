use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::engine::{Connection, StorageEngine};
use crate::error::{Result, StoreError};
use crate::key::{Document, IndexKey};
use crate::schema::{plan_open, CollectionSchema, OpenAction, StoreSchema};

/// In-memory engine for testing and ephemeral use.
///
/// Clones share the same databases, so opening the same name twice (from any
/// clone) sees the same records.
#[derive(Clone, Debug, Default)]
pub struct MemoryEngine {
    databases: Arc<Mutex<HashMap<String, Arc<Mutex<Database>>>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Storage("memory engine lock poisoned".into()))
}

#[derive(Debug, Default)]
struct Database {
    version: u32,
    schema: Option<StoreSchema>,
    collections: HashMap<String, Collection>,
}

impl Database {
    fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut Collection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }
}

/// Records of one collection plus an entry map per index.
#[derive(Debug)]
struct Collection {
    def: CollectionSchema,
    records: BTreeMap<String, Document>,
    indexes: HashMap<String, BTreeMap<IndexKey, BTreeSet<String>>>,
}

impl Collection {
    fn new(def: CollectionSchema) -> Self {
        let indexes = def
            .indexes
            .iter()
            .map(|i| (i.name.clone(), BTreeMap::new()))
            .collect();
        Self {
            def,
            records: BTreeMap::new(),
            indexes,
        }
    }

    /// Build a collection for `def` from existing records, reindexing all of them.
    fn rebuild(def: CollectionSchema, records: BTreeMap<String, Document>) -> Result<Self> {
        let mut collection = Self::new(def);
        for (id, doc) in records {
            collection.insert(id, doc)?;
        }
        Ok(collection)
    }

    fn check_unique(&self, id: &str, doc: &Document) -> Result<()> {
        for index in self.def.unique_indexes() {
            let Some(key) = index.key_of(doc) else {
                continue;
            };
            let taken = self
                .indexes
                .get(&index.name)
                .and_then(|entries| entries.get(&key))
                .is_some_and(|ids| ids.iter().any(|other| other != id));
            if taken {
                return Err(StoreError::ConstraintViolation {
                    collection: self.def.name.clone(),
                    index: index.name.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    fn insert(&mut self, id: String, doc: Document) -> Result<()> {
        self.check_unique(&id, &doc)?;
        self.remove(&id);

        for index in &self.def.indexes {
            if let Some(key) = index.key_of(&doc) {
                self.indexes
                    .entry(index.name.clone())
                    .or_default()
                    .entry(key)
                    .or_default()
                    .insert(id.clone());
            }
        }
        self.records.insert(id, doc);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Option<Document> {
        let doc = self.records.remove(id)?;
        for index in &self.def.indexes {
            let Some(key) = index.key_of(&doc) else {
                continue;
            };
            if let Some(entries) = self.indexes.get_mut(&index.name) {
                if let Some(ids) = entries.get_mut(&key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        entries.remove(&key);
                    }
                }
            }
        }
        Some(doc)
    }

    fn lookup(&self, index: &str, key: &IndexKey) -> Vec<Document> {
        let Some(ids) = self.indexes.get(index).and_then(|entries| entries.get(key)) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    fn clear(&mut self) {
        self.records.clear();
        for entries in self.indexes.values_mut() {
            entries.clear();
        }
    }
}

/// An open database on a [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryConnection {
    schema: StoreSchema,
    db: Arc<Mutex<Database>>,
}

impl StorageEngine for MemoryEngine {
    type Connection = MemoryConnection;

    async fn open(&self, schema: &StoreSchema) -> Result<MemoryConnection> {
        schema.validate()?;

        let db = lock(&self.databases)?
            .entry(schema.name.clone())
            .or_default()
            .clone();

        {
            let mut state = lock(&db)?;
            let stored = state.schema.as_ref().map(|s| (state.version, s));
            let action = plan_open(stored, schema)?;

            if action == OpenAction::Reuse {
                debug!(name = %schema.name, version = schema.version, "opened memory database");
            } else {
                let mut collections = HashMap::new();
                for def in &schema.collections {
                    let records = state
                        .collections
                        .get(&def.name)
                        .map(|c| c.records.clone())
                        .unwrap_or_default();
                    collections.insert(def.name.clone(), Collection::rebuild(def.clone(), records)?);
                }
                state.collections = collections;
                state.version = schema.version;
                state.schema = Some(schema.clone());
                info!(name = %schema.name, version = schema.version, ?action, "memory database ready");
            }
        }

        Ok(MemoryConnection {
            schema: schema.clone(),
            db,
        })
    }

    async fn delete_database(&self, name: &str) -> Result<()> {
        lock(&self.databases)?.remove(name);
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    async fn put(&self, collection: &str, doc: Document) -> Result<()> {
        let mut db = lock(&self.db)?;
        let target = db.collection_mut(collection)?;
        let id = target.def.require_primary_key(&doc)?.to_string();
        target.insert(id, doc)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let db = lock(&self.db)?;
        Ok(db.collection(collection)?.records.get(id).cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut db = lock(&self.db)?;
        db.collection_mut(collection)?.remove(id);
        Ok(())
    }

    async fn query(&self, collection: &str, index: &str, key: &IndexKey) -> Result<Vec<Document>> {
        let db = lock(&self.db)?;
        let target = db.collection(collection)?;
        target.def.require_index(index, key)?;
        Ok(target.lookup(index, key))
    }

    async fn all(&self, collection: &str) -> Result<Vec<Document>> {
        let db = lock(&self.db)?;
        Ok(db.collection(collection)?.records.values().cloned().collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let db = lock(&self.db)?;
        Ok(db.collection(collection)?.records.len())
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        let mut db = lock(&self.db)?;
        db.collection_mut(collection)?.clear();
        Ok(())
    }

    async fn close(self) {
        debug!(name = %self.schema.name, "closed memory database");
    }
}
