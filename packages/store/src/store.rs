//! # Store — typed access to the dog tracker's collections
//!
//! [`Store`] is an explicitly constructed handle over one open database. There is
//! no global instance: callers open a store on the engine of their platform, pass
//! it to whatever needs it, and [`close`](Store::close) it when done.
//!
//! ```ignore
//! let engine = FileEngine::from_config(&config)?;
//! let store = open_store(&engine, &config.database.name).await?;
//!
//! let dog = Dog::new("Pochi");
//! store.dogs().put(&dog).await?;
//! let today = store.daily_logs().for_dog_on(&dog.id, &today_log_date()).await?;
//! ```
//!
//! ## Tables
//!
//! [`Store::dogs`], [`Store::daily_logs`] and [`Store::photos`] return a
//! [`Table`] bound to one record type. Every table offers the same operations:
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`put`](Table::put) | Validates the record, then inserts or replaces it. Returns its id. |
//! | [`get`](Table::get) | Record by id, or `None`. |
//! | [`get_required`](Table::get_required) | Record by id, or [`StoreError::NotFound`]. |
//! | [`delete`](Table::delete) | Removes a record; absent ids are ignored. Nothing cascades. |
//! | [`query_by_index`](Table::query_by_index) | All records whose index key equals the given key. |
//! | [`all`](Table::all) / [`count`](Table::count) / [`clear`](Table::clear) | Whole-collection operations. |
//!
//! Writes touching several records (a daily log and its photo) are separate
//! operations; a failure between them leaves the first one stored.

use std::marker::PhantomData;

use tracing::debug;

use crate::engine::{Connection, StorageEngine};
use crate::error::{Result, StoreError};
use crate::key::IndexKey;
use crate::models::{DailyLog, Dog, Photo, Record};
use crate::schema::{StoreSchema, DOG_ID_LOG_DATE};

/// Open (creating if absent) the named store with the version 1 schema.
pub async fn open_store<E: StorageEngine>(engine: &E, name: &str) -> Result<Store<E::Connection>> {
    Store::open(engine, StoreSchema::v1(name)).await
}

/// An open store.
pub struct Store<C: Connection> {
    conn: C,
}

impl<C: Connection> Store<C> {
    /// Validate `schema` and open it on `engine`.
    pub async fn open<E>(engine: &E, schema: StoreSchema) -> Result<Self>
    where
        E: StorageEngine<Connection = C>,
    {
        schema.validate()?;
        let conn = engine.open(&schema).await?;
        debug!(name = %schema.name, version = schema.version, "store open");
        Ok(Self { conn })
    }

    pub fn name(&self) -> &str {
        &self.conn.schema().name
    }

    pub fn version(&self) -> u32 {
        self.conn.schema().version
    }

    pub fn schema(&self) -> &StoreSchema {
        self.conn.schema()
    }

    /// Any record collection by type.
    pub fn table<R: Record>(&self) -> Table<'_, C, R> {
        Table {
            conn: &self.conn,
            _record: PhantomData,
        }
    }

    pub fn dogs(&self) -> Table<'_, C, Dog> {
        self.table()
    }

    pub fn daily_logs(&self) -> Table<'_, C, DailyLog> {
        self.table()
    }

    pub fn photos(&self) -> Table<'_, C, Photo> {
        self.table()
    }

    pub async fn close(self) {
        self.conn.close().await;
    }
}

/// Typed handle on one collection of an open [`Store`].
pub struct Table<'a, C: Connection, R: Record> {
    conn: &'a C,
    _record: PhantomData<R>,
}

impl<C: Connection, R: Record> Table<'_, C, R> {
    pub fn collection(&self) -> &'static str {
        R::COLLECTION
    }

    pub async fn put(&self, record: &R) -> Result<String> {
        record.validate().map_err(|source| StoreError::Validation {
            collection: R::COLLECTION,
            source,
        })?;
        let doc = serde_json::to_value(record)?;
        self.conn.put(R::COLLECTION, doc).await?;
        Ok(record.id().to_string())
    }

    pub async fn get(&self, id: &str) -> Result<Option<R>> {
        match self.conn.get(R::COLLECTION, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn get_required(&self, id: &str) -> Result<R> {
        self.get(id).await?.ok_or_else(|| StoreError::NotFound {
            collection: R::COLLECTION.to_string(),
            id: id.to_string(),
        })
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.conn.delete(R::COLLECTION, id).await
    }

    pub async fn query_by_index(&self, index: &str, key: impl Into<IndexKey>) -> Result<Vec<R>> {
        let docs = self.conn.query(R::COLLECTION, index, &key.into()).await?;
        decode_all(docs)
    }

    pub async fn all(&self) -> Result<Vec<R>> {
        decode_all(self.conn.all(R::COLLECTION).await?)
    }

    pub async fn count(&self) -> Result<usize> {
        self.conn.count(R::COLLECTION).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.conn.clear(R::COLLECTION).await
    }
}

fn decode_all<R: Record>(docs: Vec<serde_json::Value>) -> Result<Vec<R>> {
    docs.into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}

impl<C: Connection> Table<'_, C, Dog> {
    pub async fn named(&self, name: &str) -> Result<Vec<Dog>> {
        self.query_by_index("name", name).await
    }
}

impl<C: Connection> Table<'_, C, DailyLog> {
    pub async fn for_dog(&self, dog_id: &str) -> Result<Vec<DailyLog>> {
        self.query_by_index("dogId", dog_id).await
    }

    pub async fn on_date(&self, log_date: &str) -> Result<Vec<DailyLog>> {
        self.query_by_index("logDate", log_date).await
    }

    /// Entries of one dog on one date.
    pub async fn for_dog_on(&self, dog_id: &str, log_date: &str) -> Result<Vec<DailyLog>> {
        self.query_by_index(DOG_ID_LOG_DATE, (dog_id, log_date)).await
    }
}

impl<C: Connection> Table<'_, C, Photo> {
    pub async fn for_dog(&self, dog_id: &str) -> Result<Vec<Photo>> {
        self.query_by_index("dogId", dog_id).await
    }

    pub async fn on_date(&self, log_date: &str) -> Result<Vec<Photo>> {
        self.query_by_index("logDate", log_date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::memory::MemoryEngine;
    use crate::FileEngine;

    fn pochi() -> Dog {
        Dog {
            id: "d1".into(),
            name: "Pochi".into(),
            birthday: None,
            breed: None,
            memo: None,
            target_min: None,
            target_max: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn log(id: &str, dog_id: &str, log_date: &str) -> DailyLog {
        DailyLog {
            id: id.into(),
            ..DailyLog::new(dog_id, log_date)
        }
    }

    async fn memory_store() -> Store<crate::memory::MemoryConnection> {
        open_store(&MemoryEngine::new(), "test-db").await.unwrap()
    }

    #[tokio::test]
    async fn test_dog_roundtrip() {
        let store = memory_store().await;

        let dog = pochi();
        let id = store.dogs().put(&dog).await.unwrap();
        assert_eq!(id, "d1");
        assert_eq!(store.dogs().get("d1").await.unwrap(), Some(dog));

        let full = Dog::new("Hana")
            .with_birthday("2019-04-01")
            .with_breed("Shiba")
            .with_memo("likes apples")
            .with_target(Some(7.5), Some(9.0));
        store.dogs().put(&full).await.unwrap();
        assert_eq!(store.dogs().get_required(&full.id).await.unwrap(), full);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_absent() {
        let store = memory_store().await;
        store.dogs().put(&pochi()).await.unwrap();

        store.dogs().delete("d1").await.unwrap();
        assert_eq!(store.dogs().get("d1").await.unwrap(), None);

        let err = store.dogs().get_required("d1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_dog_id_and_composite_queries() {
        let store = memory_store().await;
        let first = log("l1", "d1", "2024-01-01");
        let second = log("l2", "d1", "2024-01-02");
        store.daily_logs().put(&first).await.unwrap();
        store.daily_logs().put(&second).await.unwrap();
        store.daily_logs().put(&log("l3", "d2", "2024-01-01")).await.unwrap();

        let mut by_dog = store.daily_logs().query_by_index("dogId", "d1").await.unwrap();
        by_dog.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(by_dog, vec![first.clone(), second]);

        let by_day = store
            .daily_logs()
            .query_by_index("dogId+logDate", ["d1", "2024-01-01"])
            .await
            .unwrap();
        assert_eq!(by_day, vec![first]);

        assert_eq!(store.daily_logs().on_date("2024-01-01").await.unwrap().len(), 2);
        assert!(store
            .daily_logs()
            .for_dog_on("d2", "2024-01-02")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_day_entries_are_kept() {
        let store = memory_store().await;
        store.daily_logs().put(&log("l1", "d1", "2024-01-01")).await.unwrap();
        store.daily_logs().put(&log("l2", "d1", "2024-01-01")).await.unwrap();

        let same_day = store.daily_logs().for_dog_on("d1", "2024-01-01").await.unwrap();
        assert_eq!(same_day.len(), 2);
    }

    #[tokio::test]
    async fn test_deleting_dog_does_not_cascade() {
        let store = memory_store().await;
        store.dogs().put(&pochi()).await.unwrap();
        store.daily_logs().put(&log("l1", "d1", "2024-01-01")).await.unwrap();
        store.daily_logs().put(&log("l2", "d1", "2024-01-02")).await.unwrap();
        let photo = Photo::new("d1", "2024-01-01", vec![0x89, 0x50, 0x4e, 0x47], "image/png");
        store.photos().put(&photo).await.unwrap();

        store.dogs().delete("d1").await.unwrap();

        assert_eq!(store.daily_logs().for_dog("d1").await.unwrap().len(), 2);
        assert_eq!(store.photos().for_dog("d1").await.unwrap(), vec![photo]);
    }

    #[tokio::test]
    async fn test_put_validates_before_writing() {
        let store = memory_store().await;
        let dog = pochi().with_target(Some(12.0), Some(10.0));

        let err = store.dogs().put(&dog).await.unwrap_err();
        match err {
            StoreError::Validation { collection, source } => {
                assert_eq!(collection, "dogs");
                assert_eq!(source, ValidationError::TargetRange { min: 12.0, max: 10.0 });
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.dogs().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_photo_with_log() {
        let store = memory_store().await;
        let entry = DailyLog::new("d1", "2024-03-03").with_weight(8.1);
        let photo = Photo::for_log(&entry, vec![0xff, 0xd8, 0xff, 0xe0], "image/jpeg");
        let entry = entry.with_photo(&photo);

        store.photos().put(&photo).await.unwrap();
        store.daily_logs().put(&entry).await.unwrap();

        let stored = store.daily_logs().get_required(&entry.id).await.unwrap();
        let linked = store
            .photos()
            .get_required(stored.photo_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(linked.blob, vec![0xff, 0xd8, 0xff, 0xe0]);
        assert_eq!(store.photos().on_date("2024-03-03").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dogs_named_and_clear() {
        let store = memory_store().await;
        store.dogs().put(&pochi()).await.unwrap();
        store.dogs().put(&Dog::new("Pochi")).await.unwrap();
        store.dogs().put(&Dog::new("Hana")).await.unwrap();

        assert_eq!(store.dogs().named("Pochi").await.unwrap().len(), 2);
        assert_eq!(store.dogs().all().await.unwrap().len(), 3);

        store.dogs().clear().await.unwrap();
        assert_eq!(store.dogs().count().await.unwrap(), 0);
        assert!(store.dogs().named("Pochi").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_is_idempotent_per_name() {
        let engine = MemoryEngine::new();
        let first = open_store(&engine, "shared").await.unwrap();
        first.dogs().put(&pochi()).await.unwrap();
        first.close().await;

        let second = open_store(&engine, "shared").await.unwrap();
        assert_eq!(second.name(), "shared");
        assert_eq!(second.version(), 1);
        assert!(second.dogs().get("d1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_schema_is_rejected() {
        let engine = MemoryEngine::new();
        let err = Store::open(&engine, StoreSchema::new("empty", 1)).await.err().unwrap();
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[tokio::test]
    async fn test_table_missing_from_custom_schema() {
        let engine = MemoryEngine::new();
        let schema = StoreSchema::new("dogs-only", 1).collection("dogs", "id, name").unwrap();
        let store = Store::open(&engine, schema).await.unwrap();

        store.dogs().put(&pochi()).await.unwrap();
        let err = store.photos().all().await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(_)));
    }

    #[tokio::test]
    async fn test_file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());

        let store = open_store(&engine, "inochi-daiji-db").await.unwrap();
        store.dogs().put(&pochi()).await.unwrap();
        let photo = Photo::new("d1", "2024-01-01", vec![1, 2, 3, 4], "image/webp");
        store.photos().put(&photo).await.unwrap();
        store.close().await;

        let engine = FileEngine::new(dir.path().to_path_buf());
        let store = open_store(&engine, "inochi-daiji-db").await.unwrap();
        assert_eq!(store.dogs().get("d1").await.unwrap(), Some(pochi()));
        assert_eq!(store.photos().get_required(&photo.id).await.unwrap(), photo);
    }

    #[tokio::test]
    async fn test_file_store_keeps_floats_exact() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let store = open_store(&engine, "inochi-daiji-db").await.unwrap();

        let mut values = vec![19.513390462591218, 0.1 + 0.2, 1.0 / 3.0, f64::MIN_POSITIVE];
        values.extend((1..300).map(|i| (i as f64).sqrt() * std::f64::consts::PI));

        let mut dogs = Vec::new();
        let mut logs = Vec::new();
        for (i, &v) in values.iter().enumerate() {
            let mut dog = Dog::new(&format!("dog {i}")).with_target(Some(v), Some(v * 1.1));
            dog.id = format!("d{i}");
            let log = DailyLog::new(&dog.id, "2024-01-01").with_weight(v / 7.0);
            store.dogs().put(&dog).await.unwrap();
            store.daily_logs().put(&log).await.unwrap();
            dogs.push(dog);
            logs.push(log);
        }
        store.close().await;

        let engine = FileEngine::new(dir.path().to_path_buf());
        let store = open_store(&engine, "inochi-daiji-db").await.unwrap();
        for dog in &dogs {
            assert_eq!(&store.dogs().get_required(&dog.id).await.unwrap(), dog);
        }
        for log in &logs {
            assert_eq!(&store.daily_logs().get_required(&log.id).await.unwrap(), log);
        }
    }
}
