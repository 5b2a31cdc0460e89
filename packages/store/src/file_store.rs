//! # Filesystem-backed engine
//!
//! [`FileEngine`] persists databases to the local filesystem. It is used on
//! desktop and mobile platforms so records survive app restarts.
//!
//! ## Layout
//!
//! ```text
//! <base_dir>/
//! └── <database name>/
//!     ├── schema.toml            # declared schema, including its version
//!     ├── dogs/
//!     │   └── <id>.json          # one JSON document per record
//!     ├── daily_logs/
//!     └── photos/
//! ```
//!
//! Names and ids are used as path components after escaping every byte outside
//! `[a-z0-9._-]` as `%XX` (uppercase letters and a leading `.` included). Ids
//! whose escaped form is too long for a filename are stored under `~<sha1>`.
//!
//! ## Indexes
//!
//! No index files are kept. Queries scan the collection directory and compare
//! each document's key at the index key path.
//!
//! ## Platform data directories
//!
//! [`FileEngine::from_config`] falls back to [`dirs::data_dir()`]:
//!
//! | Platform | Path |
//! |----------|------|
//! | macOS / iOS | `~/Library/Application Support/inochi-daiji/` |
//! | Linux | `~/.local/share/inochi-daiji/` |
//! | Windows | `C:\Users\<user>\AppData\Roaming\inochi-daiji\` |

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::engine::{Connection, StorageEngine};
use crate::error::{Result, StoreError};
use crate::key::{Document, IndexKey};
use crate::schema::{plan_open, CollectionSchema, OpenAction, StoreSchema};

const SCHEMA_FILE: &str = "schema.toml";
const RECORD_EXT: &str = "json";
/// Longest escaped stem kept verbatim; leaves room for the extension under the
/// usual 255-byte filename limit.
const MAX_COMPONENT_LEN: usize = 200;

/// Filesystem-backed engine for desktop and mobile persistence.
#[derive(Clone, Debug)]
pub struct FileEngine {
    base: PathBuf,
}

impl FileEngine {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// Engine rooted at the configured data directory, or the platform default.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.resolve_data_dir().map(Self::new)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn database_dir(&self, name: &str) -> PathBuf {
        self.base.join(path_component(name))
    }
}

/// Escape a name or id for use as a single path component.
///
/// Uppercase letters are escaped so names differing only in case stay distinct
/// on case-insensitive filesystems. Components whose escaped form would exceed
/// [`MAX_COMPONENT_LEN`] are replaced by `~` and the SHA-1 hex of the raw name;
/// `~` itself is always escaped, so hashed and escaped forms never meet.
fn path_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, b) in raw.bytes().enumerate() {
        let safe = b.is_ascii_lowercase()
            || b.is_ascii_digit()
            || b == b'-'
            || b == b'_'
            || (b == b'.' && i > 0);
        if safe {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    if out.len() > MAX_COMPONENT_LEN {
        let digest = Sha1::digest(raw.as_bytes());
        out = std::iter::once("~".to_string())
            .chain(digest.iter().map(|b| format!("{b:02x}")))
            .collect();
    }
    out
}

fn read_schema(dir: &Path) -> Result<Option<StoreSchema>> {
    let content = match fs::read_to_string(dir.join(SCHEMA_FILE)) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::storage("read schema", e)),
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::storage("corrupt schema file", e))
}

/// Write a file by renaming a fully written temporary next to it.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).map_err(|e| StoreError::storage("write", e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::storage("rename", e))
}

fn is_record_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT)
}

/// Read every record of a collection directory, keyed by primary key.
fn load_records(dir: &Path, def: &CollectionSchema) -> Result<BTreeMap<String, Document>> {
    let mut records = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(StoreError::storage("list records", e)),
    };

    for entry in entries {
        let path = entry.map_err(|e| StoreError::storage("list records", e))?.path();
        if !is_record_file(&path) {
            continue;
        }
        let bytes = fs::read(&path).map_err(|e| StoreError::storage("read record", e))?;
        let doc: Document = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping undecodable record");
                continue;
            }
        };
        match def.primary_key_of(&doc) {
            Some(id) => {
                records.insert(id.to_string(), doc);
            }
            None => warn!(path = %path.display(), "skipping record without primary key"),
        }
    }
    Ok(records)
}

/// Fail if two records share a key on one of the collection's unique indexes.
fn check_unique_all(def: &CollectionSchema, records: &BTreeMap<String, Document>) -> Result<()> {
    for index in def.unique_indexes() {
        let mut seen = BTreeMap::new();
        for (id, doc) in records {
            let Some(key) = index.key_of(doc) else {
                continue;
            };
            if let Some(other) = seen.insert(key.clone(), id) {
                if other != id {
                    return Err(StoreError::ConstraintViolation {
                        collection: def.name.clone(),
                        index: index.name.clone(),
                        key: key.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// An open database on a [`FileEngine`].
#[derive(Debug)]
pub struct FileConnection {
    dir: PathBuf,
    schema: StoreSchema,
}

impl FileConnection {
    fn collection(&self, name: &str) -> Result<(&CollectionSchema, PathBuf)> {
        let def = self.schema.require_collection(name)?;
        Ok((def, self.dir.join(path_component(name))))
    }

    fn record_path(collection_dir: &Path, id: &str) -> PathBuf {
        collection_dir.join(format!("{}.{RECORD_EXT}", path_component(id)))
    }
}

impl StorageEngine for FileEngine {
    type Connection = FileConnection;

    async fn open(&self, schema: &StoreSchema) -> Result<FileConnection> {
        schema.validate()?;

        let dir = self.database_dir(&schema.name);
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::StorageUnavailable(format!("cannot create {}: {e}", dir.display()))
        })?;

        let stored = read_schema(&dir)?;
        let action = plan_open(stored.as_ref().map(|s| (s.version, s)), schema)?;

        for def in &schema.collections {
            fs::create_dir_all(dir.join(path_component(&def.name)))
                .map_err(|e| StoreError::storage("create collection", e))?;
        }

        if action == OpenAction::Reuse {
            debug!(name = %schema.name, dir = %dir.display(), "opened file database");
        } else {
            for def in &schema.collections {
                let collection_dir = dir.join(path_component(&def.name));
                check_unique_all(def, &load_records(&collection_dir, def)?)?;
            }

            if let Some(old) = &stored {
                for dropped in old
                    .collections
                    .iter()
                    .filter(|c| schema.get_collection(&c.name).is_none())
                {
                    let path = dir.join(path_component(&dropped.name));
                    fs::remove_dir_all(&path)
                        .map_err(|e| StoreError::storage("drop collection", e))?;
                }
            }

            let encoded = toml::to_string_pretty(schema)
                .map_err(|e| StoreError::storage("encode schema", e))?;
            write_atomic(&dir.join(SCHEMA_FILE), encoded.as_bytes())?;
            info!(name = %schema.name, version = schema.version, ?action, "file database ready");
        }

        Ok(FileConnection {
            dir,
            schema: schema.clone(),
        })
    }

    async fn delete_database(&self, name: &str) -> Result<()> {
        match fs::remove_dir_all(self.database_dir(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(StoreError::storage("delete database", e))
            }
            _ => Ok(()),
        }
    }
}

impl Connection for FileConnection {
    fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    async fn put(&self, collection: &str, doc: Document) -> Result<()> {
        let (def, dir) = self.collection(collection)?;
        let id = def.require_primary_key(&doc)?;

        if def.unique_indexes().next().is_some() {
            let mut records = load_records(&dir, def)?;
            records.insert(id.to_string(), doc.clone());
            check_unique_all(def, &records)?;
        }

        let bytes = serde_json::to_vec(&doc)?;
        write_atomic(&Self::record_path(&dir, id), &bytes)?;
        debug!(collection, id, "stored record");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let (_, dir) = self.collection(collection)?;
        match fs::read(Self::record_path(&dir, id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::storage("read record", e)),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let (_, dir) = self.collection(collection)?;
        match fs::remove_file(Self::record_path(&dir, id)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(StoreError::storage("delete record", e)),
            _ => {
                debug!(collection, id, "deleted record");
                Ok(())
            }
        }
    }

    async fn query(&self, collection: &str, index: &str, key: &IndexKey) -> Result<Vec<Document>> {
        let (def, dir) = self.collection(collection)?;
        let index = def.require_index(index, key)?;
        Ok(load_records(&dir, def)?
            .into_values()
            .filter(|doc| index.key_of(doc).as_ref() == Some(key))
            .collect())
    }

    async fn all(&self, collection: &str) -> Result<Vec<Document>> {
        let (def, dir) = self.collection(collection)?;
        Ok(load_records(&dir, def)?.into_values().collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let (_, dir) = self.collection(collection)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::storage("list records", e)),
        };
        let mut count = 0;
        for entry in entries {
            let path = entry.map_err(|e| StoreError::storage("list records", e))?.path();
            if is_record_file(&path) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        let (_, dir) = self.collection(collection)?;
        match fs::remove_dir_all(&dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                return Err(StoreError::storage("clear collection", e))
            }
            _ => {}
        }
        fs::create_dir_all(&dir).map_err(|e| StoreError::storage("clear collection", e))
    }

    async fn close(self) {
        debug!(name = %self.schema.name, "closed file database");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DAILY_LOGS, DOGS, PHOTOS};
    use serde_json::json;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();
        conn.put(DOGS, json!({ "id": "d1", "name": "Pochi" })).await.unwrap();
        conn.put(DAILY_LOGS, json!({ "id": "l1", "dogId": "d1", "logDate": "2024-01-01" }))
            .await
            .unwrap();
        conn.close().await;

        // Fresh engine on the same directory.
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();
        let dog = conn.get(DOGS, "d1").await.unwrap().unwrap();
        assert_eq!(dog["name"], "Pochi");

        let logs = conn
            .query(DAILY_LOGS, "dogId+logDate", &("d1", "2024-01-01").into())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_ids_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();

        conn.put(DOGS, json!({ "id": "../a/b", "name": "Odd" })).await.unwrap();
        assert!(conn.get(DOGS, "../a/b").await.unwrap().is_some());
        assert_eq!(conn.count(DOGS).await.unwrap(), 1);
        assert!(dir
            .path()
            .join("inochi-daiji-db/dogs/%2E.%2Fa%2Fb.json")
            .exists());
    }

    #[tokio::test]
    async fn test_undecodable_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();
        conn.put(PHOTOS, json!({ "id": "p1", "dogId": "d1", "logDate": "2024-01-01" }))
            .await
            .unwrap();

        fs::write(dir.path().join("inochi-daiji-db/photos/broken.json"), b"{not json").unwrap();

        let photos = conn.query(PHOTOS, "dogId", &"d1".into()).await.unwrap();
        assert_eq!(photos.len(), 1);
    }

    #[tokio::test]
    async fn test_upgrade_drops_undeclared_collections() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();
        conn.put(PHOTOS, json!({ "id": "p1", "dogId": "d1", "logDate": "2024-01-01" }))
            .await
            .unwrap();
        conn.put(DOGS, json!({ "id": "d1", "name": "Pochi" })).await.unwrap();
        conn.close().await;

        let mut v2 = StoreSchema::default();
        v2.version = 2;
        v2.collections.retain(|c| c.name != PHOTOS);
        let conn = engine.open(&v2).await.unwrap();

        assert!(!dir.path().join("inochi-daiji-db/photos").exists());
        assert_eq!(conn.count(DOGS).await.unwrap(), 1);
        assert!(matches!(
            conn.get(PHOTOS, "p1").await,
            Err(StoreError::UnknownCollection(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_when_base_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        fs::write(&file, b"x").unwrap();

        let engine = FileEngine::new(file);
        let err = engine.open(&StoreSchema::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();

        conn.put(DOGS, json!({ "id": "d1", "name": "Pochi" })).await.unwrap();
        conn.put(DOGS, json!({ "id": "d2", "name": "Hana" })).await.unwrap();

        conn.delete(DOGS, "d1").await.unwrap();
        conn.delete(DOGS, "missing").await.unwrap();
        assert_eq!(conn.count(DOGS).await.unwrap(), 1);

        conn.clear(DOGS).await.unwrap();
        assert!(conn.all(DOGS).await.unwrap().is_empty());

        engine.delete_database("inochi-daiji-db").await.unwrap();
        assert!(!dir.path().join("inochi-daiji-db").exists());
    }

    #[tokio::test]
    async fn test_ids_differing_in_case_stay_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();

        conn.put(DOGS, json!({ "id": "A", "name": "Upper" })).await.unwrap();
        conn.put(DOGS, json!({ "id": "a", "name": "Lower" })).await.unwrap();

        assert_eq!(conn.count(DOGS).await.unwrap(), 2);
        assert_eq!(conn.get(DOGS, "A").await.unwrap().unwrap()["name"], "Upper");
        assert_eq!(conn.get(DOGS, "a").await.unwrap().unwrap()["name"], "Lower");
        assert!(dir.path().join("inochi-daiji-db/dogs/%41.json").exists());
        assert!(dir.path().join("inochi-daiji-db/dogs/a.json").exists());
    }

    #[tokio::test]
    async fn test_long_and_non_ascii_ids_fit_in_a_filename() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();

        let long = "x".repeat(300);
        let japanese = "ポチ".repeat(30);
        let other_long = format!("{}y", "x".repeat(299));
        for id in [&long, &japanese, &other_long] {
            conn.put(DOGS, json!({ "id": id, "name": "Pochi" })).await.unwrap();
        }

        assert_eq!(conn.count(DOGS).await.unwrap(), 3);
        for id in [&long, &japanese, &other_long] {
            let doc = conn.get(DOGS, id).await.unwrap().unwrap();
            assert_eq!(doc["id"], id.as_str());
        }
        for entry in fs::read_dir(dir.path().join("inochi-daiji-db/dogs")).unwrap() {
            assert!(entry.unwrap().file_name().len() <= 255);
        }

        conn.delete(DOGS, &long).await.unwrap();
        assert!(conn.get(DOGS, &long).await.unwrap().is_none());
        assert_eq!(conn.count(DOGS).await.unwrap(), 2);
    }

    #[test]
    fn test_path_component() {
        assert_eq!(path_component("dogs"), "dogs");
        assert_eq!(path_component("Ab"), "%41b");
        assert_eq!(path_component(".x"), "%2Ex");
        assert_eq!(path_component("~"), "%7E");

        let hashed = path_component(&"z".repeat(MAX_COMPONENT_LEN + 1));
        assert!(hashed.starts_with('~'));
        assert_eq!(hashed.len(), 41);
        assert_eq!(path_component(&"z".repeat(MAX_COMPONENT_LEN)).len(), MAX_COMPONENT_LEN);
    }

    #[tokio::test]
    async fn test_count_ignores_non_record_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();
        conn.put(PHOTOS, json!({ "id": "p1", "dogId": "d1", "logDate": "2024-01-01" }))
            .await
            .unwrap();

        fs::write(dir.path().join("inochi-daiji-db/photos/p2.tmp"), b"partial").unwrap();
        assert_eq!(conn.count(PHOTOS).await.unwrap(), 1);
    }

    fn log(id: &str, dog: &str, date: &str) -> Document {
        json!({ "id": id, "dogId": dog, "logDate": date })
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let schema = StoreSchema::new("unique-db", 1)
            .collection(DAILY_LOGS, "id, dogId, &[dogId+logDate]")
            .unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&schema).await.unwrap();

        conn.put(DAILY_LOGS, log("l1", "d1", "2024-01-01")).await.unwrap();
        // Replacing the same record keeps its own key.
        conn.put(DAILY_LOGS, log("l1", "d1", "2024-01-01")).await.unwrap();

        let err = conn
            .put(DAILY_LOGS, log("l2", "d1", "2024-01-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));
        assert_eq!(conn.count(DAILY_LOGS).await.unwrap(), 1);
        assert!(conn.get(DAILY_LOGS, "l2").await.unwrap().is_none());

        conn.put(DAILY_LOGS, log("l2", "d1", "2024-01-02")).await.unwrap();
        assert_eq!(conn.count(DAILY_LOGS).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_to_unique_index_fails_on_existing_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());

        let v1 = StoreSchema::new("unique-db", 1)
            .collection(DAILY_LOGS, "id, dogId, [dogId+logDate]")
            .unwrap();
        let conn = engine.open(&v1).await.unwrap();
        conn.put(DAILY_LOGS, log("l1", "d1", "2024-01-01")).await.unwrap();
        conn.put(DAILY_LOGS, log("l2", "d1", "2024-01-01")).await.unwrap();
        conn.close().await;

        let v2 = StoreSchema::new("unique-db", 2)
            .collection(DAILY_LOGS, "id, dogId, &[dogId+logDate]")
            .unwrap();
        let err = engine.open(&v2).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { .. }));

        // The stored schema is left at v1.
        let conn = engine.open(&v1).await.unwrap();
        assert_eq!(conn.count(DAILY_LOGS).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reopen_recreates_missing_collection_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileEngine::new(dir.path().to_path_buf());
        let conn = engine.open(&StoreSchema::default()).await.unwrap();
        conn.close().await;

        fs::remove_dir_all(dir.path().join("inochi-daiji-db/dogs")).unwrap();

        let conn = engine.open(&StoreSchema::default()).await.unwrap();
        assert!(dir.path().join("inochi-daiji-db/dogs").is_dir());
        conn.put(DOGS, json!({ "id": "d1", "name": "Pochi" })).await.unwrap();
        assert_eq!(conn.count(DOGS).await.unwrap(), 1);
    }
}
