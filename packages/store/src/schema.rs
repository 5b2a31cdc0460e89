//! # Store schema — collections, primary keys, and indexes
//!
//! A [`StoreSchema`] is the explicit configuration of one named, versioned
//! database: a list of [`CollectionSchema`]s, each with a primary key field and a
//! set of [`IndexDef`]s. Schemas are validated when a store is opened, and the
//! engine persists them so that later opens can decide whether an upgrade step
//! is needed (see [`plan_open`]).
//!
//! ## Declaration strings
//!
//! Collections can be declared with compact, comma-separated strings:
//!
//! ```text
//! "id, dogId, logDate, [dogId+logDate]"
//! ```
//!
//! The first entry is the primary key; every following entry is an index.
//!
//! | Entry | Meaning |
//! |-------|---------|
//! | `field` | index on one field, named after the field |
//! | `[a+b]` | composite index on `(a, b)`, named `a+b` |
//! | `&field`, `&[a+b]` | unique index; a second record with the same key is rejected |
//!
//! Auto-increment (`++`) and multi-entry (`*`) prefixes are not supported.
//!
//! ## Version 1
//!
//! | Collection | Primary key | Indexes |
//! |------------|-------------|---------|
//! | `dogs` | `id` | `name` |
//! | `daily_logs` | `id` | `dogId`, `logDate`, `dogId+logDate` |
//! | `photos` | `id` | `dogId`, `logDate` |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::key::{extract_key, string_at, Document, IndexKey};

pub const DEFAULT_DB_NAME: &str = "inochi-daiji-db";
pub const SCHEMA_VERSION: u32 = 1;

pub const DOGS: &str = "dogs";
pub const DAILY_LOGS: &str = "daily_logs";
pub const PHOTOS: &str = "photos";

/// Name of the composite daily log index.
pub const DOG_ID_LOG_DATE: &str = "dogId+logDate";

/// A secondary index over one or more string fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub key_path: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// Index on a single field, named after it.
    pub fn new(field: &str) -> Self {
        Self {
            name: field.to_string(),
            key_path: vec![field.to_string()],
            unique: false,
        }
    }

    /// Index on several fields jointly, named `a+b+...`.
    pub fn composite(fields: &[&str]) -> Self {
        Self {
            name: fields.join("+"),
            key_path: fields.iter().map(|f| f.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_composite(&self) -> bool {
        self.key_path.len() > 1
    }

    pub fn key_of(&self, doc: &Document) -> Option<IndexKey> {
        extract_key(doc, &self.key_path)
    }

    fn parse(entry: &str) -> Result<Self> {
        let (unique, rest) = match entry.strip_prefix('&') {
            Some(rest) => (true, rest),
            None => (false, entry),
        };
        if rest.starts_with("++") || rest.starts_with('*') {
            return Err(StoreError::Schema(format!(
                "unsupported index modifier in {entry:?}"
            )));
        }

        let index = match rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            Some(inner) => {
                let fields: Vec<&str> = inner.split('+').map(str::trim).collect();
                for field in &fields {
                    check_field_name(field, entry)?;
                }
                IndexDef::composite(&fields)
            }
            None => {
                check_field_name(rest, entry)?;
                IndexDef::new(rest)
            }
        };

        Ok(Self { unique, ..index })
    }
}

fn check_field_name(field: &str, entry: &str) -> Result<()> {
    let bad = field.is_empty()
        || field
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '[' | ']' | '+' | '&' | '*' | ','));
    if bad {
        return Err(StoreError::Schema(format!(
            "invalid field name {field:?} in {entry:?}"
        )));
    }
    Ok(())
}

/// One named collection of records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub primary_key: String,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl CollectionSchema {
    pub fn new(name: &str, primary_key: &str, indexes: Vec<IndexDef>) -> Self {
        Self {
            name: name.to_string(),
            primary_key: primary_key.to_string(),
            indexes,
        }
    }

    /// Parse a declaration string such as `"id, dogId, [dogId+logDate]"`.
    pub fn parse(name: &str, declaration: &str) -> Result<Self> {
        let mut entries = declaration
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty());

        let primary_key = entries.next().ok_or_else(|| {
            StoreError::Schema(format!("collection {name:?} declares no primary key"))
        })?;
        check_field_name(primary_key, declaration)?;

        let indexes = entries.map(IndexDef::parse).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, primary_key, indexes))
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Primary key value of a document, if it holds a string there.
    pub fn primary_key_of<'a>(&self, doc: &'a Document) -> Option<&'a str> {
        string_at(doc, &self.primary_key)
    }

    pub fn unique_indexes(&self) -> impl Iterator<Item = &IndexDef> {
        self.indexes.iter().filter(|i| i.unique)
    }

    /// Look up an index and check that `key` has one part per indexed field.
    pub fn require_index(&self, name: &str, key: &IndexKey) -> Result<&IndexDef> {
        let index = self.index(name).ok_or_else(|| StoreError::UnknownIndex {
            collection: self.name.clone(),
            index: name.to_string(),
        })?;
        if index.key_path.len() != key.len() {
            return Err(StoreError::KeyArity {
                index: index.name.clone(),
                expected: index.key_path.len(),
                actual: key.len(),
            });
        }
        Ok(index)
    }

    /// Primary key of a document, or [`StoreError::MissingKey`].
    pub fn require_primary_key<'a>(&self, doc: &'a Document) -> Result<&'a str> {
        self.primary_key_of(doc)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::MissingKey {
                collection: self.name.clone(),
                key_path: self.primary_key.clone(),
            })
    }

    fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(StoreError::Schema(format!("{}: {msg}", self.name)));

        if self.name.trim().is_empty() {
            return Err(StoreError::Schema("collection name is empty".into()));
        }
        if self.primary_key.trim().is_empty() {
            return fail("primary key is empty".into());
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return fail(format!("index {:?} declared twice", index.name));
            }
            if index.key_path.is_empty() || index.key_path.iter().any(|f| f.is_empty()) {
                return fail(format!("index {:?} has an empty key path", index.name));
            }
            if index.key_path == [self.primary_key.clone()] {
                return fail(format!("index {:?} duplicates the primary key", index.name));
            }
            let distinct: HashSet<_> = index.key_path.iter().collect();
            if distinct.len() != index.key_path.len() {
                return fail(format!("index {:?} repeats a field", index.name));
            }
        }
        Ok(())
    }
}

/// The full declaration of a named, versioned store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub collections: Vec<CollectionSchema>,
}

impl StoreSchema {
    pub fn new(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            version,
            collections: Vec::new(),
        }
    }

    /// Builder: add a collection from a declaration string.
    pub fn collection(mut self, name: &str, declaration: &str) -> Result<Self> {
        self.collections
            .push(CollectionSchema::parse(name, declaration)?);
        Ok(self)
    }

    /// The version 1 schema of the dog tracker under the given database name.
    pub fn v1(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: SCHEMA_VERSION,
            collections: vec![
                CollectionSchema::new(DOGS, "id", vec![IndexDef::new("name")]),
                CollectionSchema::new(
                    DAILY_LOGS,
                    "id",
                    vec![
                        IndexDef::new("dogId"),
                        IndexDef::new("logDate"),
                        IndexDef::composite(&["dogId", "logDate"]),
                    ],
                ),
                CollectionSchema::new(
                    PHOTOS,
                    "id",
                    vec![IndexDef::new("dogId"), IndexDef::new("logDate")],
                ),
            ],
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn get_collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn require_collection(&self, name: &str) -> Result<&CollectionSchema> {
        self.get_collection(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }

    /// Check the schema before a store is opened with it.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Schema("store name is empty".into()));
        }
        if self.version == 0 {
            return Err(StoreError::Schema("version must be at least 1".into()));
        }
        if self.collections.is_empty() {
            return Err(StoreError::Schema(format!(
                "store {:?} declares no collections",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for collection in &self.collections {
            if !seen.insert(collection.name.as_str()) {
                return Err(StoreError::Schema(format!(
                    "collection {:?} declared twice",
                    collection.name
                )));
            }
            collection.validate()?;
        }
        Ok(())
    }
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self::v1(DEFAULT_DB_NAME)
    }
}

/// What an engine has to do when opening a database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenAction {
    /// Nothing is stored yet.
    Create,
    /// Stored version is older; rebuild to the declared schema.
    Upgrade { from: u32 },
    /// Stored schema matches the declared one.
    Reuse,
}

/// Compare what an engine has persisted against the declared schema.
pub fn plan_open(stored: Option<(u32, &StoreSchema)>, declared: &StoreSchema) -> Result<OpenAction> {
    let Some((stored_version, stored_schema)) = stored else {
        return Ok(OpenAction::Create);
    };

    if stored_version > declared.version {
        return Err(StoreError::VersionDowngrade {
            name: declared.name.clone(),
            stored: stored_version,
            requested: declared.version,
        });
    }
    if stored_version < declared.version {
        return Ok(OpenAction::Upgrade {
            from: stored_version,
        });
    }
    if stored_schema.collections != declared.collections {
        return Err(StoreError::Schema(format!(
            "schema of {:?} changed without a version bump (still version {})",
            declared.name, declared.version
        )));
    }
    Ok(OpenAction::Reuse)
}
