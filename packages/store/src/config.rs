//! # Store configuration — `inochi.toml`
//!
//! Tells the application which database to open and where the filesystem engine
//! keeps it.
//!
//! ## Structure
//!
//! ```toml
//! [database]
//! name = "inochi-daiji-db"    # database name (default shown)
//!
//! [storage]
//! data_dir = "/var/lib/inochi" # optional; platform data dir when omitted
//! ```
//!
//! ## Types
//!
//! | Struct | Purpose |
//! |--------|---------|
//! | [`StoreConfig`] | Top-level config with TOML (de)serialisation, builder helpers, and the canonical filename. |
//! | [`DatabaseConfig`] | Database section: the store `name`. |
//! | [`StorageConfig`] | Storage section: optional `data_dir` for [`crate::FileEngine`]. |
//!
//! Every section defaults, so a missing or empty file is the default configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::schema::{StoreSchema, DEFAULT_DB_NAME};

/// Directory created under the platform data dir when none is configured.
const APP_DIR: &str = "inochi-daiji";

/// Top-level configuration stored in `inochi.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_name")]
    pub name: String,
}

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_db_name(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory of the filesystem engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(name: &str) -> Self {
        Self {
            database: DatabaseConfig {
                name: name.to_string(),
            },
            storage: StorageConfig::default(),
        }
    }

    /// Builder method to pin the data directory.
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.storage.data_dir = Some(dir);
        self
    }

    /// The well-known filename for the config file.
    pub fn filename() -> &'static str {
        "inochi.toml"
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The version 1 schema under the configured database name.
    pub fn schema(&self) -> StoreSchema {
        StoreSchema::v1(&self.database.name)
    }

    /// Configured data directory, or the platform default.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }
        platform_data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| StoreError::StorageUnavailable("no platform data directory".into()))
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn platform_data_dir() -> Option<PathBuf> {
    dirs::data_dir()
}

#[cfg(target_arch = "wasm32")]
fn platform_data_dir() -> Option<PathBuf> {
    None
}
