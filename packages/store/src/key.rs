//! Documents and index keys.
//!
//! Engines store records as JSON [`Document`]s and read primary keys and index
//! keys out of them by key path. An [`IndexKey`] holds one string part per
//! field of the index: one part for a simple index, two or more for a composite.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record as stored by an engine.
pub type Document = Value;

/// Key used to look up records through an index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexKey(pub Vec<String>);

impl IndexKey {
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single:?}"),
            parts => write!(f, "{parts:?}"),
        }
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey(vec![value.to_string()])
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey(vec![value])
    }
}

impl From<(&str, &str)> for IndexKey {
    fn from((a, b): (&str, &str)) -> Self {
        IndexKey(vec![a.to_string(), b.to_string()])
    }
}

impl<const N: usize> From<[&str; N]> for IndexKey {
    fn from(parts: [&str; N]) -> Self {
        IndexKey(parts.iter().map(|p| p.to_string()).collect())
    }
}

impl From<Vec<String>> for IndexKey {
    fn from(parts: Vec<String>) -> Self {
        IndexKey(parts)
    }
}

/// Read a string field from a document. Non-string values count as absent.
pub fn string_at<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field)?.as_str()
}

/// Extract the key for `key_path` from a document.
///
/// Returns `None` when any field is missing or not a string; such records are
/// left out of the index.
pub fn extract_key(doc: &Document, key_path: &[String]) -> Option<IndexKey> {
    key_path
        .iter()
        .map(|field| string_at(doc, field).map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .map(IndexKey)
}
