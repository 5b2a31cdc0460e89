//! # Records — dogs, daily logs, and photos
//!
//! The three record types persisted by the store. They serialise with camelCase
//! field names (`dogId`, `logDate`, `createdAt`, ...) because index key paths are
//! declared against those names in [`crate::schema`]. Optional fields are skipped
//! when absent so stored documents only carry what was set.
//!
//! | Struct | Collection | Relations |
//! |--------|------------|-----------|
//! | [`Dog`] | `dogs` | owns daily logs and photos through their `dogId` |
//! | [`DailyLog`] | `daily_logs` | `dogId` → Dog, optional `photoId` → Photo |
//! | [`Photo`] | `photos` | `dogId` + `logDate` copied from its daily log |
//!
//! None of the relations are enforced by the store: deleting a dog leaves its
//! logs and photos in place.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::now_timestamp;
use crate::schema::{DAILY_LOGS, DOGS, PHOTOS};
use crate::validate::Validate;

/// A record type that lives in one collection of the store.
pub trait Record: Serialize + DeserializeOwned + Validate {
    /// Collection this record type is stored in.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// An owner's profile for one tracked dog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dog {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Lower bound of the target weight range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_min: Option<f64>,
    /// Upper bound of the target weight range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_max: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Dog {
    /// A new dog with a fresh id and both timestamps set to now.
    pub fn new(name: &str) -> Self {
        let now = now_timestamp();
        Self {
            id: new_id(),
            name: name.to_string(),
            birthday: None,
            breed: None,
            memo: None,
            target_min: None,
            target_max: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_birthday(mut self, birthday: &str) -> Self {
        self.birthday = Some(birthday.to_string());
        self
    }

    pub fn with_breed(mut self, breed: &str) -> Self {
        self.breed = Some(breed.to_string());
        self
    }

    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = Some(memo.to_string());
        self
    }

    pub fn with_target(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.target_min = min;
        self.target_max = max;
        self
    }

    /// Mark the record as modified.
    pub fn touch(&mut self) {
        self.updated_at = now_timestamp();
    }
}

impl Record for Dog {
    const COLLECTION: &'static str = DOGS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// One day's observations for a dog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    pub id: String,
    pub dog_id: String,
    /// Calendar date `YYYY-MM-DD` in JST.
    pub log_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DailyLog {
    pub fn new(dog_id: &str, log_date: &str) -> Self {
        let now = now_timestamp();
        Self {
            id: new_id(),
            dog_id: dog_id.to_string(),
            log_date: log_date.to_string(),
            weight: None,
            memo: None,
            photo_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = Some(memo.to_string());
        self
    }

    /// Link a photo taken for this entry.
    pub fn with_photo(mut self, photo: &Photo) -> Self {
        self.photo_id = Some(photo.id.clone());
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = now_timestamp();
    }
}

impl Record for DailyLog {
    const COLLECTION: &'static str = DAILY_LOGS;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A binary image attached to a dog on a given date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub dog_id: String,
    pub log_date: String,
    /// Image bytes, stored as a base64 string.
    #[serde(with = "base64_blob")]
    pub blob: Vec<u8>,
    pub mime_type: String,
    /// Length of `blob` in bytes.
    pub size: u64,
    pub created_at: String,
}

impl Photo {
    /// A new photo; `size` is taken from the blob.
    pub fn new(dog_id: &str, log_date: &str, blob: Vec<u8>, mime_type: &str) -> Self {
        Self {
            id: new_id(),
            dog_id: dog_id.to_string(),
            log_date: log_date.to_string(),
            size: blob.len() as u64,
            blob,
            mime_type: mime_type.to_string(),
            created_at: now_timestamp(),
        }
    }

    /// A photo for the same dog and date as `log`.
    pub fn for_log(log: &DailyLog, blob: Vec<u8>, mime_type: &str) -> Self {
        Self::new(&log.dog_id, &log.log_date, blob, mime_type)
    }
}

impl Record for Photo {
    const COLLECTION: &'static str = PHOTOS;

    fn id(&self) -> &str {
        &self.id
    }
}

mod base64_blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
