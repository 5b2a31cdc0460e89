//! Record validation run by [`crate::Table::put`] before anything is written.
//!
//! Checks are local to one record. References between records (a log's `dogId`,
//! its `photoId`) are not resolved here.

use crate::clock::{is_timestamp, parse_log_date};
use crate::error::ValidationError;
use crate::models::{DailyLog, Dog, Photo};

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

fn date(field: &'static str, value: &str) -> Result<(), ValidationError> {
    match parse_log_date(value) {
        Some(_) => Ok(()),
        None => Err(ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        }),
    }
}

fn timestamp(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if !is_timestamp(value) {
        return Err(ValidationError::InvalidTimestamp {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn measurement(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ValidationError::InvalidNumber { field, value: v }),
        _ => Ok(()),
    }
}

impl Validate for Dog {
    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("id", &self.id)?;
        non_empty("name", &self.name)?;
        if let Some(birthday) = &self.birthday {
            date("birthday", birthday)?;
        }

        measurement("targetMin", self.target_min)?;
        measurement("targetMax", self.target_max)?;
        if let (Some(min), Some(max)) = (self.target_min, self.target_max) {
            if min > max {
                return Err(ValidationError::TargetRange { min, max });
            }
        }

        timestamp("createdAt", &self.created_at)?;
        timestamp("updatedAt", &self.updated_at)
    }
}

impl Validate for DailyLog {
    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("id", &self.id)?;
        non_empty("dogId", &self.dog_id)?;
        date("logDate", &self.log_date)?;
        measurement("weight", self.weight)?;
        if let Some(photo_id) = &self.photo_id {
            non_empty("photoId", photo_id)?;
        }
        timestamp("createdAt", &self.created_at)?;
        timestamp("updatedAt", &self.updated_at)
    }
}

impl Validate for Photo {
    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("id", &self.id)?;
        non_empty("dogId", &self.dog_id)?;
        date("logDate", &self.log_date)?;

        if !self.mime_type.starts_with("image/") {
            return Err(ValidationError::InvalidMimeType(self.mime_type.clone()));
        }
        let actual = self.blob.len() as u64;
        if self.size != actual {
            return Err(ValidationError::SizeMismatch {
                declared: self.size,
                actual,
            });
        }

        timestamp("createdAt", &self.created_at)
    }
}
