//! Version types for point-in-time record history.
//!
//! A version is an immutable snapshot of a record's field values. Editing
//! history means writing a new version, never mutating an old one.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

use crate::error::{KeepsakeError, KeepsakeResult};
use crate::versioning::record::{RecordKey, Versionable};

/// Surrogate key of a stored version.
pub type VersionId = i64;

/// A stored snapshot row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Unique version identifier
    pub id: VersionId,
    /// Record this version belongs to
    pub object_id: i64,
    /// Type tag of that record
    pub object_type: String,
    /// Human-readable label
    pub name: String,
    /// Serialized field values
    pub data: String,
    /// MD5 hex of `data`
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Version {
    /// The record this version belongs to.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.object_id, self.object_type.clone())
    }

    /// Parse the stored payload back into field values.
    pub fn fields(&self) -> KeepsakeResult<Map<String, Value>> {
        match serde_json::from_str::<Value>(&self.data) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(KeepsakeError::corrupt_payload(
                self.object_type.clone(),
                NotAnObject,
            )),
            Err(e) => Err(KeepsakeError::corrupt_payload(self.object_type.clone(), e)),
        }
    }
}

#[derive(Debug)]
struct NotAnObject;

impl fmt::Display for NotAnObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("payload is not a JSON object")
    }
}

impl std::error::Error for NotAnObject {}

/// A version ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub key: RecordKey,
    pub name: String,
    pub data: String,
    pub hash: String,
    pub captured_at: DateTime<Utc>,
}

/// What a capture attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new version row was written
    Created(VersionId),
    /// Identical content is already stored for this record
    Duplicate,
    /// The record has no identifier yet, so there is nothing to version
    Unsaved,
}

impl AddOutcome {
    /// Id of the new version, if one was written.
    pub fn version_id(&self) -> Option<VersionId> {
        match self {
            Self::Created(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Summary of the stored history of one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSummary {
    pub key: RecordKey,
    pub total_versions: usize,
    pub latest_version_id: VersionId,
    pub first_captured: DateTime<Utc>,
    pub last_captured: DateTime<Utc>,
}

/// A record rebuilt from a stored version.
pub struct Restored {
    pub version: Version,
    entity: Box<dyn Any + Send>,
}

impl Restored {
    pub(crate) fn new(version: Version, entity: Box<dyn Any + Send>) -> Self {
        Self { version, entity }
    }

    /// Type tag the entity was rebuilt from.
    pub fn object_type(&self) -> &str {
        &self.version.object_type
    }

    /// Whether the entity is a `T`.
    pub fn is<T: Versionable>(&self) -> bool {
        self.entity.is::<T>()
    }

    /// Borrow the entity as a `T`.
    pub fn downcast_ref<T: Versionable>(&self) -> Option<&T> {
        self.entity.downcast_ref::<T>()
    }

    /// Take the entity as a `T`.
    pub fn downcast<T: Versionable>(self) -> KeepsakeResult<T> {
        let found = self.version.object_type;
        self.entity
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| KeepsakeError::type_mismatch(T::TYPE_TAG, found))
    }
}

impl fmt::Debug for Restored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Restored")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Storage form of a capture timestamp.
///
/// Fixed width with microseconds, so text ordering matches time ordering.
/// Years outside 0000-9999 would break that and are rejected.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> KeepsakeResult<String> {
    if !(0..=9999).contains(&ts.year()) {
        return Err(KeepsakeError::capture_time_out_of_range(ts));
    }
    Ok(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub(crate) fn parse_timestamp(raw: &str) -> KeepsakeResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| KeepsakeError::parse_timestamp(format!("'{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(data: &str) -> Version {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Version {
            id: 1,
            object_id: 42,
            object_type: "blog::Article".to_string(),
            name: "Draft".to_string(),
            data: data.to_string(),
            hash: String::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_add_outcome() {
        assert_eq!(AddOutcome::Created(9).version_id(), Some(9));
        assert!(AddOutcome::Created(9).is_created());
        assert_eq!(AddOutcome::Duplicate.version_id(), None);
        assert!(!AddOutcome::Unsaved.is_created());
    }

    #[test]
    fn test_version_fields() {
        let v = sample(r#"{"id":42,"title":"Draft"}"#);
        let fields = v.fields().unwrap();
        assert_eq!(fields["title"], "Draft");
        assert_eq!(v.key(), RecordKey::new(42, "blog::Article"));
    }

    #[test]
    fn test_version_fields_rejects_non_object() {
        assert!(sample("[1,2]").fields().unwrap_err().is_reconstruction());
        assert!(sample("{truncated").fields().unwrap_err().is_reconstruction());
    }

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let a = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (fa, fb) = (format_timestamp(&a).unwrap(), format_timestamp(&b).unwrap());

        assert_eq!(fa, "2024-05-01T12:00:00.000000Z");
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fb).unwrap(), b);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_timestamp_outside_four_digit_years_is_rejected() {
        let far = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();
        let err = format_timestamp(&far).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValInvalidInput);

        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(format_timestamp(&last).unwrap(), "9999-12-31T23:59:59.000000Z");
    }
}
