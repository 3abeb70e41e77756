//! The contract a host record implements to be versioned.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{KeepsakeError, KeepsakeResult};

/// A record whose state can be captured and restored.
///
/// Field values travel through serde, so deriving `Serialize` and
/// `Deserialize` is usually all a host type needs beyond the tag and id.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Article { id: Option<i64>, title: String, body: String }
///
/// impl Versionable for Article {
///     const TYPE_TAG: &'static str = "blog::Article";
///     fn record_id(&self) -> Option<i64> { self.id }
/// }
/// ```
pub trait Versionable: Serialize + DeserializeOwned + Send + 'static {
    /// Tag stored with every snapshot and used to pick a constructor on read.
    const TYPE_TAG: &'static str;

    /// Persisted identifier, `None` until the host has saved the record.
    fn record_id(&self) -> Option<i64>;

    /// Field used as the version name when the caller gives none.
    ///
    /// `None` defers to [`VersioningConfig::name_field`](crate::config::VersioningConfig).
    fn name_field() -> Option<&'static str> {
        None
    }

    /// Current field values as a mapping.
    fn fields(&self) -> KeepsakeResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(KeepsakeError::not_an_object(Self::TYPE_TAG)),
        }
    }

    /// Build a fresh instance from stored field values.
    fn from_fields(fields: Map<String, Value>) -> KeepsakeResult<Self> {
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| KeepsakeError::corrupt_payload(Self::TYPE_TAG, e))
    }
}

/// The `(object_id, object_type)` pair every history query is scoped to.
///
/// This is a lookup key only; the record it names may no longer exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub object_id: i64,
    pub object_type: String,
}

impl RecordKey {
    pub fn new(object_id: i64, object_type: impl Into<String>) -> Self {
        Self {
            object_id,
            object_type: object_type.into(),
        }
    }

    /// Key for a record, `None` if it has not been persisted yet.
    pub fn of<T: Versionable>(record: &T) -> Option<Self> {
        record.record_id().map(|id| Self::new(id, T::TYPE_TAG))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object_type, self.object_id)
    }
}

/// Anything that can scope a history query: a record or a bare key.
pub trait AsRecordKey {
    fn record_key(&self) -> Option<RecordKey>;
}

impl AsRecordKey for RecordKey {
    fn record_key(&self) -> Option<RecordKey> {
        Some(self.clone())
    }
}

impl<T: Versionable> AsRecordKey for T {
    fn record_key(&self) -> Option<RecordKey> {
        RecordKey::of(self)
    }
}

/// Serialize field values to the stored payload.
///
/// `serde_json::Map` keeps keys sorted, so equal field values always produce
/// the same bytes and therefore the same hash.
pub fn encode_payload(fields: &Map<String, Value>) -> KeepsakeResult<String> {
    Ok(serde_json::to_string(fields)?)
}

/// Content fingerprint of a stored payload: lowercase MD5 hex.
pub fn content_hash(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}

/// Pick the version name: the explicit one, else the designated field's value.
pub(crate) fn resolve_name(explicit: Option<&str>, fields: &Map<String, Value>, field: &str) -> String {
    match explicit {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => match fields.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(Value::Array(_)) | Some(Value::Object(_)) => String::new(),
            Some(other) => other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: Option<i64>,
        title: String,
    }

    impl Versionable for Note {
        const TYPE_TAG: &'static str = "test::Note";
        fn record_id(&self) -> Option<i64> {
            self.id
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Bare(i64);

    impl Versionable for Bare {
        const TYPE_TAG: &'static str = "test::Bare";
        fn record_id(&self) -> Option<i64> {
            Some(self.0)
        }
    }

    #[test]
    fn test_record_key() {
        let saved = Note {
            id: Some(3),
            title: "a".into(),
        };
        let unsaved = Note {
            id: None,
            title: "a".into(),
        };

        assert_eq!(RecordKey::of(&saved), Some(RecordKey::new(3, "test::Note")));
        assert_eq!(RecordKey::of(&unsaved), None);
        assert_eq!(saved.record_key().unwrap().to_string(), "test::Note#3");
    }

    #[test]
    fn test_fields_requires_object() {
        let err = Bare(1).fields().unwrap_err();
        assert!(matches!(err, KeepsakeError::Validation { .. }));
    }

    #[test]
    fn test_payload_is_key_order_independent() {
        let mut a = Map::new();
        a.insert("title".into(), json!("x"));
        a.insert("body".into(), json!("y"));
        let mut b = Map::new();
        b.insert("body".into(), json!("y"));
        b.insert("title".into(), json!("x"));

        let pa = encode_payload(&a).unwrap();
        let pb = encode_payload(&b).unwrap();
        assert_eq!(pa, pb);
        assert_eq!(content_hash(&pa), content_hash(&pb));
        assert_eq!(content_hash(&pa).len(), 32);
    }

    #[test]
    fn test_content_hash_is_md5_hex() {
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_resolve_name() {
        let fields = json!({"title": "Draft", "rank": 4, "tags": ["a"]});
        let fields = fields.as_object().unwrap();

        assert_eq!(resolve_name(Some("Manual"), fields, "title"), "Manual");
        assert_eq!(resolve_name(Some(""), fields, "title"), "Draft");
        assert_eq!(resolve_name(None, fields, "title"), "Draft");
        assert_eq!(resolve_name(None, fields, "rank"), "4");
        assert_eq!(resolve_name(None, fields, "tags"), "");
        assert_eq!(resolve_name(None, fields, "missing"), "");
    }

    #[test]
    fn test_from_fields_reports_reconstruction_error() {
        let mut fields = Map::new();
        fields.insert("id".into(), json!("not a number"));
        let err = Note::from_fields(fields).unwrap_err();
        assert!(err.is_reconstruction());
    }
}
