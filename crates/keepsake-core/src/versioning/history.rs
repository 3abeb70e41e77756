//! Snapshot writer and query engine.
//!
//! [`VersionHistory`] turns records into version rows and back. Storage
//! details live behind [`VersionStore`]; type reconstruction goes through the
//! [`TypeRegistry`] handed in at construction.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{KeepsakeConfig, VersioningConfig};
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::events::{EventBus, VersionEvent};
use crate::versioning::record::{content_hash, encode_payload, resolve_name};
use crate::versioning::{
    AddOutcome, AsRecordKey, NewVersion, Restored, SqliteVersionStore, TypeRegistry, Version,
    VersionId, VersionStore, VersionSummary, Versionable,
};

/// Point-in-time history for versionable records.
pub struct VersionHistory {
    store: Arc<dyn VersionStore>,
    registry: TypeRegistry,
    name_field: String,
    events: Option<EventBus>,
}

impl VersionHistory {
    pub fn new(
        store: Arc<dyn VersionStore>,
        registry: TypeRegistry,
        config: &VersioningConfig,
    ) -> Self {
        Self {
            store,
            registry,
            name_field: config.name_field.clone(),
            events: None,
        }
    }

    /// Open the SQLite store named by the configuration.
    pub fn open(config: &KeepsakeConfig, registry: TypeRegistry) -> KeepsakeResult<Self> {
        let store = SqliteVersionStore::new(&config.database_path, &config.versioning)?;
        Ok(Self::new(Arc::new(store), registry, &config.versioning))
    }

    /// Emit [`VersionEvent`]s on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    fn emit(&self, event: VersionEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    // ------------------------------------------------------------------
    // Writer
    // ------------------------------------------------------------------

    /// Capture the record's current state.
    ///
    /// An empty or missing `name` falls back to the record's designated
    /// display field.
    pub fn add_version<T: Versionable>(
        &self,
        record: &T,
        name: Option<&str>,
    ) -> KeepsakeResult<AddOutcome> {
        self.add_version_at(record, name, Utc::now())
    }

    /// Capture the record's state with an explicit capture time.
    ///
    /// Fails with a `Validation` error, writing nothing, when the fields would
    /// not restore the record or `captured_at` is outside years 0000-9999.
    pub fn add_version_at<T: Versionable>(
        &self,
        record: &T,
        name: Option<&str>,
        captured_at: DateTime<Utc>,
    ) -> KeepsakeResult<AddOutcome> {
        let Some(key) = record.record_key() else {
            debug!(object_type = T::TYPE_TAG, "record has no id yet, nothing to version");
            return Ok(AddOutcome::Unsaved);
        };

        let fields = record.fields()?;
        // NaN and infinities serialize as null; refuse what would not restore.
        T::from_fields(fields.clone()).map_err(|e| KeepsakeError::not_restorable(T::TYPE_TAG, e))?;
        let data = encode_payload(&fields)?;
        let hash = content_hash(&data);
        let name_field = T::name_field().unwrap_or(self.name_field.as_str());

        let version = NewVersion {
            name: resolve_name(name, &fields, name_field),
            key,
            data,
            hash,
            captured_at,
        };

        match self.store.insert(&version)? {
            Some(version_id) => {
                debug!(record = %version.key, version_id, hash = %version.hash, "captured version");
                self.emit(VersionEvent::Captured {
                    key: version.key,
                    version_id,
                    hash: version.hash,
                    timestamp: captured_at,
                });
                Ok(AddOutcome::Created(version_id))
            }
            None => {
                debug!(record = %version.key, hash = %version.hash, "content unchanged, no new version");
                self.emit(VersionEvent::Deduplicated {
                    key: version.key,
                    hash: version.hash,
                    timestamp: captured_at,
                });
                Ok(AddOutcome::Duplicate)
            }
        }
    }

    // ------------------------------------------------------------------
    // Reader
    // ------------------------------------------------------------------

    /// Raw version row, without reconstruction.
    pub fn find_version(&self, id: VersionId) -> KeepsakeResult<Option<Version>> {
        self.store.find(id)
    }

    /// Rebuild the entity stored in version `id` as whatever type its tag names.
    pub fn get_version(&self, id: VersionId) -> KeepsakeResult<Restored> {
        let version = self
            .store
            .find(id)?
            .ok_or_else(|| KeepsakeError::not_found(id))?;

        let entity = version
            .fields()
            .and_then(|fields| self.registry.construct(&version.object_type, fields));

        match entity {
            Ok(entity) => Ok(Restored::new(version, entity)),
            Err(e) => {
                warn!(version_id = id, object_type = %version.object_type, error = %e, "failed to reconstruct version");
                Err(e)
            }
        }
    }

    /// Rebuild version `id` as a `T`; the stored tag must be `T::TYPE_TAG`.
    pub fn restore<T: Versionable>(&self, id: VersionId) -> KeepsakeResult<T> {
        let version = self
            .store
            .find(id)?
            .ok_or_else(|| KeepsakeError::not_found(id))?;

        if version.object_type != T::TYPE_TAG {
            return Err(KeepsakeError::type_mismatch(T::TYPE_TAG, version.object_type));
        }
        T::from_fields(version.fields()?)
    }

    /// Every version of a record, most recently updated first.
    pub fn get_all_versions(&self, record: &impl AsRecordKey) -> KeepsakeResult<Vec<Version>> {
        match record.record_key() {
            Some(key) => self.store.list(&key),
            None => Ok(Vec::new()),
        }
    }

    /// Most recently captured version of a record.
    pub fn latest_version(&self, record: &impl AsRecordKey) -> KeepsakeResult<Option<Version>> {
        match record.record_key() {
            Some(key) => self.store.latest(&key),
            None => Ok(None),
        }
    }

    pub fn count_versions(&self, record: &impl AsRecordKey) -> KeepsakeResult<usize> {
        match record.record_key() {
            Some(key) => self.store.count(&key),
            None => Ok(0),
        }
    }

    pub fn summary(&self, record: &impl AsRecordKey) -> KeepsakeResult<Option<VersionSummary>> {
        match record.record_key() {
            Some(key) => self.store.summary(&key),
            None => Ok(None),
        }
    }

    /// Total versions across all records.
    pub fn count_all(&self) -> KeepsakeResult<usize> {
        self.store.count_all()
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete one version. Returns false if it did not exist.
    pub fn remove_version(&self, id: VersionId) -> KeepsakeResult<bool> {
        let removed = self.store.delete(id)?;
        if removed {
            debug!(version_id = id, "removed version");
            self.emit(VersionEvent::Removed {
                version_id: id,
                timestamp: Utc::now(),
            });
        }
        Ok(removed)
    }

    /// Delete every version of a record. Returns the number deleted.
    pub fn remove_all_versions(&self, record: &impl AsRecordKey) -> KeepsakeResult<usize> {
        let Some(key) = record.record_key() else {
            return Ok(0);
        };
        let count = self.store.delete_all(&key)?;
        self.purged(key, count);
        Ok(count)
    }

    /// Delete all but the `keep` most recent versions of a record.
    pub fn prune_versions(&self, record: &impl AsRecordKey, keep: usize) -> KeepsakeResult<usize> {
        let Some(key) = record.record_key() else {
            return Ok(0);
        };
        let count = self.store.prune(&key, keep)?;
        self.purged(key, count);
        Ok(count)
    }

    fn purged(&self, key: crate::versioning::RecordKey, count: usize) {
        if count == 0 {
            return;
        }
        debug!(record = %key, count, "removed versions");
        self.emit(VersionEvent::Purged {
            key,
            count,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::RecordKey;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Page {
        id: Option<i64>,
        title: String,
        headline: String,
    }

    impl Versionable for Page {
        const TYPE_TAG: &'static str = "cms::Page";
        fn record_id(&self) -> Option<i64> {
            self.id
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Banner {
        id: Option<i64>,
        headline: String,
    }

    impl Versionable for Banner {
        const TYPE_TAG: &'static str = "cms::Banner";
        fn record_id(&self) -> Option<i64> {
            self.id
        }
        fn name_field() -> Option<&'static str> {
            Some("headline")
        }
    }

    fn history() -> VersionHistory {
        let registry = TypeRegistry::builder()
            .register::<Page>()
            .register::<Banner>()
            .build()
            .unwrap();
        VersionHistory::new(
            Arc::new(SqliteVersionStore::in_memory().unwrap()),
            registry,
            &VersioningConfig::default(),
        )
    }

    fn page(id: Option<i64>, title: &str) -> Page {
        Page {
            id,
            title: title.to_string(),
            headline: format!("{} headline", title),
        }
    }

    #[test]
    fn test_unsaved_record_is_a_no_op() {
        let history = history();
        let outcome = history.add_version(&page(None, "Draft"), None).unwrap();

        assert_eq!(outcome, AddOutcome::Unsaved);
        assert_eq!(history.count_all().unwrap(), 0);
        assert!(history.get_all_versions(&page(None, "Draft")).unwrap().is_empty());
        assert_eq!(history.remove_all_versions(&page(None, "Draft")).unwrap(), 0);
    }

    #[test]
    fn test_name_defaults() {
        let history = history();

        let id = history
            .add_version(&page(Some(1), "Draft"), None)
            .unwrap()
            .version_id()
            .unwrap();
        assert_eq!(history.find_version(id).unwrap().unwrap().name, "Draft");

        let id = history
            .add_version(&page(Some(1), "Second"), Some("manual label"))
            .unwrap()
            .version_id()
            .unwrap();
        assert_eq!(history.find_version(id).unwrap().unwrap().name, "manual label");

        let banner = Banner {
            id: Some(1),
            headline: "Sale".into(),
        };
        let id = history.add_version(&banner, Some("")).unwrap().version_id().unwrap();
        assert_eq!(history.find_version(id).unwrap().unwrap().name, "Sale");
    }

    #[test]
    fn test_configured_name_field() {
        let config = VersioningConfig {
            name_field: "headline".to_string(),
            ..Default::default()
        };
        let history = VersionHistory::new(
            Arc::new(SqliteVersionStore::in_memory().unwrap()),
            TypeRegistry::default(),
            &config,
        );

        let id = history
            .add_version(&page(Some(1), "Draft"), None)
            .unwrap()
            .version_id()
            .unwrap();
        assert_eq!(
            history.find_version(id).unwrap().unwrap().name,
            "Draft headline"
        );
    }

    #[test]
    fn test_get_version_dispatches_on_stored_tag() {
        let history = history();
        let banner = Banner {
            id: Some(7),
            headline: "Hello".into(),
        };
        let id = history.add_version(&banner, None).unwrap().version_id().unwrap();

        let restored = history.get_version(id).unwrap();
        assert_eq!(restored.object_type(), "cms::Banner");
        assert!(restored.is::<Banner>());
        assert!(!restored.is::<Page>());
        assert_eq!(restored.downcast::<Banner>().unwrap(), banner);
    }

    #[test]
    fn test_get_version_not_found() {
        let err = history().get_version(99).unwrap_err();
        assert!(matches!(err, KeepsakeError::NotFound { version_id: Some(99), .. }));
    }

    #[test]
    fn test_restore_checks_type() {
        let history = history();
        let id = history
            .add_version(&page(Some(3), "Typed"), None)
            .unwrap()
            .version_id()
            .unwrap();

        assert_eq!(history.restore::<Page>(id).unwrap(), page(Some(3), "Typed"));
        let err = history.restore::<Banner>(id).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::VerTypeMismatch);
    }

    #[test]
    fn test_queries_accept_bare_keys() {
        let history = history();
        history.add_version(&page(Some(4), "A"), None).unwrap();
        history.add_version(&page(Some(4), "B"), None).unwrap();

        let key = RecordKey::new(4, "cms::Page");
        assert_eq!(history.count_versions(&key).unwrap(), 2);
        assert_eq!(history.latest_version(&key).unwrap().unwrap().name, "B");
        assert_eq!(history.summary(&key).unwrap().unwrap().total_versions, 2);
        assert_eq!(history.prune_versions(&key, 1).unwrap(), 1);
        assert_eq!(history.count_versions(&page(Some(4), "ignored")).unwrap(), 1);
    }

    #[test]
    fn test_events_emitted() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let history = history().with_event_bus(bus);
        let record = page(Some(1), "Draft");

        let id = history.add_version(&record, None).unwrap().version_id().unwrap();
        history.add_version(&record, None).unwrap();
        history.remove_version(id).unwrap();
        history.remove_version(id).unwrap();

        let types: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            vec!["version.captured", "version.deduplicated", "version.removed"]
        );
    }
}
