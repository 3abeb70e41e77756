//! keepsake-core - Point-in-time history for mutable records.
//!
//! A host record implements [`Versionable`]; a [`VersionHistory`] captures
//! its state into a SQLite table, skipping captures whose content is already
//! stored for that record, and rebuilds typed records from stored snapshots
//! through an explicit [`TypeRegistry`].
//!
//! # Example
//!
//! ```ignore
//! use keepsake_core::{KeepsakeConfig, TypeRegistry, VersionHistory};
//!
//! let registry = TypeRegistry::builder().register::<Article>().build()?;
//! let history = VersionHistory::open(&KeepsakeConfig::from_env(), registry)?;
//!
//! history.add_version(&article, None)?;
//! for version in history.get_all_versions(&article)? {
//!     println!("{} {}", version.id, version.name);
//! }
//! let earlier: Article = history.restore(version_id)?;
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod tags;
pub mod versioning;

// Re-export commonly used types
pub use audit::{AuditConfig, Auditable, UserAssignableHook};
pub use config::{KeepsakeConfig, VersioningConfig};
pub use error::{ErrorCode, KeepsakeError, KeepsakeResult};
pub use events::{EventBus, EventSubscriber, VersionEvent};
pub use hooks::{CaptureVersionHook, HookRegistry, LifecycleEvent, LifecycleHook};
pub use tags::{slugify, SqliteTagStore, Tag, TagConfig};
pub use versioning::{
    AddOutcome, AsRecordKey, RecordKey, Restored, SqliteVersionStore, TypeRegistry, Version,
    VersionHistory, VersionId, VersionStore, VersionSummary, Versionable,
};
