//! Point-in-time record history.
//!
//! Each capture stores an immutable snapshot of a record's field values.
//! Captures whose content matches a stored snapshot of the same record are
//! dropped by the storage layer, so saving an unchanged record is free.

mod history;
mod record;
mod registry;
mod store;
mod version;

pub use history::VersionHistory;
pub use record::{content_hash, encode_payload, AsRecordKey, RecordKey, Versionable};
pub use registry::{TypeRegistry, TypeRegistryBuilder};
pub use store::{SqliteVersionStore, VersionStore};
pub(crate) use store::open_connection;
pub use version::{AddOutcome, NewVersion, Restored, Version, VersionId, VersionSummary};
