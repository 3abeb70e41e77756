//! Version lifecycle event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::versioning::{RecordKey, VersionId};

/// Events emitted by [`VersionHistory`](crate::versioning::VersionHistory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionEvent {
    /// A new version row was written
    Captured {
        key: RecordKey,
        version_id: VersionId,
        hash: String,
        timestamp: DateTime<Utc>,
    },
    /// A capture matched stored content and wrote nothing
    Deduplicated {
        key: RecordKey,
        hash: String,
        timestamp: DateTime<Utc>,
    },
    /// A single version was deleted
    Removed {
        version_id: VersionId,
        timestamp: DateTime<Utc>,
    },
    /// Versions of a record were deleted in bulk
    Purged {
        key: RecordKey,
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl VersionEvent {
    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Captured { .. } => "version.captured",
            Self::Deduplicated { .. } => "version.deduplicated",
            Self::Removed { .. } => "version.removed",
            Self::Purged { .. } => "version.purged",
        }
    }

    /// Record the event concerns, when known
    pub fn key(&self) -> Option<&RecordKey> {
        match self {
            Self::Captured { key, .. } | Self::Deduplicated { key, .. } | Self::Purged { key, .. } => {
                Some(key)
            }
            Self::Removed { .. } => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Captured { timestamp, .. }
            | Self::Deduplicated { timestamp, .. }
            | Self::Removed { timestamp, .. }
            | Self::Purged { timestamp, .. } => *timestamp,
        }
    }
}
