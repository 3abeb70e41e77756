//! Explicit lifecycle hooks for host records.
//!
//! Keepsake never intercepts a host's persistence layer. The host owns a
//! [`HookRegistry`] and calls [`HookRegistry::dispatch`] from its own
//! create/update/delete paths; registered hooks run in registration order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::KeepsakeResult;
use crate::versioning::{AddOutcome, VersionHistory, Versionable};

/// Points in a record's lifecycle a host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Before a new record is first written
    Creating,
    /// After a new record is first written
    Created,
    /// Before an existing record is written
    Updating,
    /// After an existing record is written
    Updated,
    /// Before a record is deleted
    Deleting,
    /// After a record is deleted
    Deleted,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }

    /// Whether the event fires before the host writes.
    pub fn is_before(&self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callback run on record lifecycle events.
pub trait LifecycleHook<R>: Send + Sync {
    fn handle(&self, event: LifecycleEvent, record: &mut R) -> KeepsakeResult<()>;
}

impl<R, F> LifecycleHook<R> for F
where
    F: Fn(LifecycleEvent, &mut R) -> KeepsakeResult<()> + Send + Sync,
{
    fn handle(&self, event: LifecycleEvent, record: &mut R) -> KeepsakeResult<()> {
        self(event, record)
    }
}

/// Hooks registered for one record type.
pub struct HookRegistry<R> {
    hooks: Vec<Box<dyn LifecycleHook<R>>>,
}

impl<R> HookRegistry<R> {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook; it runs after every hook registered before it.
    pub fn register(&mut self, hook: impl LifecycleHook<R> + 'static) -> &mut Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Run every hook for `event`, stopping at the first error.
    pub fn dispatch(&self, event: LifecycleEvent, record: &mut R) -> KeepsakeResult<()> {
        for hook in &self.hooks {
            hook.handle(event, record)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<R> Default for HookRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Captures a version after the host writes a record.
pub struct CaptureVersionHook {
    history: Arc<VersionHistory>,
    on: Vec<LifecycleEvent>,
}

impl CaptureVersionHook {
    /// Capture on `Created` and `Updated`.
    pub fn new(history: Arc<VersionHistory>) -> Self {
        Self::on_events(history, [LifecycleEvent::Created, LifecycleEvent::Updated])
    }

    /// Capture on the given events only.
    pub fn on_events(
        history: Arc<VersionHistory>,
        events: impl IntoIterator<Item = LifecycleEvent>,
    ) -> Self {
        Self {
            history,
            on: events.into_iter().collect(),
        }
    }
}

impl<R: Versionable> LifecycleHook<R> for CaptureVersionHook {
    fn handle(&self, event: LifecycleEvent, record: &mut R) -> KeepsakeResult<()> {
        if !self.on.contains(&event) {
            return Ok(());
        }
        if let AddOutcome::Created(version_id) = self.history.add_version(record, None)? {
            tracing::trace!(%event, version_id, "version captured by hook");
        }
        Ok(())
    }
}
