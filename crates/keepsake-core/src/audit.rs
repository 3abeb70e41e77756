//! Audit-field population.
//!
//! [`UserAssignableHook`] stamps the acting user's id into "created by",
//! "updated by" and "deleted by" fields when a host dispatches the matching
//! lifecycle event. It has no connection to the version store.

use serde::{Deserialize, Serialize};

use crate::error::KeepsakeResult;
use crate::hooks::{LifecycleEvent, LifecycleHook};

/// Which record fields receive the acting user's id.
///
/// A `None` mapping disables stamping for that action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub created: Option<String>,
    pub updated: Option<String>,
    pub deleted: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            created: Some("created_by".to_string()),
            updated: Some("updated_by".to_string()),
            deleted: Some("deleted_by".to_string()),
        }
    }
}

impl AuditConfig {
    /// Field stamped for a lifecycle event, if any.
    pub fn field_for(&self, event: LifecycleEvent) -> Option<&str> {
        match event {
            LifecycleEvent::Creating => self.created.as_deref(),
            LifecycleEvent::Updating => self.updated.as_deref(),
            LifecycleEvent::Deleting => self.deleted.as_deref(),
            _ => None,
        }
        .filter(|field| !field.is_empty())
    }
}

/// A record that carries audit fields.
pub trait Auditable {
    /// Write `user_id` into `field`.
    fn set_audit_field(&mut self, field: &str, user_id: i64);

    /// Whether `field` was already set explicitly during this change.
    fn is_field_dirty(&self, _field: &str) -> bool {
        false
    }

    /// Whether deletes keep the row, so a "deleted by" stamp survives.
    fn soft_deletes(&self) -> bool {
        false
    }
}

/// Stamps audit fields from a current-user resolver.
///
/// The resolver returns `None` when nobody is signed in; that is stored as `0`.
/// On `Deleting` the host must persist the stamped record itself before it
/// soft-deletes it.
pub struct UserAssignableHook<F> {
    config: AuditConfig,
    current_user: F,
}

impl<F> UserAssignableHook<F>
where
    F: Fn() -> Option<i64> + Send + Sync,
{
    pub fn new(config: AuditConfig, current_user: F) -> Self {
        Self {
            config,
            current_user,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }
}

impl<R, F> LifecycleHook<R> for UserAssignableHook<F>
where
    R: Auditable,
    F: Fn() -> Option<i64> + Send + Sync,
{
    fn handle(&self, event: LifecycleEvent, record: &mut R) -> KeepsakeResult<()> {
        let Some(field) = self.config.field_for(event) else {
            return Ok(());
        };
        if event == LifecycleEvent::Deleting && !record.soft_deletes() {
            return Ok(());
        }
        if record.is_field_dirty(field) {
            return Ok(());
        }

        let user_id = (self.current_user)().unwrap_or(0);
        record.set_audit_field(field, user_id);
        tracing::trace!(%event, field, user_id, "stamped audit field");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookRegistry;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct Post {
        stamps: HashMap<String, i64>,
        dirty: HashSet<String>,
        soft: bool,
    }

    impl Auditable for Post {
        fn set_audit_field(&mut self, field: &str, user_id: i64) {
            self.stamps.insert(field.to_string(), user_id);
        }
        fn is_field_dirty(&self, field: &str) -> bool {
            self.dirty.contains(field)
        }
        fn soft_deletes(&self) -> bool {
            self.soft
        }
    }

    fn hooks(user: Option<i64>) -> HookRegistry<Post> {
        let mut hooks = HookRegistry::new();
        hooks.register(UserAssignableHook::new(AuditConfig::default(), move || user));
        hooks
    }

    #[test]
    fn test_stamps_created_and_updated() {
        let hooks = hooks(Some(12));
        let mut post = Post::default();

        hooks.dispatch(LifecycleEvent::Creating, &mut post).unwrap();
        hooks.dispatch(LifecycleEvent::Updating, &mut post).unwrap();
        hooks.dispatch(LifecycleEvent::Created, &mut post).unwrap();

        assert_eq!(post.stamps.get("created_by"), Some(&12));
        assert_eq!(post.stamps.get("updated_by"), Some(&12));
        assert_eq!(post.stamps.len(), 2);
    }

    #[test]
    fn test_anonymous_user_is_zero() {
        let hooks = hooks(None);
        let mut post = Post::default();
        hooks.dispatch(LifecycleEvent::Creating, &mut post).unwrap();
        assert_eq!(post.stamps.get("created_by"), Some(&0));
    }

    #[test]
    fn test_dirty_field_is_left_alone() {
        let hooks = hooks(Some(5));
        let mut post = Post::default();
        post.stamps.insert("updated_by".into(), 99);
        post.dirty.insert("updated_by".into());

        hooks.dispatch(LifecycleEvent::Updating, &mut post).unwrap();
        assert_eq!(post.stamps.get("updated_by"), Some(&99));
    }

    #[test]
    fn test_deleted_by_only_for_soft_deletes() {
        let hooks = hooks(Some(3));

        let mut hard = Post::default();
        hooks.dispatch(LifecycleEvent::Deleting, &mut hard).unwrap();
        assert!(hard.stamps.is_empty());

        let mut soft = Post {
            soft: true,
            ..Default::default()
        };
        hooks.dispatch(LifecycleEvent::Deleting, &mut soft).unwrap();
        assert_eq!(soft.stamps.get("deleted_by"), Some(&3));
    }

    #[test]
    fn test_disabled_mapping() {
        let config = AuditConfig {
            updated: None,
            ..Default::default()
        };
        assert_eq!(config.field_for(LifecycleEvent::Updating), None);
        assert_eq!(config.field_for(LifecycleEvent::Creating), Some("created_by"));
        assert_eq!(config.field_for(LifecycleEvent::Deleted), None);

        let mut hooks = HookRegistry::new();
        hooks.register(UserAssignableHook::new(config, || Some(1)));
        let mut post = Post::default();
        hooks.dispatch(LifecycleEvent::Updating, &mut post).unwrap();
        assert!(post.stamps.is_empty());
    }
}
