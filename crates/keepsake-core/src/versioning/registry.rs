//! Type-tag registry used to rebuild records from stored snapshots.
//!
//! The registry is assembled once at startup and is read-only afterwards.
//! A tag with no registered constructor is a hard error on read.

use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::{KeepsakeError, KeepsakeResult};
use crate::versioning::record::Versionable;

type Factory = fn(Map<String, Value>) -> KeepsakeResult<Box<dyn Any + Send>>;

fn construct<T: Versionable>(fields: Map<String, Value>) -> KeepsakeResult<Box<dyn Any + Send>> {
    Ok(Box::new(T::from_fields(fields)?))
}

/// Maps type tags to constructors.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Whether a constructor is registered for `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.factories.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    /// Build an entity of the type registered under `tag`.
    pub fn construct(
        &self,
        tag: &str,
        fields: Map<String, Value>,
    ) -> KeepsakeResult<Box<dyn Any + Send>> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| KeepsakeError::unknown_type(tag))?;
        factory(fields)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Builder for [`TypeRegistry`].
#[derive(Default)]
pub struct TypeRegistryBuilder {
    factories: HashMap<&'static str, Factory>,
    duplicates: Vec<&'static str>,
}

impl TypeRegistryBuilder {
    /// Register `T` under `T::TYPE_TAG`.
    pub fn register<T: Versionable>(mut self) -> Self {
        if self.factories.insert(T::TYPE_TAG, construct::<T>).is_some() {
            self.duplicates.push(T::TYPE_TAG);
        }
        self
    }

    /// Build the registry, failing if any tag was registered twice.
    pub fn build(self) -> KeepsakeResult<TypeRegistry> {
        if !self.duplicates.is_empty() {
            return Err(KeepsakeError::Configuration(format!(
                "type tags registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(TypeRegistry {
            factories: self.factories,
        })
    }
}
