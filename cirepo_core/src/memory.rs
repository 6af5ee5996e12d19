//! An in-memory [`ObjectDatabase`] with explicit dependencies.
//!
//! Serializable, so it also serves as a file-backed database for tooling.

use crate::error::Result;
use crate::objects::{DeleteContext, DeleteOutcome, ObjectDatabase, ObjectInfo, ObjectKey, ObjectTypeInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `object` cannot be deleted while `blocked_by` still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub object: ObjectKey,
    pub blocked_by: ObjectKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDatabase {
    #[serde(default)]
    objects: Vec<ObjectInfo>,
    #[serde(default)]
    dependencies: Vec<Dependency>,
    /// Objects deleted with version history enabled.
    #[serde(default)]
    version_history: Vec<ObjectKey>,
    #[serde(skip)]
    failing: BTreeMap<ObjectKey, String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, replacing one with the same key.
    pub fn insert(&mut self, object: ObjectInfo) {
        let key = object.key();
        match self.objects.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => *existing = object,
            None => self.objects.push(object),
        }
    }

    /// Declare that `object` cannot be deleted while `blocked_by` exists.
    pub fn add_dependency(&mut self, object: ObjectKey, blocked_by: ObjectKey) {
        self.dependencies.push(Dependency { object, blocked_by });
    }

    /// Make every delete of the object fail with an unexpected error.
    pub fn fail_deletion_of(&mut self, key: ObjectKey, message: impl Into<String>) {
        self.failing.insert(key, message.into());
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.iter().any(|object| &object.key() == key)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&ObjectInfo> {
        self.objects.iter().find(|object| &object.key() == key)
    }

    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn version_history(&self) -> &[ObjectKey] {
        &self.version_history
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn blocking_object(&self, key: &ObjectKey) -> Option<&ObjectKey> {
        self.dependencies
            .iter()
            .filter(|dependency| &dependency.object == key)
            .map(|dependency| &dependency.blocked_by)
            .find(|blocker| self.contains(blocker))
    }
}

impl ObjectDatabase for MemoryDatabase {
    fn objects_in_database(&self, object_type: &ObjectTypeInfo) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .iter()
            .filter(|object| object.object_type.eq_ignore_ascii_case(&object_type.name))
            .cloned()
            .collect())
    }

    fn delete(&mut self, object: &ObjectInfo, context: &DeleteContext) -> DeleteOutcome {
        let key = object.key();

        if let Some(message) = self.failing.get(&key) {
            return DeleteOutcome::Failed(message.clone().into());
        }

        let Some(position) = self.objects.iter().position(|existing| existing.key() == key) else {
            return DeleteOutcome::Failed(format!("object {} does not exist", key).into());
        };

        if let Some(blocker) = self.blocking_object(&key) {
            return DeleteOutcome::DependencyBlocked(format!(
                "{} cannot be deleted because {} depends on it",
                key, blocker
            ));
        }

        self.objects.remove(position);
        self.dependencies.retain(|dependency| dependency.object != key);
        if context.create_version_history {
            self.version_history.push(key);
        }
        DeleteOutcome::Deleted
    }
}
