//! Database objects and the collaborators that own them.
//!
//! The repository never talks to a database directly. It lists and deletes
//! objects through [`ObjectDatabase`] and asks an [`InclusionFilter`] whether
//! an object belongs to the repository at all.

use crate::config::RepositoryConfiguration;
use crate::error::{BoxError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a database object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub object_type: String,
    pub id: i64,
}

impl ObjectKey {
    pub fn new(object_type: impl Into<String>, id: i64) -> Self {
        Self {
            object_type: object_type.into(),
            id,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object_type, self.id)
    }
}

/// The two code names a many-to-many binding joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingInfo {
    pub parent: String,
    pub child: String,
}

/// A database object as the repository sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub object_type: String,
    pub id: i64,
    pub code_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<BindingInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    /// Binary fields stored in their own files next to the main document.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub separated_fields: BTreeMap<String, Vec<u8>>,
}

impl ObjectInfo {
    pub fn new(object_type: impl Into<String>, id: i64, code_name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id,
            code_name: code_name.into(),
            site: None,
            binding: None,
            fields: BTreeMap::new(),
            separated_fields: BTreeMap::new(),
        }
    }

    /// A binding between `parent` and `child`.
    pub fn binding(
        object_type: impl Into<String>,
        id: i64,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        let parent = parent.into();
        let child = child.into();
        let mut object = Self::new(object_type, id, format!("{}_{}", parent, child));
        object.binding = Some(BindingInfo { parent, child });
        object
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_separated_field(mut self, name: impl Into<String>, content: Vec<u8>) -> Self {
        self.separated_fields.insert(name.into(), content);
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.object_type.clone(), self.id)
    }
}

impl fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' (ID {})", self.object_type, self.code_name, self.id)
    }
}

/// Type-level facts the jobs need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTypeInfo {
    pub name: String,
    /// Many-to-many binding types share one file between several objects.
    pub is_binding: bool,
}

impl ObjectTypeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_binding: false,
        }
    }

    pub fn binding(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_binding: true,
        }
    }
}

/// Settings a deletion runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteContext {
    pub create_version_history: bool,
}

impl DeleteContext {
    /// Deletion that leaves no version history behind.
    pub fn without_versioning() -> Self {
        Self {
            create_version_history: false,
        }
    }
}

impl Default for DeleteContext {
    fn default() -> Self {
        Self {
            create_version_history: true,
        }
    }
}

/// Result of one delete attempt.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted,
    /// Another object still depends on this one; worth retrying later.
    DependencyBlocked(String),
    Failed(BoxError),
}

/// Generic object persistence layer.
pub trait ObjectDatabase {
    /// Every object of the type, in the database's own order.
    fn objects_in_database(&self, object_type: &ObjectTypeInfo) -> Result<Vec<ObjectInfo>>;

    /// Delete one object.
    fn delete(&mut self, object: &ObjectInfo, context: &DeleteContext) -> DeleteOutcome;
}

/// Decides whether an object belongs to the repository.
pub trait InclusionFilter {
    fn is_included(&self, object: &ObjectInfo) -> bool;
}

impl<F> InclusionFilter for F
where
    F: Fn(&ObjectInfo) -> bool,
{
    fn is_included(&self, object: &ObjectInfo) -> bool {
        self(object)
    }
}

impl InclusionFilter for RepositoryConfiguration {
    fn is_included(&self, object: &ObjectInfo) -> bool {
        self.is_type_included(&object.object_type)
    }
}

/// Accepts every object.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl InclusionFilter for IncludeAll {
    fn is_included(&self, _object: &ObjectInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_constructor() {
        let binding = ObjectInfo::binding("cms.userrole", 7, "admin", "editors");
        assert_eq!(binding.code_name, "admin_editors");
        assert_eq!(
            binding.binding,
            Some(BindingInfo {
                parent: "admin".to_string(),
                child: "editors".to_string(),
            })
        );
        assert_eq!(binding.key(), ObjectKey::new("cms.userrole", 7));
    }

    #[test]
    fn test_closure_filter() {
        let only_global = |object: &ObjectInfo| object.site.is_none();
        let global = ObjectInfo::new("cms.user", 1, "admin");
        let site = ObjectInfo::new("cms.user", 2, "editor").with_site("corporate");

        assert!(only_global.is_included(&global));
        assert!(!only_global.is_included(&site));
        assert!(IncludeAll.is_included(&site));
    }

    #[test]
    fn test_configuration_filter() {
        let config = RepositoryConfiguration::new("/repo").with_excluded_types(["cms.user"]);
        assert!(!config.is_included(&ObjectInfo::new("CMS.User", 1, "admin")));
        assert!(config.is_included(&ObjectInfo::new("cms.role", 1, "editors")));
    }

    #[test]
    fn test_object_json_shape() {
        let object = ObjectInfo::new("cms.user", 1, "admin").with_field("email", "a@b.c");
        let json = serde_json::to_value(&object).unwrap();
        assert_eq!(json["code_name"], "admin");
        assert!(json.get("site").is_none());
        assert!(json.get("separated_fields").is_none());

        let parsed: ObjectInfo = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, object);
    }

    #[test]
    fn test_default_delete_context_versions() {
        assert!(DeleteContext::default().create_version_history);
        assert!(!DeleteContext::without_versioning().create_version_history);
    }
}
