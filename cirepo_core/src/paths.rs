//! Mapping objects to repository locations.

use crate::crypto::{Algorithm, CryptoHelper};
use crate::locations::RepositoryLocations;
use crate::objects::{ObjectInfo, ObjectTypeInfo};

/// Folder used for objects that belong to no site.
pub const GLOBAL_FOLDER: &str = "@global";

/// Extension of serialized object documents.
pub const DOCUMENT_EXTENSION: &str = "xml";

/// Extension of separated binary field files.
pub const FIELD_EXTENSION: &str = "bin";

/// Longest file name stem produced by [`sanitize_name`].
pub const MAX_NAME_LENGTH: usize = 50;

const NAME_HASH_LENGTH: usize = 10;

/// Decides where an object's files live in the repository.
pub trait PathResolver {
    /// Relative path of the object's main document.
    fn main_location(&self, object: &ObjectInfo, object_type: &ObjectTypeInfo) -> String;

    /// Relative path of one separated field of the object.
    fn field_location(&self, object: &ObjectInfo, object_type: &ObjectTypeInfo, field: &str) -> String;

    /// Every location the object serializes to.
    fn locations(&self, object: &ObjectInfo, object_type: &ObjectTypeInfo) -> RepositoryLocations {
        let mut locations = RepositoryLocations::from_main(self.main_location(object, object_type));
        for field in object.separated_fields.keys() {
            locations.add_additional(self.field_location(object, object_type, field));
        }
        locations
    }
}

/// `<type>/<site|@global>/<name>.xml` layout.
///
/// Bindings are stored in their parent's file so every binding of one parent
/// shares a location.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPathResolver;

impl DefaultPathResolver {
    fn folder(object: &ObjectInfo, object_type: &ObjectTypeInfo) -> String {
        let site = match &object.site {
            Some(site) => sanitize_name(site),
            None => GLOBAL_FOLDER.to_string(),
        };
        format!("{}/{}", sanitize_name(&object_type.name), site)
    }

    fn file_stem(object: &ObjectInfo, object_type: &ObjectTypeInfo) -> String {
        match &object.binding {
            Some(binding) if object_type.is_binding => sanitize_name(&binding.parent),
            _ => sanitize_name(&object.code_name),
        }
    }
}

impl PathResolver for DefaultPathResolver {
    fn main_location(&self, object: &ObjectInfo, object_type: &ObjectTypeInfo) -> String {
        format!(
            "{}/{}.{}",
            Self::folder(object, object_type),
            Self::file_stem(object, object_type),
            DOCUMENT_EXTENSION
        )
    }

    fn field_location(&self, object: &ObjectInfo, object_type: &ObjectTypeInfo, field: &str) -> String {
        format!(
            "{}/{}.{}.{}",
            Self::folder(object, object_type),
            Self::file_stem(object, object_type),
            sanitize_name(field),
            FIELD_EXTENSION
        )
    }
}

/// Turn an arbitrary name into a safe, lowercase file name segment.
///
/// Characters outside `[a-z0-9_.-]` become `_`. Names longer than
/// [`MAX_NAME_LENGTH`] are cut and suffixed with a short hash of the full
/// name so distinct long names stay distinct.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '_',
        })
        .collect();

    // Empty, "." and ".." are not usable as path segments.
    let sanitized = if sanitized.chars().all(|c| c == '.') {
        "_".repeat(sanitized.len().max(1))
    } else {
        sanitized
    };

    if sanitized.chars().count() <= MAX_NAME_LENGTH {
        return sanitized;
    }

    let hash = CryptoHelper::new(Algorithm::Blake3, Some(NAME_HASH_LENGTH)).hash_bytes(name.as_bytes());
    let keep = MAX_NAME_LENGTH - NAME_HASH_LENGTH - 1;
    let prefix: String = sanitized.chars().take(keep).collect();
    format!("{}_{}", prefix, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_object_location() {
        let object = ObjectInfo::new("CMS.User", 1, "Administrator");
        let object_type = ObjectTypeInfo::new("CMS.User");
        assert_eq!(
            DefaultPathResolver.main_location(&object, &object_type),
            "cms.user/@global/administrator.xml"
        );
    }

    #[test]
    fn test_site_object_with_separated_fields() {
        let object = ObjectInfo::new("cms.user", 1, "admin")
            .with_site("Corporate Site")
            .with_separated_field("Avatar", vec![1, 2, 3]);
        let locations = DefaultPathResolver.locations(&object, &ObjectTypeInfo::new("cms.user"));

        assert_eq!(
            locations,
            RepositoryLocations::from_main("cms.user/corporate_site/admin.xml")
                .with_additional("cms.user/corporate_site/admin.avatar.bin")
        );
    }

    #[test]
    fn test_bindings_share_parent_file() {
        let binding_type = ObjectTypeInfo::binding("cms.userrole");
        let first = ObjectInfo::binding("cms.userrole", 1, "admin", "editors");
        let second = ObjectInfo::binding("cms.userrole", 2, "admin", "readers");

        let first_location = DefaultPathResolver.main_location(&first, &binding_type);
        assert_eq!(first_location, "cms.userrole/@global/admin.xml");
        assert_eq!(first_location, DefaultPathResolver.main_location(&second, &binding_type));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Hello World!"), "hello_world_");
        assert_eq!(sanitize_name("a-b.c_d"), "a-b.c_d");
        assert_eq!(sanitize_name("../etc"), ".._etc");
        assert_eq!(sanitize_name("   "), "_");
        assert_eq!(sanitize_name(".."), "__");
    }

    #[test]
    fn test_sanitize_long_names() {
        let long_a = "a".repeat(80);
        let long_b = format!("{}b", "a".repeat(79));

        let a = sanitize_name(&long_a);
        let b = sanitize_name(&long_b);
        assert_eq!(a.len(), MAX_NAME_LENGTH);
        assert_eq!(b.len(), MAX_NAME_LENGTH);
        assert_ne!(a, b);
        assert!(a.starts_with(&"a".repeat(39)));
        assert_eq!(sanitize_name(&long_a), a);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_sanitized_names_are_safe(name in ".{0,120}") {
            let sanitized = sanitize_name(&name);
            prop_assert!(!sanitized.is_empty());
            prop_assert!(sanitized.chars().count() <= MAX_NAME_LENGTH);
            prop_assert!(sanitized
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-')));
        }
    }
}
