//! Shared plumbing of every repository reader and writer.

use crate::config::RepositoryConfiguration;
use crate::crypto::CryptoHelper;
use crate::error::{Error, Result};
use crate::hash_manager::RepositoryHashManager;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Binds a repository configuration and the session's hash manager.
#[derive(Debug, Clone)]
pub struct StorageOperations {
    config: Arc<RepositoryConfiguration>,
    hashes: RepositoryHashManager,
}

impl StorageOperations {
    pub fn new(config: Arc<RepositoryConfiguration>, hashes: RepositoryHashManager) -> Self {
        Self { config, hashes }
    }

    pub fn config(&self) -> &Arc<RepositoryConfiguration> {
        &self.config
    }

    pub fn hashes(&self) -> &RepositoryHashManager {
        &self.hashes
    }

    pub fn crypto(&self) -> CryptoHelper {
        self.hashes.crypto()
    }

    /// Hash recorded for a path, without touching the file.
    pub fn file_hash(&self, relative_path: &str) -> Result<Option<String>> {
        let relative_path = validate_relative_path(relative_path)?;
        Ok(self.hashes.get_hash(&relative_path))
    }

    /// Resolve a normalized relative path against the repository root.
    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        self.config.absolute_path(relative_path)
    }

    /// Fail with `PathTooLong` when the path exceeds the configured limits.
    pub fn check_path_length(&self, absolute_path: &Path) -> Result<()> {
        let total = absolute_path.as_os_str().len();
        if total > self.config.max_path_length() {
            return Err(Error::path_too_long(
                absolute_path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "path length {} exceeds limit {}",
                        total,
                        self.config.max_path_length()
                    ),
                ),
            ));
        }

        if let Some(component) = absolute_path
            .components()
            .map(|c| c.as_os_str().len())
            .find(|len| *len > self.config.max_file_name_length())
        {
            return Err(Error::path_too_long(
                absolute_path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "path component length {} exceeds limit {}",
                        component,
                        self.config.max_file_name_length()
                    ),
                ),
            ));
        }

        Ok(())
    }

    /// Wrap an I/O failure on `absolute_path`, keeping the original as cause.
    pub fn wrap_io_error(&self, absolute_path: &Path, err: io::Error) -> Error {
        if is_name_too_long(&err) {
            Error::path_too_long(absolute_path, err)
        } else {
            Error::Io { source: err }
        }
    }
}

/// Validate and normalize a repository-relative path.
///
/// Backslashes become `/`, empty and `.` segments are dropped. Empty or
/// whitespace-only paths and `..` segments are rejected.
pub fn validate_relative_path(relative_path: &str) -> Result<String> {
    if relative_path.trim().is_empty() {
        return Err(Error::invalid_argument("relative path must not be empty"));
    }

    let normalized = relative_path.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(Error::invalid_argument(format!(
                    "relative path must not leave the repository: {}",
                    relative_path
                )));
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(Error::invalid_argument(format!(
            "relative path does not name a file: {}",
            relative_path
        )));
    }

    Ok(segments.join("/"))
}

#[cfg(target_os = "linux")]
const NAME_TOO_LONG: Option<i32> = Some(36);
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
const NAME_TOO_LONG: Option<i32> = Some(63);
#[cfg(windows)]
const NAME_TOO_LONG: Option<i32> = Some(206);
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    windows
)))]
const NAME_TOO_LONG: Option<i32> = None;

fn is_name_too_long(err: &io::Error) -> bool {
    NAME_TOO_LONG.is_some() && err.raw_os_error() == NAME_TOO_LONG
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoHelper;

    fn operations(config: RepositoryConfiguration) -> StorageOperations {
        let hashes = RepositoryHashManager::new(CryptoHelper::default());
        StorageOperations::new(Arc::new(config), hashes)
    }

    #[test]
    fn test_validate_rejects_empty() {
        for path in ["", "   ", "\t", "/", "./"] {
            let err = validate_relative_path(path).unwrap_err();
            assert!(err.is_invalid_argument(), "{:?} should be rejected", path);
        }
    }

    #[test]
    fn test_validate_rejects_parent_segments() {
        assert!(validate_relative_path("../outside.xml").is_err());
        assert!(validate_relative_path("a/../../b.xml").is_err());
    }

    #[test]
    fn test_validate_normalizes() {
        assert_eq!(
            validate_relative_path("\\cms.user\\@global\\admin.xml").unwrap(),
            "cms.user/@global/admin.xml"
        );
        assert_eq!(
            validate_relative_path("./a//b/./c.xml").unwrap(),
            "a/b/c.xml"
        );
    }

    #[test]
    fn test_check_path_length_total() {
        let ops = operations(RepositoryConfiguration::new("/repo").with_max_path_length(20));
        assert!(ops.check_path_length(Path::new("/repo/short.xml")).is_ok());

        let err = ops
            .check_path_length(Path::new("/repo/a/much/longer/path.xml"))
            .unwrap_err();
        assert!(matches!(err, Error::PathTooLong { .. }));
    }

    #[test]
    fn test_check_path_length_component() {
        let ops = operations(RepositoryConfiguration::new("/repo").with_max_file_name_length(8));
        assert!(ops.check_path_length(Path::new("/repo/a.xml")).is_ok());
        assert!(ops.check_path_length(Path::new("/repo/too-long-name.xml")).is_err());
    }

    #[test]
    fn test_path_too_long_keeps_cause() {
        use std::error::Error as _;

        let ops = operations(RepositoryConfiguration::new("/repo").with_max_path_length(5));
        let err = ops.check_path_length(Path::new("/repo/file.xml")).unwrap_err();
        assert!(err.source().is_some());
    }

    #[test]
    fn test_wrap_other_io_errors_unchanged() {
        let ops = operations(RepositoryConfiguration::new("/repo"));
        let err = ops.wrap_io_error(
            Path::new("/repo/x.xml"),
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert!(matches!(err, Error::Io { ref source } if source.kind() == io::ErrorKind::NotFound));
    }

    #[test]
    fn test_file_hash_validates_path() {
        let ops = operations(RepositoryConfiguration::new("/repo"));
        assert!(ops.file_hash("").is_err());
        assert_eq!(ops.file_hash("never.xml").unwrap(), None);

        ops.hashes().record_hash("known.xml", "abc");
        assert_eq!(ops.file_hash("known.xml").unwrap().as_deref(), Some("abc"));
    }
}
