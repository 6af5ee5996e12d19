//! Repository configuration.
//!
//! A repository is a directory tree rooted at a configured path. Its settings
//! live in a `repository.config` file of `key=value` lines:
//!
//! ```text
//! version=1
//! algo=blake3-256
//! hash_length=40
//! file_metadata=true
//! include=cms.user,cms.role
//! exclude=cms.settingskey
//! ```

use crate::crypto::{Algorithm, CryptoHelper};
use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Name of the configuration file in the repository root.
pub const CONFIG_FILE_NAME: &str = "repository.config";

/// Name of the JSON file holding persisted file metadata.
pub const METADATA_FILE_NAME: &str = ".cimetadata.json";

/// Name of the progress journal file.
pub const JOURNAL_FILE_NAME: &str = ".cijournal";

/// Default limit for the full absolute path, in bytes.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 4096;

/// Default limit for a single path component, in bytes.
pub const DEFAULT_MAX_FILE_NAME_LENGTH: usize = 255;

/// Immutable settings of one repository session.
///
/// Built once, wrapped in an `Arc` and shared by every reader, writer and job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfiguration {
    root: PathBuf,
    algorithm: Algorithm,
    hash_length: Option<usize>,
    use_file_metadata: bool,
    max_path_length: usize,
    max_file_name_length: usize,
    included_types: Vec<String>,
    excluded_types: Vec<String>,
}

impl RepositoryConfiguration {
    /// Create a configuration with default settings for the given root.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            algorithm: Algorithm::default(),
            hash_length: None,
            use_file_metadata: false,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            max_file_name_length: DEFAULT_MAX_FILE_NAME_LENGTH,
            included_types: Vec::new(),
            excluded_types: Vec::new(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_hash_length(mut self, hash_length: Option<usize>) -> Self {
        self.hash_length = hash_length;
        self
    }

    pub fn with_file_metadata(mut self, enabled: bool) -> Self {
        self.use_file_metadata = enabled;
        self
    }

    pub fn with_max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = max_path_length;
        self
    }

    pub fn with_max_file_name_length(mut self, max_file_name_length: usize) -> Self {
        self.max_file_name_length = max_file_name_length;
        self
    }

    /// Restrict the repository to these object types (empty means all).
    pub fn with_included_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_types = types.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    /// Exclude these object types from the repository.
    pub fn with_excluded_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_types = types.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    /// Create the repository root and write the configuration file.
    ///
    /// An existing configuration is replaced atomically.
    pub fn init(self) -> Result<Self> {
        fs::create_dir_all(&self.root)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.root)?;
        temp_file.write_all(self.to_config_string().as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(self.config_path())?;
        Ok(self)
    }

    /// Open an existing repository and read its configuration.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_config(&root, "directory does not exist"));
        }

        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(Error::invalid_config(&root, "config file not found"));
        }

        let content = fs::read_to_string(&config_path)?;
        Self::parse(&root, &content)
    }

    /// Parse configuration content for the given root.
    pub fn parse(root: &Path, content: &str) -> Result<Self> {
        let mut config = Self::new(root);
        let mut version = None;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before.trim(),
                None => line.trim(),
            };
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::invalid_config(
                    root,
                    format!("malformed line: {}", line),
                ));
            };
            let value = value.trim();

            match key.trim() {
                "version" => version = Some(value.to_string()),
                "algo" => config.algorithm = Algorithm::parse(value)?,
                "hash_length" => {
                    config.hash_length = Some(parse_number(root, "hash_length", value)?)
                }
                "file_metadata" => config.use_file_metadata = parse_bool(root, value)?,
                "max_path_length" => {
                    config.max_path_length = parse_number(root, "max_path_length", value)?
                }
                "max_file_name_length" => {
                    config.max_file_name_length =
                        parse_number(root, "max_file_name_length", value)?
                }
                "include" => config.included_types = parse_list(value),
                "exclude" => config.excluded_types = parse_list(value),
                _ => {}
            }
        }

        if version.as_deref() != Some("1") {
            return Err(Error::invalid_config(
                root,
                format!("unsupported config version: {:?}", version),
            ));
        }

        Ok(config)
    }

    /// Render the configuration in file format.
    pub fn to_config_string(&self) -> String {
        let mut out = format!("version=1\nalgo={}\n", self.algorithm.as_str());
        if let Some(len) = self.hash_length {
            out.push_str(&format!("hash_length={}\n", len));
        }
        out.push_str(&format!("file_metadata={}\n", self.use_file_metadata));
        out.push_str(&format!("max_path_length={}\n", self.max_path_length));
        out.push_str(&format!(
            "max_file_name_length={}\n",
            self.max_file_name_length
        ));
        if !self.included_types.is_empty() {
            out.push_str(&format!("include={}\n", self.included_types.join(",")));
        }
        if !self.excluded_types.is_empty() {
            out.push_str(&format!("exclude={}\n", self.excluded_types.join(",")));
        }
        out
    }

    /// Get the repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn hash_length(&self) -> Option<usize> {
        self.hash_length
    }

    pub fn use_file_metadata(&self) -> bool {
        self.use_file_metadata
    }

    pub fn max_path_length(&self) -> usize {
        self.max_path_length
    }

    pub fn max_file_name_length(&self) -> usize {
        self.max_file_name_length
    }

    pub fn included_types(&self) -> &[String] {
        &self.included_types
    }

    pub fn excluded_types(&self) -> &[String] {
        &self.excluded_types
    }

    /// Crypto helper matching the configured algorithm and hash length.
    pub fn crypto(&self) -> CryptoHelper {
        CryptoHelper::new(self.algorithm, self.hash_length)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE_NAME)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE_NAME)
    }

    /// Returns true for files the repository keeps for itself.
    pub fn is_reserved(relative_path: &str) -> bool {
        matches!(
            relative_path,
            CONFIG_FILE_NAME | METADATA_FILE_NAME | JOURNAL_FILE_NAME
        )
    }

    /// Whether objects of this type belong to the repository.
    pub fn is_type_included(&self, object_type: &str) -> bool {
        let object_type = object_type.to_lowercase();
        if self.excluded_types.contains(&object_type) {
            return false;
        }
        self.included_types.is_empty() || self.included_types.contains(&object_type)
    }

    /// Resolve a normalized relative path against the root.
    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Express an absolute path relative to the root, using `/` separators.
    ///
    /// Returns `None` for paths outside the repository.
    pub fn relative_path(&self, absolute_path: &Path) -> Option<String> {
        let rest = absolute_path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in rest.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(segments.join("/"))
    }
}

fn parse_number(root: &Path, key: &str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|_| Error::invalid_config(root, format!("{} must be a number: {}", key, value)))
}

fn parse_bool(root: &Path, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::invalid_config(
            root,
            format!("expected a boolean, got {}", value),
        )),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("repo");

        let config = RepositoryConfiguration::new(&root)
            .with_algorithm(Algorithm::Sha256)
            .with_hash_length(Some(40))
            .with_file_metadata(true)
            .with_included_types(["CMS.User", "cms.role"])
            .init()
            .unwrap();
        assert!(root.join(CONFIG_FILE_NAME).exists());

        let opened = RepositoryConfiguration::open(&root).unwrap();
        assert_eq!(opened, config);
        assert_eq!(opened.included_types(), ["cms.user", "cms.role"]);
    }

    #[test]
    fn test_init_replaces_existing_config() {
        let temp_dir = TempDir::new().unwrap();

        RepositoryConfiguration::new(temp_dir.path()).init().unwrap();
        RepositoryConfiguration::new(temp_dir.path())
            .with_algorithm(Algorithm::Sha256)
            .init()
            .unwrap();

        let opened = RepositoryConfiguration::open(temp_dir.path()).unwrap();
        assert_eq!(opened.algorithm(), Algorithm::Sha256);
        // Only the config file remains; no temporary files are left behind.
        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, [CONFIG_FILE_NAME]);
    }

    #[test]
    fn test_open_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(RepositoryConfiguration::open(temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_open_without_config() {
        let temp_dir = TempDir::new().unwrap();
        assert!(RepositoryConfiguration::open(temp_dir.path()).is_err());
    }

    #[test]
    fn test_parse_with_comments() {
        let content = "# repository\nversion=1 # current\nalgo=blake3-256\n\nfile_metadata=yes\n";
        let config = RepositoryConfiguration::parse(Path::new("/repo"), content).unwrap();
        assert_eq!(config.algorithm(), Algorithm::Blake3);
        assert!(config.use_file_metadata());
        assert_eq!(config.hash_length(), None);
    }

    #[test]
    fn test_parse_invalid_version() {
        let result = RepositoryConfiguration::parse(Path::new("/repo"), "version=2\n");
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_parse_invalid_values() {
        let root = Path::new("/repo");
        assert!(RepositoryConfiguration::parse(root, "version=1\nhash_length=abc\n").is_err());
        assert!(RepositoryConfiguration::parse(root, "version=1\nfile_metadata=maybe\n").is_err());
        assert!(RepositoryConfiguration::parse(root, "version=1\nalgo=md5\n").is_err());
        assert!(RepositoryConfiguration::parse(root, "version=1\nnonsense\n").is_err());
    }

    #[test]
    fn test_type_inclusion() {
        let config = RepositoryConfiguration::new("/repo")
            .with_excluded_types(["cms.settingskey"]);
        assert!(config.is_type_included("cms.user"));
        assert!(!config.is_type_included("CMS.SettingsKey"));

        let config = config.with_included_types(["cms.user"]);
        assert!(config.is_type_included("cms.user"));
        assert!(!config.is_type_included("cms.role"));
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let config = RepositoryConfiguration::new("/repo");
        let abs = config.absolute_path("cms.user/@global/admin.xml");
        assert_eq!(abs, Path::new("/repo/cms.user/@global/admin.xml"));
        assert_eq!(
            config.relative_path(&abs).as_deref(),
            Some("cms.user/@global/admin.xml")
        );
        assert_eq!(config.relative_path(Path::new("/elsewhere/file.xml")), None);
    }

    #[test]
    fn test_reserved_files() {
        assert!(RepositoryConfiguration::is_reserved(CONFIG_FILE_NAME));
        assert!(RepositoryConfiguration::is_reserved(METADATA_FILE_NAME));
        assert!(!RepositoryConfiguration::is_reserved("cms.user/@global/admin.xml"));
    }
}
