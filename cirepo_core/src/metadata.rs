//! Persisted file metadata (location → hash rows).
//!
//! Consulted only when a repository runs in file-metadata mode. The rows
//! describe the repository state the database last agreed with, which is what
//! drift detection compares against.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub location: String,
    pub hash: String,
}

/// A queryable collection of metadata rows keyed by file location.
pub trait FileMetadataStore {
    /// All rows, sorted by location.
    fn all(&self) -> Result<Vec<FileMetadata>>;

    /// The row for one location.
    fn get(&self, location: &str) -> Result<Option<FileMetadata>>;

    /// Insert or replace the row for a location.
    fn upsert(&mut self, location: &str, hash: &str) -> Result<()>;

    /// Delete the rows for the given locations; returns how many existed.
    fn delete_locations(&mut self, locations: &[String]) -> Result<usize>;

    /// Persist pending changes. In-memory stores have nothing to do.
    fn save(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Metadata rows held in memory only.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    rows: BTreeMap<String, String>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FileMetadataStore for MemoryMetadataStore {
    fn all(&self) -> Result<Vec<FileMetadata>> {
        Ok(rows_to_vec(&self.rows))
    }

    fn get(&self, location: &str) -> Result<Option<FileMetadata>> {
        Ok(self.rows.get(location).map(|hash| FileMetadata {
            location: location.to_string(),
            hash: hash.clone(),
        }))
    }

    fn upsert(&mut self, location: &str, hash: &str) -> Result<()> {
        self.rows.insert(location.to_string(), hash.to_string());
        Ok(())
    }

    fn delete_locations(&mut self, locations: &[String]) -> Result<usize> {
        Ok(locations
            .iter()
            .filter(|location| self.rows.remove(location.as_str()).is_some())
            .count())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataFile {
    version: u32,
    #[serde(default)]
    files: BTreeMap<String, String>,
}

/// Metadata rows persisted as a JSON file.
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    rows: BTreeMap<String, String>,
    dirty: bool,
}

impl JsonMetadataStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rows = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: MetadataFile = serde_json::from_str(&content)?;
            file.files
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), rows = rows.len(), "opened file metadata store");

        Ok(Self {
            path,
            rows,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FileMetadataStore for JsonMetadataStore {
    fn all(&self) -> Result<Vec<FileMetadata>> {
        Ok(rows_to_vec(&self.rows))
    }

    fn get(&self, location: &str) -> Result<Option<FileMetadata>> {
        Ok(self.rows.get(location).map(|hash| FileMetadata {
            location: location.to_string(),
            hash: hash.clone(),
        }))
    }

    fn upsert(&mut self, location: &str, hash: &str) -> Result<()> {
        let previous = self.rows.insert(location.to_string(), hash.to_string());
        if previous.as_deref() != Some(hash) {
            self.dirty = true;
        }
        Ok(())
    }

    fn delete_locations(&mut self, locations: &[String]) -> Result<usize> {
        let removed = locations
            .iter()
            .filter(|location| self.rows.remove(location.as_str()).is_some())
            .count();
        if removed > 0 {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let file = MetadataFile {
            version: 1,
            files: self.rows.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        // Write atomically using tempfile
        let mut temp_file = tempfile::NamedTempFile::new_in(&parent)?;
        temp_file.write_all(&json)?;
        temp_file.flush()?;
        temp_file.persist(&self.path)?;

        self.dirty = false;
        debug!(path = %self.path.display(), rows = self.rows.len(), "saved file metadata");
        Ok(())
    }
}

fn rows_to_vec(rows: &BTreeMap<String, String>) -> Vec<FileMetadata> {
    rows.iter()
        .map(|(location, hash)| FileMetadata {
            location: location.clone(),
            hash: hash.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_upsert_and_delete() {
        let mut store = MemoryMetadataStore::new();
        store.upsert("b.xml", "2").unwrap();
        store.upsert("a.xml", "1").unwrap();
        store.upsert("a.xml", "3").unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].location, "a.xml");
        assert_eq!(all[0].hash, "3");

        let removed = store
            .delete_locations(&["a.xml".to_string(), "missing.xml".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("a.xml").unwrap().is_none());
        assert_eq!(store.get("b.xml").unwrap().unwrap().hash, "2");
    }

    #[test]
    fn test_json_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("meta.json");

        let mut store = JsonMetadataStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.upsert("cms.user/@global/admin.xml", "abc").unwrap();
        store.save().unwrap();
        assert!(path.exists());

        let reopened = JsonMetadataStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("cms.user/@global/admin.xml").unwrap(),
            Some(FileMetadata {
                location: "cms.user/@global/admin.xml".to_string(),
                hash: "abc".to_string(),
            })
        );
    }

    #[test]
    fn test_json_store_save_without_changes_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("meta.json");

        let mut store = JsonMetadataStore::open(&path).unwrap();
        store.save().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("meta.json");
        fs::write(&path, "not json").unwrap();

        assert!(JsonMetadataStore::open(&path).is_err());
    }
}
