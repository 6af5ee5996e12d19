//! Comparing the repository on disk with the recorded file metadata.

use crate::error::{Error, Result};
use crate::metadata::FileMetadataStore;
use crate::reader::RepositoryReader;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use tracing::debug;

/// Paths grouped by how they changed since metadata was last recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl DriftReport {
    /// True when nothing was added, modified or removed.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn changed(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Hash every file through `reader` and compare against `store`.
///
/// Files that vanish between the scan and the read count as removed when the
/// store knows them.
pub fn detect_drift(
    reader: &dyn RepositoryReader,
    store: &dyn FileMetadataStore,
    files: &[String],
) -> Result<DriftReport> {
    let mut report = DriftReport::default();
    let mut present = BTreeSet::new();

    for file in files {
        let hash = match reader.read_bytes(file) {
            Ok(_) => reader.file_hash(file)?,
            Err(Error::Io { source }) if source.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        present.insert(file.clone());

        match (store.get(file)?, hash) {
            (None, _) => report.added.push(file.clone()),
            (Some(row), Some(hash)) if row.hash == hash => report.unchanged.push(file.clone()),
            (Some(_), _) => report.modified.push(file.clone()),
        }
    }

    report.removed = store
        .all()?
        .into_iter()
        .map(|row| row.location)
        .filter(|location| !present.contains(location))
        .collect();

    report.added.sort();
    report.modified.sort();
    report.removed.sort();
    report.unchanged.sort();

    debug!(
        added = report.added.len(),
        modified = report.modified.len(),
        removed = report.removed.len(),
        unchanged = report.unchanged.len(),
        "computed repository drift"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfiguration;
    use crate::crypto::CryptoHelper;
    use crate::hash_manager::RepositoryHashManager;
    use crate::metadata::MemoryMetadataStore;
    use crate::reader::FileSystemReader;
    use crate::storage::StorageOperations;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_detect_drift() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("same.xml"), b"same").unwrap();
        fs::write(root.join("changed.xml"), b"after").unwrap();
        fs::write(root.join("new.xml"), b"new").unwrap();

        let crypto = CryptoHelper::default();
        let mut store = MemoryMetadataStore::new();
        store.upsert("same.xml", &crypto.hash_bytes(b"same")).unwrap();
        store.upsert("changed.xml", &crypto.hash_bytes(b"before")).unwrap();
        store.upsert("gone.xml", &crypto.hash_bytes(b"gone")).unwrap();

        let config = Arc::new(RepositoryConfiguration::new(root));
        let reader = FileSystemReader::new(StorageOperations::new(
            config.clone(),
            RepositoryHashManager::new(config.crypto()),
        ));

        let files = vec![
            "changed.xml".to_string(),
            "new.xml".to_string(),
            "same.xml".to_string(),
            "vanished.xml".to_string(),
        ];
        let report = detect_drift(&reader, &store, &files).unwrap();

        assert_eq!(report.added, ["new.xml"]);
        assert_eq!(report.modified, ["changed.xml"]);
        assert_eq!(report.removed, ["gone.xml"]);
        assert_eq!(report.unchanged, ["same.xml"]);
        assert_eq!(report.changed(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_empty_repository_is_clean() {
        let temp_dir = TempDir::new().unwrap();
        let config = Arc::new(RepositoryConfiguration::new(temp_dir.path()));
        let reader = FileSystemReader::new(StorageOperations::new(
            config.clone(),
            RepositoryHashManager::new(config.crypto()),
        ));
        let report = detect_drift(&reader, &MemoryMetadataStore::new(), &[]).unwrap();
        assert!(report.is_clean());
    }
}
