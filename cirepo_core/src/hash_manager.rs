//! Session-wide mapping of repository paths to content hashes.

use crate::crypto::CryptoHelper;
use crate::error::Result;
use crate::metadata::FileMetadataStore;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Tracks relative path → content hash for one repository session.
///
/// Cloning yields another handle to the same map. Every reader, writer and job
/// of a session holds such a handle; the map changes only as a side effect of
/// a completed read, write or delete, or an explicit [`flush`](Self::flush).
///
/// A `None` value marks a path whose file was removed and whose metadata is
/// pending cleanup.
#[derive(Debug, Clone, Default)]
pub struct RepositoryHashManager {
    crypto: CryptoHelper,
    entries: Arc<Mutex<HashMap<String, Option<String>>>>,
}

/// Counts of a [`RepositoryHashManager::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushStats {
    /// Rows written or refreshed.
    pub saved: usize,
    /// Rows removed for deleted files.
    pub removed: usize,
}

impl RepositoryHashManager {
    pub fn new(crypto: CryptoHelper) -> Self {
        Self {
            crypto,
            entries: Arc::default(),
        }
    }

    /// The crypto helper digests are formatted with.
    pub fn crypto(&self) -> CryptoHelper {
        self.crypto
    }

    /// Record the digest of a completed hashing stream for a path.
    ///
    /// Overwrites any previous hash of the path.
    pub fn save_hash(&self, relative_path: &str, digest: &[u8]) -> String {
        let hash = self.crypto.to_hex(digest);
        self.record_hash(relative_path, hash.clone());
        hash
    }

    /// Record an already formatted hash for a path.
    pub fn record_hash(&self, relative_path: &str, hash: impl Into<String>) {
        let hash = hash.into();
        trace!(path = relative_path, hash = %hash, "hash recorded");
        self.entries
            .lock()
            .insert(relative_path.to_string(), Some(hash));
    }

    /// Last recorded hash of a path, `None` when not hashed yet or removed.
    pub fn get_hash(&self, relative_path: &str) -> Option<String> {
        self.entries.lock().get(relative_path).cloned().flatten()
    }

    /// Mark the path as removed.
    pub fn remove_hash(&self, relative_path: &str) {
        trace!(path = relative_path, "hash removed");
        self.entries.lock().insert(relative_path.to_string(), None);
    }

    /// Whether the path was seen during this session (hashed or removed).
    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.lock().contains_key(relative_path)
    }

    /// Snapshot of all entries, sorted by path.
    pub fn entries(&self) -> BTreeMap<String, Option<String>> {
        self.entries
            .lock()
            .iter()
            .map(|(path, hash)| (path.clone(), hash.clone()))
            .collect()
    }

    /// Paths marked removed, sorted.
    pub fn removed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, hash)| hash.is_none())
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Persist the entries into a metadata store.
    ///
    /// Recorded hashes are upserted, removed paths have their rows deleted and
    /// are then dropped from the map.
    pub fn flush(&self, store: &mut dyn FileMetadataStore) -> Result<FlushStats> {
        let snapshot = self.entries();
        let mut stats = FlushStats::default();
        let mut removed = Vec::new();

        for (path, hash) in &snapshot {
            match hash {
                Some(hash) => {
                    store.upsert(path, hash)?;
                    stats.saved += 1;
                }
                None => removed.push(path.clone()),
            }
        }

        if !removed.is_empty() {
            stats.removed = store.delete_locations(&removed)?;
        }
        store.save()?;

        // Only drop entries that are still marked removed.
        let mut entries = self.entries.lock();
        for path in &removed {
            if matches!(entries.get(path), Some(None)) {
                entries.remove(path);
            }
        }

        debug!(saved = stats.saved, removed = stats.removed, "flushed hashes");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Algorithm;
    use crate::metadata::MemoryMetadataStore;

    fn manager() -> RepositoryHashManager {
        RepositoryHashManager::new(CryptoHelper::new(Algorithm::Blake3, None))
    }

    #[test]
    fn test_missing_entry_is_absent() {
        let hashes = manager();
        assert_eq!(hashes.get_hash("nothing.xml"), None);
        assert!(!hashes.contains("nothing.xml"));
    }

    #[test]
    fn test_save_overwrites() {
        let hashes = manager();
        hashes.save_hash("a.xml", &[0x01, 0x02]);
        hashes.save_hash("a.xml", &[0xff]);
        assert_eq!(hashes.get_hash("a.xml").as_deref(), Some("ff"));
        assert_eq!(hashes.len(), 1);
    }

    #[test]
    fn test_remove_marks_entry() {
        let hashes = manager();
        hashes.record_hash("a.xml", "abc");
        hashes.remove_hash("a.xml");
        hashes.remove_hash("never-seen.xml");

        assert_eq!(hashes.get_hash("a.xml"), None);
        assert!(hashes.contains("a.xml"));
        assert_eq!(hashes.removed_paths(), vec!["a.xml", "never-seen.xml"]);
    }

    #[test]
    fn test_clones_share_state() {
        let hashes = manager();
        let other = hashes.clone();
        other.record_hash("shared.xml", "1234");
        assert_eq!(hashes.get_hash("shared.xml").as_deref(), Some("1234"));
    }

    #[test]
    fn test_truncated_formatting() {
        let hashes = RepositoryHashManager::new(CryptoHelper::new(Algorithm::Blake3, Some(4)));
        let hash = hashes.save_hash("a.xml", &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(hash, "dead");
    }

    #[test]
    fn test_flush_persists_and_cleans_up() {
        let hashes = manager();
        let mut store = MemoryMetadataStore::new();
        store.upsert("gone.xml", "old").unwrap();

        hashes.record_hash("kept.xml", "111");
        hashes.remove_hash("gone.xml");

        let stats = hashes.flush(&mut store).unwrap();
        assert_eq!(stats, FlushStats { saved: 1, removed: 1 });
        assert_eq!(store.get("kept.xml").unwrap().unwrap().hash, "111");
        assert!(store.get("gone.xml").unwrap().is_none());

        assert!(hashes.removed_paths().is_empty());
        assert_eq!(hashes.get_hash("kept.xml").as_deref(), Some("111"));
    }
}
