//! Caching decorator over a [`RepositoryReader`].
//!
//! Reconciliation jobs read the same repository files several times in one
//! run (shared binding files in particular). The decorator reads and hashes
//! each path at most once until the path is explicitly invalidated.

use crate::error::{Error, Result};
use crate::hash_manager::RepositoryHashManager;
use crate::reader::{RepositoryReader, decode_text};
use crate::storage::validate_relative_path;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use tracing::trace;

/// Memoizes bytes and text per relative path.
#[derive(Debug)]
pub struct CachedFileSystemReader<R> {
    inner: R,
    bytes: Mutex<HashMap<String, Vec<u8>>>,
    strings: Mutex<HashMap<String, String>>,
}

impl<R: RepositoryReader> CachedFileSystemReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: Mutex::default(),
            strings: Mutex::default(),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of paths with cached bytes.
    pub fn cached_len(&self) -> usize {
        self.bytes.lock().len()
    }

    pub fn is_cached(&self, relative_path: &str) -> bool {
        validate_relative_path(relative_path)
            .map(|path| self.bytes.lock().contains_key(&path))
            .unwrap_or(false)
    }
}

impl<R: RepositoryReader> RepositoryReader for CachedFileSystemReader<R> {
    fn read_bytes(&self, relative_path: &str) -> Result<Vec<u8>> {
        let relative_path = validate_relative_path(relative_path)?;

        if let Some(bytes) = self.bytes.lock().get(&relative_path) {
            trace!(path = %relative_path, "byte cache hit");
            return Ok(bytes.clone());
        }

        // The lock is not held across the read; the inner reader may take time.
        let bytes = self.inner.read_bytes(&relative_path)?;
        self.bytes.lock().insert(relative_path, bytes.clone());
        Ok(bytes)
    }

    fn read_string(&self, relative_path: &str) -> Result<String> {
        let relative_path = validate_relative_path(relative_path)?;

        if let Some(text) = self.strings.lock().get(&relative_path) {
            trace!(path = %relative_path, "string cache hit");
            return Ok(text.clone());
        }

        let bytes = self.read_bytes(&relative_path)?;
        let text = decode_text(&relative_path, &bytes)?;
        self.strings.lock().insert(relative_path, text.clone());
        Ok(text)
    }

    fn remove_from_cache(&self, relative_paths: &[String]) {
        for relative_path in relative_paths {
            let Ok(relative_path) = validate_relative_path(relative_path) else {
                continue;
            };

            let had_bytes = self.bytes.lock().remove(&relative_path).is_some();
            let had_string = self.strings.lock().remove(&relative_path).is_some();

            if had_bytes || had_string {
                trace!(path = %relative_path, "evicted from cache");
                self.hashes().remove_hash(&relative_path);
            }
        }
    }

    /// Reads (once) the file so its hash is known, then reports the recorded hash.
    ///
    /// A file that does not exist has no hash.
    fn file_hash(&self, relative_path: &str) -> Result<Option<String>> {
        match self.read_bytes(relative_path) {
            Ok(_) => {}
            Err(Error::Io { source }) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        }
        self.inner.file_hash(relative_path)
    }

    fn hashes(&self) -> &RepositoryHashManager {
        self.inner.hashes()
    }
}
