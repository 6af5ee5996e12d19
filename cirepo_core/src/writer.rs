//! Writing and deleting repository files.

use crate::document;
use crate::error::{Error, Result};
use crate::hash_manager::RepositoryHashManager;
use crate::hashing::HashingWriter;
use crate::storage::{StorageOperations, validate_relative_path};
use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Writes repository files, recording each file's hash as it is streamed out.
#[derive(Debug, Clone)]
pub struct FileSystemWriter {
    operations: StorageOperations,
}

impl FileSystemWriter {
    pub fn new(operations: StorageOperations) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &StorageOperations {
        &self.operations
    }

    pub fn hashes(&self) -> &RepositoryHashManager {
        self.operations.hashes()
    }

    /// Write raw bytes; returns the recorded hash.
    pub fn write_bytes(&self, relative_path: &str, content: &[u8]) -> Result<String> {
        self.store_to_file(relative_path, |stream| {
            stream.write_all(content)?;
            Ok(())
        })
    }

    /// Write UTF-8 text (no byte order mark); returns the recorded hash.
    pub fn write_text(&self, relative_path: &str, content: &str) -> Result<String> {
        self.write_bytes(relative_path, content.as_bytes())
    }

    /// Serialize an XML document and write it; returns the recorded hash.
    pub fn write_document<T: Serialize>(&self, relative_path: &str, document: &T) -> Result<String> {
        // Validate before serializing so bad paths fail without any work.
        validate_relative_path(relative_path)?;
        let xml = document::to_xml(document)?;
        self.write_text(relative_path, &xml)
    }

    /// Create or truncate the file and stream content into it through a hasher.
    ///
    /// The content goes to a temporary file next to the destination which is
    /// then persisted over it, so readers never see a half-written file.
    fn store_to_file<F>(&self, relative_path: &str, write: F) -> Result<String>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let relative_path = validate_relative_path(relative_path)?;
        let absolute_path = self.operations.absolute_path(&relative_path);
        self.operations.check_path_length(&absolute_path)?;

        let parent = absolute_path.parent().ok_or_else(|| {
            Error::invalid_argument(format!("path has no parent directory: {}", relative_path))
        })?;
        fs::create_dir_all(parent).map_err(|e| self.operations.wrap_io_error(parent, e))?;

        let temp_file = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| self.operations.wrap_io_error(&absolute_path, e))?;
        let mut stream = HashingWriter::new(
            BufWriter::new(temp_file),
            self.operations.crypto().hasher(),
        );

        write(&mut stream)?;

        let bytes = stream.bytes_written();
        let (buffered, digest) = stream
            .finish()
            .map_err(|e| self.operations.wrap_io_error(&absolute_path, e))?;
        let temp_file = buffered
            .into_inner()
            .map_err(|e| self.operations.wrap_io_error(&absolute_path, e.into_error()))?;
        temp_file
            .persist(&absolute_path)
            .map_err(|e| self.operations.wrap_io_error(&absolute_path, e.error))?;

        let hash = self.operations.hashes().save_hash(&relative_path, &digest);
        debug!(path = %relative_path, bytes, hash = %hash, "wrote repository file");
        Ok(hash)
    }

    /// Delete a repository file and forget its hash.
    ///
    /// With `check_existence` a missing file is skipped; otherwise deleting a
    /// missing file fails. Either way a missing file no longer has a hash.
    /// Returns whether a file was deleted. Directories left empty are removed
    /// up to the repository root.
    pub fn delete_file(&self, relative_path: &str, check_existence: bool) -> Result<bool> {
        let relative_path = validate_relative_path(relative_path)?;
        let absolute_path = self.operations.absolute_path(&relative_path);
        self.operations.check_path_length(&absolute_path)?;

        if check_existence && !absolute_path.is_file() {
            debug!(path = %relative_path, "file already absent, nothing to delete");
            self.forget_hash(&relative_path);
            return Ok(false);
        }

        if let Err(err) = fs::remove_file(&absolute_path) {
            if err.kind() == io::ErrorKind::NotFound {
                self.forget_hash(&relative_path);
            }
            return Err(self.operations.wrap_io_error(&absolute_path, err));
        }
        self.operations.hashes().remove_hash(&relative_path);
        self.prune_empty_directories(&absolute_path);

        debug!(path = %relative_path, "deleted repository file");
        Ok(true)
    }

    /// Mark a known path removed. Paths never seen stay unknown.
    fn forget_hash(&self, relative_path: &str) {
        let hashes = self.operations.hashes();
        if hashes.contains(relative_path) {
            hashes.remove_hash(relative_path);
        }
    }

    fn prune_empty_directories(&self, deleted_file: &Path) {
        let root = self.operations.config().root();
        let mut current = deleted_file.parent();

        while let Some(dir) = current {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            let is_empty = fs::read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty || fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}
