//! Reading repository files with the content hash recorded as a side effect.

use crate::error::{Error, Result};
use crate::hash_manager::RepositoryHashManager;
use crate::hashing::HashingReader;
use crate::storage::{StorageOperations, validate_relative_path};
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::debug;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Read access to repository files.
///
/// Every successful read records the file's hash in the session's
/// [`RepositoryHashManager`].
pub trait RepositoryReader {
    /// Read the whole file at a relative path.
    fn read_bytes(&self, relative_path: &str) -> Result<Vec<u8>>;

    /// Read the file as text with any byte order mark stripped.
    fn read_string(&self, relative_path: &str) -> Result<String> {
        let bytes = self.read_bytes(relative_path)?;
        decode_text(relative_path, &bytes)
    }

    /// Forget cached content of the given paths. Uncached readers ignore this.
    fn remove_from_cache(&self, _relative_paths: &[String]) {}

    /// Hash recorded for a path.
    fn file_hash(&self, relative_path: &str) -> Result<Option<String>>;

    /// The hash manager reads are recorded in.
    fn hashes(&self) -> &RepositoryHashManager;
}

/// Reads straight from disk on every call.
#[derive(Debug, Clone)]
pub struct FileSystemReader {
    operations: StorageOperations,
}

impl FileSystemReader {
    pub fn new(operations: StorageOperations) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &StorageOperations {
        &self.operations
    }
}

impl RepositoryReader for FileSystemReader {
    fn read_bytes(&self, relative_path: &str) -> Result<Vec<u8>> {
        let relative_path = validate_relative_path(relative_path)?;
        let absolute_path = self.operations.absolute_path(&relative_path);
        self.operations.check_path_length(&absolute_path)?;

        let file = File::open(&absolute_path)
            .map_err(|e| self.operations.wrap_io_error(&absolute_path, e))?;
        let mut reader = HashingReader::new(BufReader::new(file), self.operations.crypto().hasher());

        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| self.operations.wrap_io_error(&absolute_path, e))?;

        let hash = self
            .operations
            .hashes()
            .save_hash(&relative_path, &reader.finalize());
        debug!(path = %relative_path, bytes = bytes.len(), hash = %hash, "read repository file");

        Ok(bytes)
    }

    fn file_hash(&self, relative_path: &str) -> Result<Option<String>> {
        self.operations.file_hash(relative_path)
    }

    fn hashes(&self) -> &RepositoryHashManager {
        self.operations.hashes()
    }
}

/// Decode file content as text, honoring and stripping a byte order mark.
///
/// UTF-8 is assumed without a BOM. A UTF-16 BOM selects UTF-16 decoding.
pub fn decode_text(relative_path: &str, bytes: &[u8]) -> Result<String> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return String::from_utf8(rest.to_vec()).map_err(|_| Error::invalid_text(relative_path));
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        return decode_utf16(relative_path, rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        return decode_utf16(relative_path, rest, u16::from_be_bytes);
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::invalid_text(relative_path))
}

fn decode_utf16(
    relative_path: &str,
    bytes: &[u8],
    to_unit: fn([u8; 2]) -> u16,
) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::invalid_text(relative_path));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| Error::invalid_text(relative_path))
}
