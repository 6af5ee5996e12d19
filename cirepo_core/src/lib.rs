//! # cirepo core
//!
//! A file-system repository for continuous integration of database objects.
//!
//! Objects are serialized to XML documents in a directory tree. Every file
//! read or written through the repository has its content hash recorded in a
//! session-wide [`RepositoryHashManager`], which is how changes are detected
//! without comparing content.
//!
//! ## Features
//!
//! - Reading and writing repository files with fused hashing
//! - A caching reader decorator with explicit invalidation
//! - Storing all objects of a type into the repository
//! - Deleting database objects that vanished from the repository, with a
//!   dependency retry pass and cancellation
//! - Drift detection against recorded file metadata
//!
//! ## Example
//!
//! ```no_run
//! use cirepo_core::{
//!     CachedFileSystemReader, DeleteObjectsByTypeJob, FileSystemReader, MemoryDatabase,
//!     ObjectTypeInfo, RepositoryConfiguration, RepositoryHashManager, StorageOperations,
//!     scan_locations,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(RepositoryConfiguration::open("./repository")?);
//! let hashes = RepositoryHashManager::new(config.crypto());
//! let reader = CachedFileSystemReader::new(FileSystemReader::new(StorageOperations::new(
//!     config.clone(),
//!     hashes,
//! )));
//!
//! let mut database = MemoryDatabase::new();
//! let existing = scan_locations(&config)?;
//! let report = DeleteObjectsByTypeJob::new(&config, &mut database, &reader)
//!     .run(&ObjectTypeInfo::new("cms.user"), &existing)?;
//! println!("deleted {} objects", report.deleted.len());
//! # Ok(())
//! # }
//! ```

mod cached_reader;
mod cancel;
mod config;
mod crypto;
mod document;
mod drift;
mod error;
mod hash_manager;
mod hashing;
mod jobs;
mod journal;
mod locations;
mod memory;
mod metadata;
mod objects;
mod paths;
mod reader;
mod scan;
mod storage;
mod writer;

pub use cached_reader::CachedFileSystemReader;
pub use cancel::CancellationToken;
pub use config::{
    CONFIG_FILE_NAME, DEFAULT_MAX_FILE_NAME_LENGTH, DEFAULT_MAX_PATH_LENGTH, JOURNAL_FILE_NAME,
    METADATA_FILE_NAME, RepositoryConfiguration,
};
pub use crypto::{Algorithm, CryptoHelper, Hasher};
pub use document::{
    BindingDocument, BindingElement, FieldElement, ObjectDocument, XML_DECLARATION, from_xml,
    is_binding_recorded, to_xml,
};
pub use drift::{DriftReport, detect_drift};
pub use error::{BoxError, Error, Result};
pub use hash_manager::{FlushStats, RepositoryHashManager};
pub use hashing::{HashingReader, HashingWriter};
pub use jobs::{
    DeleteObjectsByTypeJob, DeleteReport, NotDeletedObject, StoreObjectsByTypeJob, StoreReport,
};
pub use journal::{
    LogActionType, LogItemType, MemoryProgress, ProgressEntry, ProgressJournal, ProgressLog,
    TracingProgress,
};
pub use locations::RepositoryLocations;
pub use memory::{Dependency, MemoryDatabase};
pub use metadata::{FileMetadata, FileMetadataStore, JsonMetadataStore, MemoryMetadataStore};
pub use objects::{
    BindingInfo, DeleteContext, DeleteOutcome, IncludeAll, InclusionFilter, ObjectDatabase,
    ObjectInfo, ObjectKey, ObjectTypeInfo,
};
pub use paths::{DefaultPathResolver, GLOBAL_FOLDER, PathResolver, sanitize_name};
pub use reader::{FileSystemReader, RepositoryReader, decode_text};
pub use scan::{group_locations, scan_files, scan_locations};
pub use storage::{StorageOperations, validate_relative_path};
pub use writer::FileSystemWriter;
