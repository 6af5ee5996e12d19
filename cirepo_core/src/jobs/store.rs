//! Serializing database objects into the repository.

use crate::cancel::CancellationToken;
use crate::config::RepositoryConfiguration;
use crate::document::{self, BindingDocument, ObjectDocument};
use crate::error::{Error, Result};
use crate::journal::{LogActionType, LogItemType, ProgressLog, TracingProgress};
use crate::locations::RepositoryLocations;
use crate::metadata::FileMetadataStore;
use crate::objects::{InclusionFilter, ObjectDatabase, ObjectInfo, ObjectTypeInfo};
use crate::paths::{DefaultPathResolver, PathResolver};
use crate::reader::RepositoryReader;
use crate::writer::FileSystemWriter;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Outcome of one [`StoreObjectsByTypeJob`] run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreReport {
    pub object_type: String,
    /// Location sets of every stored object.
    pub locations: BTreeSet<RepositoryLocations>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: usize,
    pub out_of_scope: usize,
}

enum FileChange {
    Created,
    Updated,
    Unchanged,
}

/// Writes every in-scope object of a type to the repository.
///
/// Files whose content hash already matches are left untouched. Bindings of
/// one parent share a single bindings document.
pub struct StoreObjectsByTypeJob<'a> {
    config: &'a RepositoryConfiguration,
    database: &'a dyn ObjectDatabase,
    reader: &'a dyn RepositoryReader,
    writer: &'a FileSystemWriter,
    filter: &'a dyn InclusionFilter,
    resolver: &'a dyn PathResolver,
    progress: &'a dyn ProgressLog,
    metadata: Option<&'a mut dyn FileMetadataStore>,
    cancellation: CancellationToken,
}

impl<'a> StoreObjectsByTypeJob<'a> {
    pub fn new(
        config: &'a RepositoryConfiguration,
        database: &'a dyn ObjectDatabase,
        reader: &'a dyn RepositoryReader,
        writer: &'a FileSystemWriter,
    ) -> Self {
        Self {
            config,
            database,
            reader,
            writer,
            filter: config,
            resolver: &DefaultPathResolver,
            progress: &TracingProgress,
            metadata: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_filter(mut self, filter: &'a dyn InclusionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressLog) -> Self {
        self.progress = progress;
        self
    }

    /// Record the hash of every stored file in this store when the
    /// repository runs with file metadata enabled.
    pub fn with_metadata_store(mut self, metadata: &'a mut dyn FileMetadataStore) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn run(&mut self, object_type: &ObjectTypeInfo) -> Result<StoreReport> {
        let mut report = StoreReport {
            object_type: object_type.name.clone(),
            ..StoreReport::default()
        };

        let mut objects = Vec::new();
        for object in self.database.objects_in_database(object_type)? {
            if self.filter.is_included(&object) {
                objects.push(object);
            } else {
                report.out_of_scope += 1;
            }
        }

        info!(object_type = %object_type.name, objects = objects.len(), "storing objects");

        if object_type.is_binding {
            self.store_bindings(object_type, &objects, &mut report)?;
        } else {
            for (processed, object) in objects.iter().enumerate() {
                self.cancellation.check(processed)?;
                self.store_object(object_type, object, &mut report)
                    .map_err(|e| Error::serialization(&object.object_type, object.id, e))?;
            }
        }

        if let Some(metadata) = self.metadata.as_deref_mut() {
            metadata.save()?;
        }

        info!(
            object_type = %object_type.name,
            created = report.created.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged,
            "store run finished"
        );
        Ok(report)
    }

    fn store_object(
        &mut self,
        object_type: &ObjectTypeInfo,
        object: &ObjectInfo,
        report: &mut StoreReport,
    ) -> Result<()> {
        let main = self.resolver.main_location(object, object_type);
        let xml = document::to_xml(&ObjectDocument::from_object(object))?;
        self.store_file(&main, xml.as_bytes(), report)?;

        let mut locations = RepositoryLocations::from_main(main);
        for (field, content) in &object.separated_fields {
            let path = self.resolver.field_location(object, object_type, field);
            self.store_file(&path, content, report)?;
            locations.add_additional(path);
        }

        report.locations.insert(locations);
        Ok(())
    }

    fn store_bindings(
        &mut self,
        object_type: &ObjectTypeInfo,
        objects: &[ObjectInfo],
        report: &mut StoreReport,
    ) -> Result<()> {
        let mut documents: BTreeMap<String, (BindingDocument, &ObjectInfo)> = BTreeMap::new();
        for object in objects {
            let Some(binding) = &object.binding else {
                return Err(Error::serialization(
                    &object.object_type,
                    object.id,
                    "binding object has no parent and child",
                ));
            };
            let main = self.resolver.main_location(object, object_type);
            let (bindings, _) = documents.entry(main).or_insert_with(|| {
                (BindingDocument::new(&object_type.name, &binding.parent), object)
            });
            bindings.add(&binding.child);
        }

        for (processed, (main, (bindings, first))) in documents.into_iter().enumerate() {
            self.cancellation.check(processed)?;
            let xml = document::to_xml(&bindings)
                .map_err(|e| Error::serialization(&first.object_type, first.id, e))?;
            self.store_file(&main, xml.as_bytes(), report)
                .map_err(|e| Error::serialization(&first.object_type, first.id, e))?;
            report.locations.insert(RepositoryLocations::from_main(main));
        }
        Ok(())
    }

    /// Write the content unless the file already holds exactly these bytes.
    fn store_file(&mut self, path: &str, content: &[u8], report: &mut StoreReport) -> Result<()> {
        let hash = self.reader.hashes().crypto().hash_bytes(content);
        let current = self.reader.file_hash(path)?;

        let change = match current {
            Some(ref current) if *current == hash => FileChange::Unchanged,
            Some(_) => FileChange::Updated,
            None => FileChange::Created,
        };

        match change {
            FileChange::Unchanged => {
                debug!(path, "file unchanged");
                report.unchanged += 1;
            }
            FileChange::Created | FileChange::Updated => {
                // Stale cached content must not outlive the write.
                self.reader.remove_from_cache(&[path.to_string()]);
                self.writer.write_bytes(path, content)?;

                let (action, verb, bucket) = match change {
                    FileChange::Created => (LogActionType::Create, "Created", &mut report.created),
                    _ => (LogActionType::Update, "Updated", &mut report.updated),
                };
                self.progress
                    .raise_log_progress(&format!("{} {}", verb, path), LogItemType::Info, action);
                bucket.push(path.to_string());
            }
        }

        if self.config.use_file_metadata()
            && let Some(metadata) = self.metadata.as_deref_mut()
        {
            metadata.upsert(path, &hash)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cached_reader::CachedFileSystemReader;
    use crate::hash_manager::RepositoryHashManager;
    use crate::memory::MemoryDatabase;
    use crate::metadata::MemoryMetadataStore;
    use crate::reader::FileSystemReader;
    use crate::storage::StorageOperations;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Session {
        config: Arc<RepositoryConfiguration>,
        reader: CachedFileSystemReader<FileSystemReader>,
        writer: FileSystemWriter,
    }

    fn session(config: RepositoryConfiguration) -> Session {
        let config = Arc::new(config);
        let operations = StorageOperations::new(config.clone(), RepositoryHashManager::new(config.crypto()));
        Session {
            config,
            reader: CachedFileSystemReader::new(FileSystemReader::new(operations.clone())),
            writer: FileSystemWriter::new(operations),
        }
    }

    #[test]
    fn test_store_objects_with_separated_fields() {
        let temp_dir = TempDir::new().unwrap();
        let s = session(RepositoryConfiguration::new(temp_dir.path()));

        let mut db = MemoryDatabase::new();
        db.insert(
            ObjectInfo::new("cms.user", 1, "admin")
                .with_field("email", "admin@example.com")
                .with_separated_field("photo", vec![0, 1, 2]),
        );

        let report = StoreObjectsByTypeJob::new(&s.config, &db, &s.reader, &s.writer)
            .run(&ObjectTypeInfo::new("cms.user"))
            .unwrap();

        assert_eq!(
            report.created,
            ["cms.user/@global/admin.xml", "cms.user/@global/admin.photo.bin"]
        );
        assert_eq!(
            fs::read(temp_dir.path().join("cms.user/@global/admin.photo.bin")).unwrap(),
            [0, 1, 2]
        );
        let xml = fs::read_to_string(temp_dir.path().join("cms.user/@global/admin.xml")).unwrap();
        assert!(xml.contains("admin@example.com"));
        assert_eq!(report.locations.len(), 1);
    }

    #[test]
    fn test_second_run_leaves_files_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = MemoryDatabase::new();
        db.insert(ObjectInfo::new("cms.role", 1, "editors").with_field("display", "Editors"));

        let first = session(RepositoryConfiguration::new(temp_dir.path()));
        StoreObjectsByTypeJob::new(&first.config, &db, &first.reader, &first.writer)
            .run(&ObjectTypeInfo::new("cms.role"))
            .unwrap();

        let second = session(RepositoryConfiguration::new(temp_dir.path()));
        let report = StoreObjectsByTypeJob::new(&second.config, &db, &second.reader, &second.writer)
            .run(&ObjectTypeInfo::new("cms.role"))
            .unwrap();
        assert!(report.created.is_empty());
        assert!(report.updated.is_empty());
        assert_eq!(report.unchanged, 1);

        db.insert(ObjectInfo::new("cms.role", 1, "editors").with_field("display", "Writers"));
        let report = StoreObjectsByTypeJob::new(&second.config, &db, &second.reader, &second.writer)
            .run(&ObjectTypeInfo::new("cms.role"))
            .unwrap();
        assert_eq!(report.updated, ["cms.role/@global/editors.xml"]);
        let xml = fs::read_to_string(temp_dir.path().join("cms.role/@global/editors.xml")).unwrap();
        assert!(xml.contains("Writers"));
    }

    #[test]
    fn test_bindings_grouped_per_parent() {
        let temp_dir = TempDir::new().unwrap();
        let s = session(RepositoryConfiguration::new(temp_dir.path()));

        let mut db = MemoryDatabase::new();
        db.insert(ObjectInfo::binding("cms.userrole", 1, "admin", "editors"));
        db.insert(ObjectInfo::binding("cms.userrole", 2, "admin", "readers"));
        db.insert(ObjectInfo::binding("cms.userrole", 3, "guest", "readers"));

        let report = StoreObjectsByTypeJob::new(&s.config, &db, &s.reader, &s.writer)
            .run(&ObjectTypeInfo::binding("cms.userrole"))
            .unwrap();

        assert_eq!(
            report.created,
            ["cms.userrole/@global/admin.xml", "cms.userrole/@global/guest.xml"]
        );
        let xml = fs::read_to_string(temp_dir.path().join("cms.userrole/@global/admin.xml")).unwrap();
        let parsed: BindingDocument = document::from_xml(&xml).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains("editors") && parsed.contains("readers"));
    }

    #[test]
    fn test_metadata_recorded_in_file_metadata_mode() {
        let temp_dir = TempDir::new().unwrap();
        let s = session(RepositoryConfiguration::new(temp_dir.path()).with_file_metadata(true));
        let mut metadata = MemoryMetadataStore::new();

        let mut db = MemoryDatabase::new();
        db.insert(ObjectInfo::new("cms.user", 1, "admin"));

        StoreObjectsByTypeJob::new(&s.config, &db, &s.reader, &s.writer)
            .with_metadata_store(&mut metadata)
            .run(&ObjectTypeInfo::new("cms.user"))
            .unwrap();

        let row = metadata.get("cms.user/@global/admin.xml").unwrap().unwrap();
        assert_eq!(
            Some(row.hash),
            s.writer.hashes().get_hash("cms.user/@global/admin.xml")
        );
    }

    #[test]
    fn test_binding_without_details_fails() {
        let temp_dir = TempDir::new().unwrap();
        let s = session(RepositoryConfiguration::new(temp_dir.path()));

        let mut db = MemoryDatabase::new();
        db.insert(ObjectInfo::new("cms.userrole", 4, "broken"));

        let err = StoreObjectsByTypeJob::new(&s.config, &db, &s.reader, &s.writer)
            .run(&ObjectTypeInfo::binding("cms.userrole"))
            .unwrap_err();
        assert!(matches!(err, Error::Serialization { object_id: 4, .. }));
    }

    #[test]
    fn test_cancelled_before_first_object() {
        let temp_dir = TempDir::new().unwrap();
        let s = session(RepositoryConfiguration::new(temp_dir.path()));
        let mut db = MemoryDatabase::new();
        db.insert(ObjectInfo::new("cms.user", 1, "admin"));

        let token = CancellationToken::new();
        token.cancel();
        let err = StoreObjectsByTypeJob::new(&s.config, &db, &s.reader, &s.writer)
            .with_cancellation(token)
            .run(&ObjectTypeInfo::new("cms.user"))
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!temp_dir.path().join("cms.user").exists());
    }
}
