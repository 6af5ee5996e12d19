//! Deleting database objects that no longer exist in the repository.

use crate::cancel::CancellationToken;
use crate::config::RepositoryConfiguration;
use crate::document;
use crate::error::{Error, Result};
use crate::journal::{LogActionType, LogItemType, ProgressLog, TracingProgress};
use crate::locations::RepositoryLocations;
use crate::metadata::FileMetadataStore;
use crate::objects::{
    DeleteContext, DeleteOutcome, InclusionFilter, ObjectDatabase, ObjectInfo, ObjectKey,
    ObjectTypeInfo,
};
use crate::paths::{DefaultPathResolver, PathResolver};
use crate::reader::RepositoryReader;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use tracing::{debug, info, warn};

/// An object whose deletion was blocked by a dependency.
#[derive(Debug, Clone, Serialize)]
pub struct NotDeletedObject {
    pub object: ObjectInfo,
    pub locations: RepositoryLocations,
    pub message: String,
}

/// Outcome of one [`DeleteObjectsByTypeJob`] run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub object_type: String,
    pub deleted: Vec<ObjectKey>,
    /// Objects still represented in the repository.
    pub skipped: usize,
    /// Objects the inclusion filter rejected.
    pub out_of_scope: usize,
    /// Delete attempts made by the retry pass.
    pub retried: usize,
    /// Objects still blocked after the retry pass.
    pub not_deleted: Vec<NotDeletedObject>,
    /// Metadata rows purged for deleted objects.
    pub purged_locations: Vec<String>,
}

impl DeleteReport {
    fn new(object_type: &ObjectTypeInfo) -> Self {
        Self {
            object_type: object_type.name.clone(),
            ..Self::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.not_deleted.is_empty()
    }
}

/// Deletes every object of a type that has no file in the repository.
///
/// Objects whose deletion is blocked by a dependency are queued and retried
/// once, in the order they were queued, after every other object was
/// processed. Deletions never create version history. Deletions already made
/// stay made when the run is cancelled or fails.
pub struct DeleteObjectsByTypeJob<'a> {
    config: &'a RepositoryConfiguration,
    database: &'a mut dyn ObjectDatabase,
    reader: &'a dyn RepositoryReader,
    filter: &'a dyn InclusionFilter,
    resolver: &'a dyn PathResolver,
    progress: &'a dyn ProgressLog,
    metadata: Option<&'a mut dyn FileMetadataStore>,
    cancellation: CancellationToken,
}

impl<'a> DeleteObjectsByTypeJob<'a> {
    /// A job filtering by the configured object types, using the default
    /// path layout and reporting progress through `tracing`.
    pub fn new(
        config: &'a RepositoryConfiguration,
        database: &'a mut dyn ObjectDatabase,
        reader: &'a dyn RepositoryReader,
    ) -> Self {
        Self {
            config,
            database,
            reader,
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

    /// Metadata rows of deleted objects are purged from this store when the
    /// repository runs with file metadata enabled.
    pub fn with_metadata_store(mut self, metadata: &'a mut dyn FileMetadataStore) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Delete objects of `object_type` not represented by any of `existing`.
    pub fn run(
        &mut self,
        object_type: &ObjectTypeInfo,
        existing: &[RepositoryLocations],
    ) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        self.run_into(object_type, existing, &mut report)?;
        Ok(report)
    }

    /// Like [`run`](Self::run), filling `report` as objects are processed.
    ///
    /// When the run is cancelled or fails, `report` still lists the deletions
    /// already made and the metadata rows purged for them are saved before
    /// the error is returned.
    pub fn run_into(
        &mut self,
        object_type: &ObjectTypeInfo,
        existing: &[RepositoryLocations],
        report: &mut DeleteReport,
    ) -> Result<()> {
        *report = DeleteReport::new(object_type);
        let outcome = self.delete_missing(object_type, existing, report);
        let saved = match self.metadata.as_deref_mut() {
            Some(metadata) => metadata.save(),
            None => Ok(()),
        };

        if let Err(err) = outcome {
            if let Err(save_err) = saved {
                warn!(error = %save_err, "failed to save file metadata of interrupted run");
            }
            warn!(
                object_type = %object_type.name,
                deleted = report.deleted.len(),
                error = %err,
                "delete run interrupted"
            );
            return Err(err);
        }
        saved?;

        info!(
            object_type = %object_type.name,
            deleted = report.deleted.len(),
            skipped = report.skipped,
            not_deleted = report.not_deleted.len(),
            "delete run finished"
        );
        Ok(())
    }

    fn delete_missing(
        &mut self,
        object_type: &ObjectTypeInfo,
        existing: &[RepositoryLocations],
        report: &mut DeleteReport,
    ) -> Result<()> {
        let existing: HashSet<RepositoryLocations> =
            existing.iter().map(RepositoryLocations::main_only).collect();

        info!(object_type = %object_type.name, known_locations = existing.len(), "deleting objects missing from repository");

        let mut location_users: HashMap<String, usize> = HashMap::new();
        let mut candidates = Vec::new();
        for object in self.database.objects_in_database(object_type)? {
            let locations = self.resolver.locations(&object, object_type);
            for path in locations.all() {
                *location_users.entry(path.clone()).or_default() += 1;
            }

            if !self.filter.is_included(&object) {
                report.out_of_scope += 1;
                continue;
            }
            candidates.push((object, locations));
        }

        let mut processed = 0;
        let mut queue = VecDeque::new();

        for (object, locations) in candidates {
            self.cancellation.check(processed)?;
            processed += 1;

            if existing.contains(&locations.main_only()) {
                let keep = !object_type.is_binding
                    || self
                        .is_binding_recorded(&object, &locations)
                        .map_err(|e| Error::serialization(&object.object_type, object.id, e))?;
                if keep {
                    debug!(object = %object, "object present in repository");
                    report.skipped += 1;
                    continue;
                }
            }

            match self.attempt_delete(&object) {
                DeleteOutcome::Deleted => {
                    report.deleted.push(object.key());
                    self.purge_metadata(&locations, &mut location_users, report)?;
                }
                DeleteOutcome::DependencyBlocked(message) => {
                    debug!(object = %object, %message, "deletion postponed by dependency");
                    queue.push_back(NotDeletedObject {
                        object,
                        locations,
                        message,
                    });
                }
                DeleteOutcome::Failed(source) => {
                    return Err(Error::serialization(&object.object_type, object.id, source));
                }
            }
        }

        let mut not_deleted = Vec::new();
        while let Some(entry) = queue.pop_front() {
            self.cancellation.check(processed)?;
            processed += 1;
            report.retried += 1;

            match self.attempt_delete(&entry.object) {
                DeleteOutcome::Deleted => {
                    report.deleted.push(entry.object.key());
                    self.purge_metadata(&entry.locations, &mut location_users, report)?;
                }
                DeleteOutcome::DependencyBlocked(message) => {
                    not_deleted.push(NotDeletedObject { message, ..entry });
                }
                DeleteOutcome::Failed(source) => {
                    return Err(Error::serialization(
                        &entry.object.object_type,
                        entry.object.id,
                        source,
                    ));
                }
            }
        }

        for entry in &not_deleted {
            warn!(object = %entry.object, message = %entry.message, "object could not be deleted");
            self.progress.raise_log_progress(
                &format!("{} was not deleted: {}", entry.object, entry.message),
                LogItemType::Warning,
                LogActionType::Delete,
            );
        }
        report.not_deleted = not_deleted;
        Ok(())
    }

    fn attempt_delete(&mut self, object: &ObjectInfo) -> DeleteOutcome {
        self.progress.raise_log_progress(
            &format!("Deleting {}", object),
            LogItemType::Info,
            LogActionType::Delete,
        );

        let outcome = self
            .database
            .delete(object, &DeleteContext::without_versioning());

        if matches!(outcome, DeleteOutcome::Deleted) {
            self.progress.raise_log_progress(
                &format!("Deleted {}", object),
                LogItemType::Info,
                LogActionType::Delete,
            );
        }
        outcome
    }

    /// Whether the binding's shared file still lists it.
    ///
    /// A missing file records nothing.
    fn is_binding_recorded(&self, object: &ObjectInfo, locations: &RepositoryLocations) -> Result<bool> {
        let Some(binding) = &object.binding else {
            warn!(object = %object, "binding object without binding details is kept");
            return Ok(true);
        };

        for path in locations.main() {
            let content = match self.reader.read_string(path) {
                Ok(content) => content,
                Err(Error::Io { source }) if source.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };
            if document::is_binding_recorded(&content, binding)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drop metadata, cached content and hashes of locations no remaining
    /// object maps to.
    fn purge_metadata(
        &mut self,
        locations: &RepositoryLocations,
        location_users: &mut HashMap<String, usize>,
        report: &mut DeleteReport,
    ) -> Result<()> {
        if !self.config.use_file_metadata() {
            return Ok(());
        }

        let mut unused = Vec::new();
        for path in locations.all() {
            if let Some(users) = location_users.get_mut(path) {
                *users = users.saturating_sub(1);
                if *users == 0 {
                    unused.push(path.clone());
                }
            }
        }
        if unused.is_empty() {
            return Ok(());
        }

        if let Some(metadata) = self.metadata.as_deref_mut() {
            metadata.delete_locations(&unused)?;
        }
        self.reader.remove_from_cache(&unused);
        for path in &unused {
            self.reader.hashes().remove_hash(path);
        }

        debug!(locations = ?unused, "purged file metadata");
        report.purged_locations.extend(unused);
        Ok(())
    }
}
