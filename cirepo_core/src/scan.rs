//! Discovering repository files on disk.

use crate::config::RepositoryConfiguration;
use crate::error::Result;
use crate::locations::RepositoryLocations;
use crate::paths::DOCUMENT_EXTENSION;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Every repository file as a sorted list of relative paths.
///
/// Honors `.gitignore`, skips `.git` and the repository's own bookkeeping
/// files.
pub fn scan_files(config: &RepositoryConfiguration) -> Result<Vec<String>> {
    let root = config.root();
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
            continue;
        }

        let Some(relative_path) = config.relative_path(entry.path()) else {
            continue;
        };
        if RepositoryConfiguration::is_reserved(&relative_path) {
            continue;
        }
        files.push(relative_path);
    }

    files.sort();
    debug!(root = %root.display(), files = files.len(), "scanned repository");
    Ok(files)
}

/// Group repository files into per-object location sets.
///
/// Each `*.xml` file is a main location. A sibling named
/// `<stem>.<field>.<ext>` belongs to `<stem>.xml` as an additional location.
/// Any other file forms a location set of its own.
pub fn scan_locations(config: &RepositoryConfiguration) -> Result<Vec<RepositoryLocations>> {
    Ok(group_locations(&scan_files(config)?))
}

pub fn group_locations(files: &[String]) -> Vec<RepositoryLocations> {
    let suffix = format!(".{}", DOCUMENT_EXTENSION);
    let mains: BTreeSet<&str> = files
        .iter()
        .map(String::as_str)
        .filter(|file| file.ends_with(&suffix))
        .collect();

    let mut grouped: BTreeMap<&str, RepositoryLocations> = mains
        .iter()
        .map(|main| (*main, RepositoryLocations::from_main(*main)))
        .collect();
    let mut standalone = Vec::new();

    for file in files.iter().filter(|file| !mains.contains(file.as_str())) {
        let owner = owning_document(file, &suffix);
        match owner.as_deref().and_then(|owner| grouped.get_mut(owner)) {
            Some(locations) => locations.add_additional(file.clone()),
            None => standalone.push(RepositoryLocations::from_main(file.clone())),
        }
    }

    let mut result: Vec<RepositoryLocations> = grouped.into_values().chain(standalone).collect();
    result.sort();
    result
}

/// `dir/stem.field.ext` -> `dir/stem.xml`.
fn owning_document(file: &str, suffix: &str) -> Option<String> {
    let (without_ext, _ext) = file.rsplit_once('.')?;
    let (stem, _field) = without_ext.rsplit_once('.')?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(format!("{}{}", stem, suffix))
}
