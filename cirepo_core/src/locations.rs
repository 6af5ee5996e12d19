//! The set of files that together serialize one object.

use serde::Serialize;
use std::collections::BTreeSet;

/// Relative paths of one object's files.
///
/// `main` holds the canonical document paths, `additional` the files of
/// separated fields. Both sets are sorted and unique; equality and hashing
/// are structural so a collection can key a set or map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RepositoryLocations {
    main: BTreeSet<String>,
    additional: BTreeSet<String>,
}

impl RepositoryLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection with a single main path.
    pub fn from_main(path: impl Into<String>) -> Self {
        let mut locations = Self::new();
        locations.add_main(path);
        locations
    }

    pub fn with_additional(mut self, path: impl Into<String>) -> Self {
        self.add_additional(path);
        self
    }

    pub fn add_main(&mut self, path: impl Into<String>) {
        self.main.insert(path.into());
    }

    pub fn add_additional(&mut self, path: impl Into<String>) {
        self.additional.insert(path.into());
    }

    pub fn main(&self) -> &BTreeSet<String> {
        &self.main
    }

    pub fn additional(&self) -> &BTreeSet<String> {
        &self.additional
    }

    /// Main paths first, then additional ones.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.main.iter().chain(self.additional.iter())
    }

    /// Copy without the additional paths.
    pub fn main_only(&self) -> Self {
        Self {
            main: self.main.clone(),
            additional: BTreeSet::new(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.main.contains(path) || self.additional.contains(path)
    }

    pub fn len(&self) -> usize {
        self.main.len() + self.additional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.additional.is_empty()
    }
}
