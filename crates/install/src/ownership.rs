//! Batch-scoped file ownership

use std::collections::HashMap;
use std::sync::Arc;

use kiln_types::{FileHeader, Package};

/// Which package last wrote each path during one install batch
///
/// Owners are compared by identity, not by value: two records with equal
/// metadata are still distinct owners.
#[derive(Debug, Default)]
pub struct OwnershipTracker {
    owners: HashMap<String, Arc<Package>>,
}

impl OwnershipTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner` for `path`, replacing any previous owner
    pub fn claim(&mut self, path: impl Into<String>, owner: &Arc<Package>) {
        self.owners.insert(path.into(), Arc::clone(owner));
    }

    #[must_use]
    pub fn owner_of(&self, path: &str) -> Option<&Arc<Package>> {
        self.owners.get(path)
    }

    /// Claim every non-directory entry of `files` for `owner`
    pub fn claim_files(&mut self, files: &[FileHeader], owner: &Arc<Package>) {
        for header in files.iter().filter(|h| !h.is_dir()) {
            self.claim(header.path.clone(), owner);
        }
    }

    /// Whether `header` still belongs to `owner`'s file list
    ///
    /// Directories are shared and always kept.
    #[must_use]
    pub fn retains(&self, header: &FileHeader, owner: &Arc<Package>) -> bool {
        header.is_dir()
            || self
                .owner_of(&header.path)
                .is_none_or(|current| Arc::ptr_eq(current, owner))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
