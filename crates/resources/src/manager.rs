//! Semaphore-backed permits for expansion workers

use std::sync::Arc;

use kiln_errors::{Error, InstallError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::ResourceLimits;

/// Acquire a semaphore permit, mapping a closed semaphore to an install error
///
/// # Errors
///
/// Returns `InstallError::ConcurrencyError` if the semaphore is closed.
pub async fn acquire_semaphore_permit(
    semaphore: Arc<Semaphore>,
    operation: &str,
) -> Result<OwnedSemaphorePermit, Error> {
    semaphore.acquire_owned().await.map_err(|_| {
        InstallError::ConcurrencyError {
            message: format!("failed to acquire semaphore for {operation}"),
        }
        .into()
    })
}

/// Owns the expansion worker pool bound
///
/// Tokio semaphores are fair, so workers spawned in index order acquire
/// their permits in index order as well.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    expansions: Arc<Semaphore>,
    limits: ResourceLimits,
}

impl ResourceManager {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            expansions: Arc::new(Semaphore::new(limits.concurrent_expansions.max(1))),
            limits,
        }
    }

    #[must_use]
    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Wait for an expansion slot
    ///
    /// # Errors
    ///
    /// Returns `InstallError::ConcurrencyError` once [`ResourceManager::close`]
    /// has been called.
    pub async fn acquire_expansion_permit(&self) -> Result<OwnedSemaphorePermit, Error> {
        acquire_semaphore_permit(self.expansions.clone(), "package expansion").await
    }

    #[must_use]
    pub fn available_expansions(&self) -> usize {
        self.expansions.available_permits()
    }

    /// Refuse all further permits; waiters fail immediately.
    pub fn close(&self) {
        self.expansions.close();
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_bounded() {
        let manager = ResourceManager::new(ResourceLimits {
            concurrent_expansions: 2,
        });
        let a = manager.acquire_expansion_permit().await.unwrap();
        let _b = manager.acquire_expansion_permit().await.unwrap();
        assert_eq!(manager.available_expansions(), 0);
        drop(a);
        assert_eq!(manager.available_expansions(), 1);
    }

    #[tokio::test]
    async fn closed_manager_reports_concurrency_error() {
        let manager = ResourceManager::new(ResourceLimits {
            concurrent_expansions: 1,
        });
        manager.close();
        let err = manager.acquire_expansion_permit().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Install(InstallError::ConcurrencyError { .. })
        ));
    }
}
