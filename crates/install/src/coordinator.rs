//! Single-flight expansion keyed by package source

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use kiln_errors::Error;
use kiln_store::ExpandedPackage;
use tokio::sync::OnceCell;

/// Outcome shared by every caller asking for the same key
pub type ExpansionResult = Result<Arc<ExpandedPackage>, Error>;

/// Runs the expensive work for each key exactly once
///
/// Concurrent callers for a key wait on the first caller's work and all
/// receive a clone of its result, errors included. Entries are never
/// evicted, so the coordinator should live exactly as long as the batch
/// (or orchestrator invocation) that owns it.
#[derive(Debug, Clone, Default)]
pub struct FetchCoordinator {
    results: Arc<DashMap<String, Arc<OnceCell<ExpansionResult>>>>,
}

impl FetchCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the result for `key`, running `work` if nobody has yet
    ///
    /// If the caller running `work` is dropped before it finishes, the next
    /// waiter runs its own `work` instead.
    pub async fn get<F, Fut>(&self, key: &str, work: F) -> ExpansionResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ExpansionResult>,
    {
        // Clone the cell out so no shard lock is held across the await
        let cell = self.results.entry(key.to_string()).or_default().clone();
        cell.get_or_init(work).await.clone()
    }

    /// Whether `key` has a finished result
    #[must_use]
    pub fn is_resolved(&self, key: &str) -> bool {
        self.results
            .get(key)
            .is_some_and(|cell| cell.initialized())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
