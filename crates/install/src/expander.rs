//! Cache lookup, fetch, expansion and adoption of one package

use std::path::PathBuf;
use std::sync::Arc;

use kiln_errors::{Error, InstallError, PackageError};
use kiln_events::{
    AcquisitionEvent, AcquisitionSource, AppEvent, EventEmitter, EventSender, FailureContext,
};
use kiln_net::Fetcher;
use kiln_resources::CancelScope;
use kiln_store::{expand_archive, scratch_dir, PackageCache};
use kiln_types::PackageRef;

use crate::coordinator::{ExpansionResult, FetchCoordinator};
use crate::package_tag;

/// Turns installable packages into expanded packages
///
/// Every expansion goes through the [`FetchCoordinator`], keyed by the
/// package URL. With a cache configured the coordinated work first looks
/// in the cache and adopts fresh expansions into it; without one,
/// expansions live in scratch directories for as long as the coordinator
/// holds them.
#[derive(Debug, Clone)]
pub struct PackageExpander {
    fetcher: Fetcher,
    cache: Option<PackageCache>,
    coordinator: FetchCoordinator,
    tx: Option<EventSender>,
}

impl EventEmitter for PackageExpander {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl PackageExpander {
    #[must_use]
    pub fn new(fetcher: Fetcher, cache: Option<PackageCache>) -> Self {
        Self {
            fetcher,
            cache,
            coordinator: FetchCoordinator::new(),
            tx: None,
        }
    }

    /// Share an existing coordinator instead of starting a fresh one
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: FetchCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.cache = self.cache.map(|cache| cache.with_event_sender(tx.clone()));
        self.fetcher = self.fetcher.with_event_sender(tx.clone());
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn cache(&self) -> Option<&PackageCache> {
        self.cache.as_ref()
    }

    /// Expand `pkg`, at most once per URL for the lifetime of the coordinator
    ///
    /// # Errors
    ///
    /// Returns a network error if the archive cannot be fetched, a package
    /// error if it is malformed or does not match its declared checksum,
    /// and a storage error if it cannot be adopted into the cache.
    pub async fn expand(&self, pkg: &PackageRef, scope: &CancelScope) -> ExpansionResult {
        let key = pkg.url();
        self.coordinator
            .get(&key, || self.acquire(Arc::clone(pkg), scope.clone()))
            .await
    }

    async fn acquire(&self, pkg: PackageRef, scope: CancelScope) -> ExpansionResult {
        let cache_dir = match &self.cache {
            Some(cache) => {
                let dir = cache.cache_dir_for(pkg.as_ref());
                if let Some(hit) = cache.lookup(pkg.as_ref(), &dir).await {
                    return Ok(Arc::new(hit));
                }
                Some(cache.prepare_dir(pkg.as_ref()).await?)
            }
            None => None,
        };
        scope.check()?;

        let url = pkg.url();
        let source = AcquisitionSource::from_url(&url);
        self.emit_for_package(
            package_tag(pkg.as_ref()),
            AppEvent::Acquisition(AcquisitionEvent::Started {
                package: pkg.name().to_string(),
                source: source.clone(),
            }),
        );

        let expanded = match self.fetch_and_expand(&pkg, &url, cache_dir.clone(), &scope).await {
            Ok(expanded) => expanded,
            Err(e) => {
                self.emit_for_package(
                    package_tag(pkg.as_ref()),
                    AppEvent::Acquisition(AcquisitionEvent::Failed {
                        package: pkg.name().to_string(),
                        source,
                        failure: FailureContext::from_error(&e),
                    }),
                );
                return Err(e);
            }
        };

        self.emit_for_package(
            package_tag(pkg.as_ref()),
            AppEvent::Acquisition(AcquisitionEvent::Completed {
                package: pkg.name().to_string(),
                source,
                size: expanded.size(),
            }),
        );

        match (&self.cache, cache_dir) {
            (Some(cache), Some(dir)) => cache.adopt(expanded, &dir).await.map(Arc::new),
            _ => Ok(Arc::new(expanded)),
        }
    }

    async fn fetch_and_expand(
        &self,
        pkg: &PackageRef,
        url: &str,
        cache_dir: Option<PathBuf>,
        scope: &CancelScope,
    ) -> Result<kiln_store::ExpandedPackage, Error> {
        let fetched = self.fetcher.fetch(url, scope).await?;

        // Scratch space next to the cache entry keeps adoption a plain rename
        let parent = cache_dir.unwrap_or_else(std::env::temp_dir);
        let blocking_scope = scope.clone();
        let expanded = tokio::task::spawn_blocking(move || {
            let temp_dir = scratch_dir(&parent)?;
            // The spooled download lives until parsing is done
            let result = expand_archive(fetched.path(), temp_dir, &blocking_scope);
            drop(fetched);
            result
        })
        .await
        .map_err(|e| InstallError::TaskError {
            message: format!("expansion task for {url}: {e}"),
        })?
        .map_err(|e| scope.annotate(e))?;

        if expanded.control_hash() != pkg.checksum() {
            return Err(PackageError::ChecksumMismatch {
                package: format!("{}-{}", pkg.name(), pkg.version()),
                expected: pkg.checksum().to_string(),
                actual: expanded.control_hash().to_string(),
            }
            .into());
        }
        Ok(expanded)
    }
}
