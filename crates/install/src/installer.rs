//! Parallel expansion with strictly ordered application

use std::sync::Arc;
use std::time::Instant;

use kiln_errors::{Error, InstallError};
use kiln_events::{AppEvent, EventEmitter, EventSender, FailureContext, InstallEvent, InstallPhase};
use kiln_platform::TargetFs;
use kiln_resources::{CancelScope, ResourceLimits, ResourceManager};
use kiln_state::{InstalledDb, ScriptsArchive, TriggerRegistry};
use kiln_store::ExpandedPackage;
use kiln_types::{FileHeader, InstallablePackage, Package, PackageRef};
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::apply::apply_data;
use crate::coordinator::ExpansionResult;
use crate::expander::PackageExpander;
use crate::ownership::OwnershipTracker;
use crate::package_tag;

/// Installs resolved packages into a target root
///
/// Expansion runs on a bounded pool of workers. A single consumer applies
/// the expanded packages in the given order, waiting on each index's ready
/// signal in turn, and is the only writer to the target root and its
/// package database. The batch is cancelled when the consumer reaches the
/// first failed index; every package before it is applied and stays applied.
#[derive(Debug, Clone)]
pub struct Installer {
    fs: Arc<dyn TargetFs>,
    expander: PackageExpander,
    resources: ResourceManager,
    source_date_epoch: Option<u64>,
    tx: Option<EventSender>,
}

impl EventEmitter for Installer {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl Installer {
    #[must_use]
    pub fn new(fs: Arc<dyn TargetFs>, expander: PackageExpander) -> Self {
        Self {
            fs,
            expander,
            resources: ResourceManager::new(ResourceLimits::from_system()),
            source_date_epoch: None,
            tx: None,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.resources = ResourceManager::new(limits);
        self
    }

    /// Timestamp (seconds since the epoch) stamped on recorded scripts
    #[must_use]
    pub fn with_source_date_epoch(mut self, epoch: Option<u64>) -> Self {
        self.source_date_epoch = epoch;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.expander = self.expander.with_event_sender(tx.clone());
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn expander(&self) -> &PackageExpander {
        &self.expander
    }

    /// Fetch, expand and apply `ordered`, in that order
    ///
    /// Returns one record per package, in input order. Packages already
    /// recorded as installed are skipped without touching the root; their
    /// record is still returned.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the batch, wrapped as
    /// `InstallError::ExpansionFailed` or `InstallError::ApplyFailed`, or
    /// `Error::Cancelled` if `scope` was cancelled from outside.
    pub async fn install(
        &self,
        ordered: &[PackageRef],
        scope: &CancelScope,
    ) -> Result<Vec<Package>, Error> {
        let started = Instant::now();
        let batch = scope.child();
        self.emit(AppEvent::Install(InstallEvent::BatchStarted {
            packages: ordered.len(),
            workers: self.resources.limits().concurrent_expansions,
        }));

        let mut receivers = Vec::with_capacity(ordered.len());
        let mut workers = JoinSet::new();
        for pkg in ordered {
            let (ready, receiver) = oneshot::channel();
            receivers.push(receiver);
            workers.spawn(self.expansion_worker(Arc::clone(pkg), batch.clone(), ready));
        }

        let outcome = self.consume(ordered, receivers, &batch).await;

        if outcome.is_err() {
            batch.cancel();
            workers.abort_all();
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    batch.cancel_with(
                        InstallError::TaskError {
                            message: format!("expansion worker panicked: {e}"),
                        }
                        .into(),
                    );
                }
            }
        }

        let (installed, skipped) = match outcome {
            Ok(counts) => counts,
            Err(e) => return Err(first_failure(scope, &batch, e)),
        };
        self.emit(AppEvent::Install(InstallEvent::BatchCompleted {
            installed: installed.len() - skipped,
            skipped,
            duration: started.elapsed(),
        }));
        Ok(installed)
    }

    /// Expand every package without installing anything
    ///
    /// Runs the same bounded worker pool as [`Installer::install`].
    ///
    /// # Errors
    ///
    /// Returns the first expansion failure as
    /// `InstallError::ExpansionFailed`.
    pub async fn expand_all(
        &self,
        packages: &[PackageRef],
        scope: &CancelScope,
    ) -> Result<Vec<Arc<ExpandedPackage>>, Error> {
        let batch = scope.child();
        let mut workers = JoinSet::new();
        for (index, pkg) in packages.iter().enumerate() {
            let expander = self.expander.clone();
            let resources = self.resources.clone();
            let pkg = Arc::clone(pkg);
            let scope = batch.clone();
            workers.spawn(async move {
                let result = expand_bounded(&expander, &resources, &pkg, &scope).await;
                if let Err(e) = &result {
                    if !e.is_cancelled() {
                        scope.cancel_with(expansion_failed(pkg.as_ref(), e.clone()));
                    }
                }
                (index, result)
            });
        }

        let mut expanded: Vec<Option<Arc<ExpandedPackage>>> = vec![None; packages.len()];
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, Ok(package))) => expanded[index] = Some(package),
                Ok((index, Err(e))) => {
                    failure.get_or_insert_with(|| expansion_failed(packages[index].as_ref(), e));
                    workers.abort_all();
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    failure.get_or_insert_with(|| {
                        InstallError::TaskError {
                            message: format!("expansion worker panicked: {e}"),
                        }
                        .into()
                    });
                    workers.abort_all();
                }
            }
        }

        if let Some(e) = failure {
            return Err(first_failure(scope, &batch, e));
        }
        expanded
            .into_iter()
            .map(|package| {
                package.ok_or_else(|| Error::internal("expansion finished without a result"))
            })
            .collect()
    }

    fn expansion_worker(
        &self,
        pkg: PackageRef,
        scope: CancelScope,
        ready: oneshot::Sender<ExpansionResult>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let expander = self.expander.clone();
        let resources = self.resources.clone();
        let tx = self.tx.clone();
        async move {
            let result = expand_bounded(&expander, &resources, &pkg, &scope).await;
            if let Err(e) = &result {
                if !e.is_cancelled() {
                    tx.emit(AppEvent::Install(InstallEvent::Failed {
                        package: pkg.name().to_string(),
                        phase: InstallPhase::Expand,
                        failure: FailureContext::from_error(e),
                    }));
                }
            }
            // Only the consumer cancels the batch, once it reaches this index,
            // so lower indexes still get applied
            let _ = ready.send(result);
        }
    }

    /// Walk the ready signals in order, applying each package as it arrives
    async fn consume(
        &self,
        ordered: &[PackageRef],
        receivers: Vec<oneshot::Receiver<ExpansionResult>>,
        scope: &CancelScope,
    ) -> Result<(Vec<Package>, usize), Error> {
        let mut applier = Applier {
            fs: Arc::clone(&self.fs),
            db: InstalledDb::new(Arc::clone(&self.fs)),
            scripts: ScriptsArchive::new(Arc::clone(&self.fs)),
            triggers: TriggerRegistry::new(Arc::clone(&self.fs)),
            ownership: OwnershipTracker::new(),
            records: Vec::new(),
            source_date_epoch: self.source_date_epoch,
            tx: self.tx.clone(),
        };
        let mut packages = Vec::with_capacity(ordered.len());
        let mut skipped = 0;

        for (index, (pkg, receiver)) in ordered.iter().zip(receivers).enumerate() {
            let expanded = tokio::select! {
                biased;
                () = scope.cancelled() => return Err(scope.annotate(Error::cancelled())),
                result = receiver => match result {
                    Ok(Ok(expanded)) => expanded,
                    Ok(Err(e)) => {
                        let e = expansion_failed(pkg.as_ref(), e);
                        scope.cancel_with(e.clone());
                        return Err(e);
                    }
                    Err(_) => {
                        return Err(InstallError::TaskError {
                            message: format!("expansion worker for {} exited early", pkg.name()),
                        }
                        .into())
                    }
                },
            };

            self.emit_for_package(
                package_tag(pkg.as_ref()),
                AppEvent::Install(InstallEvent::Started {
                    package: pkg.name().to_string(),
                    version: pkg.version().to_string(),
                    index,
                }),
            );

            let blocking_scope = scope.clone();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = applier.apply(&expanded, &blocking_scope);
                (applier, result)
            })
            .await
            .map_err(|e| InstallError::TaskError {
                message: format!("apply task for {}: {e}", pkg.name()),
            })?;
            applier = returned;

            match result {
                Ok(Applied::Skipped(package)) => {
                    skipped += 1;
                    packages.push(package);
                }
                Ok(Applied::Installed(package)) => packages.push(package),
                Err(e) => {
                    let e = apply_failed(pkg.as_ref(), e);
                    self.emit_failure(pkg.as_ref(), InstallPhase::Apply, &e);
                    scope.cancel_with(e.clone());
                    return Err(e);
                }
            }
        }

        let finalized = tokio::task::spawn_blocking(move || applier.finalize())
            .await
            .map_err(|e| InstallError::TaskError {
                message: format!("finalize task: {e}"),
            })?;
        if let Err(e) = finalized {
            self.emit(AppEvent::Install(InstallEvent::Failed {
                package: String::new(),
                phase: InstallPhase::Finalize,
                failure: FailureContext::from_error(&e),
            }));
            scope.cancel_with(e.clone());
            return Err(e);
        }

        Ok((packages, skipped))
    }

    fn emit_failure(&self, pkg: &dyn InstallablePackage, phase: InstallPhase, e: &Error) {
        self.emit_for_package(
            package_tag(pkg),
            AppEvent::Install(InstallEvent::Failed {
                package: pkg.name().to_string(),
                phase,
                failure: FailureContext::from_error(e),
            }),
        );
    }
}

async fn expand_bounded(
    expander: &PackageExpander,
    resources: &ResourceManager,
    pkg: &PackageRef,
    scope: &CancelScope,
) -> ExpansionResult {
    let _permit = tokio::select! {
        permit = resources.acquire_expansion_permit() => permit?,
        () = scope.cancelled() => return Err(scope.annotate(Error::cancelled())),
    };
    expander.expand(pkg, scope).await
}

fn expansion_failed(pkg: &dyn InstallablePackage, source: Error) -> Error {
    InstallError::ExpansionFailed {
        package: format!("{}-{}", pkg.name(), pkg.version()),
        source: Box::new(source),
    }
    .into()
}

fn apply_failed(pkg: &dyn InstallablePackage, source: Error) -> Error {
    InstallError::ApplyFailed {
        package: format!("{}-{}", pkg.name(), pkg.version()),
        source: Box::new(source),
    }
    .into()
}

/// The error that brought the batch down
///
/// Cancellation from outside wins; otherwise the first failure recorded on
/// the batch scope, falling back to the error the caller saw.
fn first_failure(outer: &CancelScope, batch: &CancelScope, fallback: Error) -> Error {
    if outer.is_cancelled() {
        return outer.annotate(Error::cancelled());
    }
    match batch.cause() {
        Some(cause) if !cause.is_cancelled() => cause.clone(),
        _ => batch.annotate(fallback),
    }
}

enum Applied {
    Skipped(Package),
    Installed(Package),
}

struct Record {
    package: Arc<Package>,
    files: Vec<FileHeader>,
}

/// Sole writer to the target root for one batch
///
/// Moved into a blocking task for each package and handed back afterwards.
struct Applier {
    fs: Arc<dyn TargetFs>,
    db: InstalledDb,
    scripts: ScriptsArchive,
    triggers: TriggerRegistry,
    ownership: OwnershipTracker,
    records: Vec<Record>,
    source_date_epoch: Option<u64>,
    tx: Option<EventSender>,
}

impl EventEmitter for Applier {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl Applier {
    fn apply(&mut self, expanded: &ExpandedPackage, scope: &CancelScope) -> Result<Applied, Error> {
        scope.check()?;

        // .PKGINFO is more complete than the index entry
        let package = expanded.package_info()?;
        if self.db.is_installed(&package.name)? {
            self.emit(AppEvent::Install(InstallEvent::Skipped {
                package: package.name.clone(),
                version: package.version.clone(),
            }));
            return Ok(Applied::Skipped(package));
        }

        let files = apply_data(self.fs.as_ref(), expanded, scope)?;

        let scripts = expanded
            .control()
            .scripts()
            .map(|entry| (entry.name.as_str(), entry.mode, entry.data.as_slice()));
        self.scripts.append(&package, scripts, self.source_date_epoch)?;
        self.triggers.append(&package)?;

        let package = Arc::new(package);
        self.ownership.claim_files(&files, &package);
        self.emit(AppEvent::Install(InstallEvent::Completed {
            package: package.name.clone(),
            version: package.version.clone(),
            installed_files: files.len(),
        }));
        self.records.push(Record {
            package: Arc::clone(&package),
            files,
        });
        Ok(Applied::Installed(package.as_ref().clone()))
    }

    /// Persist each package's file list, minus paths a later package took over
    fn finalize(self) -> Result<(), Error> {
        for record in &self.records {
            let (kept, dropped): (Vec<_>, Vec<_>) = record
                .files
                .iter()
                .cloned()
                .partition(|header| self.ownership.retains(header, &record.package));
            self.db.append_installed(&record.package, &kept)?;
            self.emit(AppEvent::Install(InstallEvent::Finalized {
                package: record.package.name.clone(),
                files_kept: kept.len(),
                files_dropped: dropped.len(),
            }));
        }
        Ok(())
    }
}
