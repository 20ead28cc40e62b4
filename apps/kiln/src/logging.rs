//! Structured logging integration for events
//!
//! Every event received by the CLI is turned into a tracing record with
//! structured fields, so `--debug` and `RUST_LOG` expose the engine's full
//! activity without the engine depending on a subscriber.

use kiln_events::{
    AcquisitionEvent, AcquisitionSource, AppEvent, DownloadEvent, EventMessage, GeneralEvent,
    InstallEvent, ResolverEvent,
};
use tracing::{debug, error, info, trace, warn};

fn source_label(source: &AcquisitionSource) -> String {
    match source {
        AcquisitionSource::Remote { url } => url.clone(),
        AcquisitionSource::Local { path } => path.display().to_string(),
    }
}

/// Log an event using the tracing infrastructure with structured fields
#[allow(clippy::too_many_lines)]
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    match &message.event {
        AppEvent::General(event) => match event {
            GeneralEvent::Warning { message, context } => {
                warn!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    context = ?context,
                    "{message}"
                );
            }
            GeneralEvent::Error { message, details } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    details = ?details,
                    "{message}"
                );
            }
            GeneralEvent::DebugLog { message, context } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    context = ?context,
                    "{message}"
                );
            }
            GeneralEvent::OperationStarted { operation } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    operation = %operation,
                    "Operation started"
                );
            }
            GeneralEvent::OperationCompleted { operation, success } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    operation = %operation,
                    success = success,
                    "Operation completed"
                );
            }
            GeneralEvent::OperationFailed { operation, failure } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    operation = %operation,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Operation failed"
                );
            }
        },

        AppEvent::Acquisition(event) => match event {
            AcquisitionEvent::CacheHit {
                package,
                checksum,
                cache_dir,
            } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    checksum = %checksum,
                    cache_dir = %cache_dir.display(),
                    "Package found in cache"
                );
            }
            AcquisitionEvent::CacheMiss {
                package,
                checksum,
                reason,
            } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    checksum = %checksum,
                    reason = %reason,
                    "Package not in cache"
                );
            }
            AcquisitionEvent::Started { package, source } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    from = %source_label(source),
                    "Package acquisition started"
                );
            }
            AcquisitionEvent::Completed {
                package,
                source,
                size,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    from = %source_label(source),
                    size = size,
                    "Package acquisition completed"
                );
            }
            AcquisitionEvent::Failed {
                package,
                source,
                failure,
            } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    from = %source_label(source),
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Package acquisition failed"
                );
            }
            AcquisitionEvent::Adopted { package, cache_dir } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    cache_dir = %cache_dir.display(),
                    "Expanded package moved into cache"
                );
            }
        },

        AppEvent::Download(event) => match event {
            DownloadEvent::Started {
                url,
                total_size,
                supports_resume,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    url = %url,
                    total_size = ?total_size,
                    supports_resume = supports_resume,
                    "Download started"
                );
            }
            DownloadEvent::Resuming {
                url,
                resume_offset,
                attempt,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    url = %url,
                    resume_offset = resume_offset,
                    attempt = attempt,
                    "Download resuming"
                );
            }
            DownloadEvent::Retrying {
                url,
                attempt,
                max_attempts,
                reason,
                backoff_delay,
            } => {
                warn!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    url = %url,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    reason = %reason,
                    backoff_ms = u64::try_from(backoff_delay.as_millis()).unwrap_or(u64::MAX),
                    "Download retrying"
                );
            }
            DownloadEvent::Completed {
                url,
                final_size,
                total_time,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    url = %url,
                    final_size = final_size,
                    duration_ms = u64::try_from(total_time.as_millis()).unwrap_or(u64::MAX),
                    "Download completed"
                );
            }
            DownloadEvent::Failed {
                url,
                bytes_downloaded,
                failure,
            } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    url = %url,
                    bytes_downloaded = bytes_downloaded,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Download failed"
                );
            }
        },

        AppEvent::Install(event) => match event {
            InstallEvent::BatchStarted { packages, workers } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    packages = packages,
                    workers = workers,
                    "Install batch started"
                );
            }
            InstallEvent::Started {
                package,
                version,
                index,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    version = %version,
                    index = index,
                    "Package installation started"
                );
            }
            InstallEvent::Skipped { package, version } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    version = %version,
                    "Package already installed"
                );
            }
            InstallEvent::Completed {
                package,
                version,
                installed_files,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    version = %version,
                    installed_files = installed_files,
                    "Package installation completed"
                );
            }
            InstallEvent::Failed {
                package,
                phase,
                failure,
            } => {
                error!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    phase = ?phase,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Package installation failed"
                );
            }
            InstallEvent::Finalized {
                package,
                files_kept,
                files_dropped,
            } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    files_kept = files_kept,
                    files_dropped = files_dropped,
                    "Package recorded in database"
                );
            }
            InstallEvent::BatchCompleted {
                installed,
                skipped,
                duration,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    installed = installed,
                    skipped = skipped,
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "Install batch completed"
                );
            }
            InstallEvent::DatabaseLocationResolved { path, action } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    path = %path.display(),
                    action = %action,
                    "Database location resolved"
                );
            }
        },

        AppEvent::Resolver(event) => match event {
            ResolverEvent::ResolutionStarted {
                world,
                repositories,
                sibling_arches,
            } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    world = ?world,
                    repositories = repositories,
                    sibling_arches = ?sibling_arches,
                    "Resolution started"
                );
            }
            ResolverEvent::ResolutionCompleted { packages, conflicts } => {
                info!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    packages = packages.len(),
                    conflicts = ?conflicts,
                    "Resolution completed"
                );
                trace!(order = ?packages, "Install order");
            }
            ResolverEvent::PackageExcluded {
                package,
                missing_arch,
            } => {
                warn!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    package = %package,
                    missing_arch = %missing_arch,
                    "Package excluded"
                );
            }
            ResolverEvent::IndexLoaded { url, packages } => {
                debug!(
                    source = meta.source.as_str(),
                    event_id = %meta.event_id,
                    correlation = meta.correlation(),
                    url = %url,
                    packages = packages,
                    "Repository index loaded"
                );
            }
        },
    }
}
