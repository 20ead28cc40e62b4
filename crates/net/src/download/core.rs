//! The `Fetcher`: scheme dispatch, spooling, resume and retry

use std::path::{Path, PathBuf};
use std::time::Instant;

use kiln_errors::{Error, NetworkError, UserFacingError};
use kiln_events::{AppEvent, DownloadEvent, EventEmitter, EventSender, FailureContext};
use kiln_resources::CancelScope;
use reqwest::header::ACCEPT_RANGES;
use tokio::fs::File;

use super::config::FetchedArchive;
use super::retry::calculate_backoff_delay;
use super::stream::{prepare_spool, stream_body};
use super::validation::{validate_response, FetchSource};
use crate::client::{NetClient, NetConfig};

/// Fetches archives to a readable local path
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: NetClient,
    spool_dir: Option<PathBuf>,
    tx: Option<EventSender>,
}

impl EventEmitter for Fetcher {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl Fetcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        Ok(Self {
            client: NetClient::new(config)?,
            spool_dir: None,
            tx: None,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(NetConfig::default())
    }

    /// Spool remote downloads under `dir` instead of the system temp dir
    #[must_use]
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Make `url` readable as a local file
    ///
    /// # Errors
    ///
    /// Returns a network error when the source cannot be read, the server
    /// keeps failing after all retries, or `scope` is cancelled.
    pub async fn fetch(&self, url: &str, scope: &CancelScope) -> Result<FetchedArchive, Error> {
        scope.check()?;
        match FetchSource::parse(url)? {
            FetchSource::Local(path) => Self::fetch_local(path).await,
            FetchSource::Http(parsed) => self.fetch_http(parsed.as_str(), scope).await,
        }
    }

    async fn fetch_local(path: PathBuf) -> Result<FetchedArchive, Error> {
        let metadata =
            tokio::fs::metadata(&path)
                .await
                .map_err(|e| NetworkError::LocalReadFailed {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
        if !metadata.is_file() {
            return Err(NetworkError::LocalReadFailed {
                path: path.display().to_string(),
                message: "not a regular file".to_string(),
            }
            .into());
        }
        Ok(FetchedArchive::local(path, metadata.len()))
    }

    async fn fetch_http(&self, url: &str, scope: &CancelScope) -> Result<FetchedArchive, Error> {
        let start = Instant::now();
        let (spool, spool_path) = self.create_spool()?.into_parts();
        let mut file = File::from_std(spool);
        let retry = &self.client.config().retry;

        let mut written = 0u64;
        let mut attempt = 0u32;

        loop {
            match self.try_fetch(url, &mut file, &mut written, attempt, scope).await {
                Ok(()) => break,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > retry.max_retries || !e.is_retryable() {
                        self.emit(AppEvent::Download(DownloadEvent::Failed {
                            url: url.to_string(),
                            bytes_downloaded: written,
                            failure: FailureContext::from_error(&e),
                        }));
                        return Err(e);
                    }

                    let delay = calculate_backoff_delay(retry, attempt);
                    self.emit(AppEvent::Download(DownloadEvent::Retrying {
                        url: url.to_string(),
                        attempt: attempt as usize,
                        max_attempts: retry.max_retries as usize,
                        reason: e.to_string(),
                        backoff_delay: delay,
                    }));

                    tokio::select! {
                        () = scope.cancelled() => return Err(scope.annotate(Error::cancelled())),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        drop(file);
        self.emit(AppEvent::Download(DownloadEvent::Completed {
            url: url.to_string(),
            final_size: written,
            total_time: start.elapsed(),
        }));

        Ok(FetchedArchive::spooled(spool_path, written))
    }

    /// One request; resumes with a range when part of the body is spooled
    async fn try_fetch(
        &self,
        url: &str,
        file: &mut File,
        written: &mut u64,
        attempt: u32,
        scope: &CancelScope,
    ) -> Result<(), Error> {
        let resuming = *written > 0;
        if resuming {
            self.emit(AppEvent::Download(DownloadEvent::Resuming {
                url: url.to_string(),
                resume_offset: *written,
                attempt: attempt as usize,
            }));
        }

        let response = tokio::select! {
            () = scope.cancelled() => return Err(scope.annotate(Error::cancelled())),
            response = self.client.get_from(url, resuming.then_some(*written)) => response?,
        };

        let mode = validate_response(url, response.status(), resuming)?;
        *written = prepare_spool(file, mode, *written).await?;

        let supports_resume = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
        self.emit(AppEvent::Download(DownloadEvent::Started {
            url: url.to_string(),
            total_size: response.content_length().map(|len| *written + len),
            supports_resume,
        }));

        stream_body(
            response,
            file,
            written,
            url,
            self.client.config().chunk_timeout,
            scope,
        )
        .await
    }

    fn create_spool(&self) -> Result<tempfile::NamedTempFile, Error> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".fetch-").suffix(".apk");
        match self.spool_dir.as_deref() {
            Some(dir) => builder
                .tempfile_in(dir)
                .map_err(|e| Error::io_with_path(&e, dir)),
            None => builder
                .tempfile()
                .map_err(|e| Error::io_with_path(&e, std::env::temp_dir())),
        }
    }

    #[must_use]
    pub fn spool_dir(&self) -> Option<&Path> {
        self.spool_dir.as_deref()
    }
}
