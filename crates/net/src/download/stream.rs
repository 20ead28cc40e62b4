//! Streaming a response body into the spool file

use std::time::Duration;

use futures::StreamExt;
use kiln_errors::{Error, NetworkError};
use kiln_resources::CancelScope;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};

use super::validation::BodyMode;
use crate::client::map_reqwest_error;

/// Position the spool for `mode`, returning the offset writing starts at
pub(super) async fn prepare_spool(file: &mut File, mode: BodyMode, written: u64) -> Result<u64, Error> {
    match mode {
        BodyMode::Append => {
            file.seek(SeekFrom::Start(written)).await?;
            Ok(written)
        }
        BodyMode::Restart => {
            file.set_len(0).await?;
            file.seek(SeekFrom::Start(0)).await?;
            Ok(0)
        }
    }
}

/// Copy the body into `file`, bumping `written` after every chunk
///
/// `written` stays accurate when the stream breaks, so the caller can
/// resume from it. Every chunk read races the cancellation scope.
pub(super) async fn stream_body(
    response: reqwest::Response,
    file: &mut File,
    written: &mut u64,
    url: &str,
    chunk_timeout: Duration,
    scope: &CancelScope,
) -> Result<(), Error> {
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            () = scope.cancelled() => return Err(scope.annotate(Error::cancelled())),
            next = tokio::time::timeout(chunk_timeout, stream.next()) => next,
        };

        match next {
            Ok(Some(chunk)) => {
                let chunk = chunk.map_err(|e| map_reqwest_error(url, &e))?;
                file.write_all(&chunk).await?;
                *written += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(_) => {
                return Err(NetworkError::Timeout {
                    url: url.to_string(),
                }
                .into());
            }
        }
    }

    file.flush().await?;
    Ok(())
}
