use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport-level download events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    Started {
        url: String,
        total_size: Option<u64>,
        supports_resume: bool,
    },

    /// Stream broke mid-transfer; the next request asks for the remainder
    Resuming {
        url: String,
        resume_offset: u64,
        attempt: usize,
    },

    Retrying {
        url: String,
        attempt: usize,
        max_attempts: usize,
        reason: String,
        backoff_delay: Duration,
    },

    Completed {
        url: String,
        final_size: u64,
        total_time: Duration,
    },

    Failed {
        url: String,
        bytes_downloaded: u64,
        failure: super::FailureContext,
    },
}
