#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for kiln
//!
//! Package archives and repository indexes are fetched through a single
//! [`Fetcher`], which dispatches on the URL scheme: local files and
//! `file://` URLs are read in place, `http(s)://` sources are spooled to a
//! temporary file with byte-range resume and bounded retries.

mod client;
mod download;

pub use client::{NetClient, NetConfig};
pub use download::{FetchSource, FetchedArchive, Fetcher, RetryConfig};

use kiln_errors::{Error, NetworkError};
use url::Url;

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://dl.example.org/v3.20/main").is_ok());
        assert!(parse_url("not a url").is_err());
    }
}
