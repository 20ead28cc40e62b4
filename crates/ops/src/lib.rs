#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! World orchestration for kiln
//!
//! This crate sits between the CLI and the engine crates. An operation
//! reads the root's world and repositories, resolves them against the
//! repository indexes and drives the installer; the root's legacy
//! `lib/apk` location is reconciled once every package is in place.

mod context;
mod database;
mod init;
mod types;
mod world;

pub use context::{OpsContextBuilder, OpsCtx};
pub use database::{resolve_db_location, DbLocation};
pub use init::init_db;
pub use types::{InstallReport, PackageSummary};
pub use world::{add_packages, calculate_world, fixate_world, list_installed, resolve_world};

use kiln_errors::{Error, InstallError};

/// Operation result that can be serialized for CLI output
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OperationResult {
    /// Root initialized for an architecture
    Initialized { root: String, arch: String },
    /// Packages installed by a fixate
    InstallReport(InstallReport),
    /// Packages resolved and expanded without touching the root
    Fetched(Vec<PackageSummary>),
    /// Installed packages
    PackageList(Vec<PackageSummary>),
}

impl OperationResult {
    /// Convert to JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if the result cannot be serialized.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::internal(e.to_string()))
    }
}

/// Run blocking root and database I/O off the async runtime
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| InstallError::TaskError {
            message: e.to_string(),
        })?
}
