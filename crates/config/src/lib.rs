#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for kiln
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/kiln/config.toml)
//! - Environment variables
//! - CLI flags (applied by the binary)

pub mod constants;
pub mod core;

pub use self::core::{
    ColorChoice, GeneralConfig, NetworkConfig, PathConfig, RepositoryConfig, SecurityConfig,
};

use kiln_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

impl Config {
    /// Default config file location
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no config directory.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("kiln").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load from `path`, or from the default location when it exists
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given file is missing or any
    /// loaded file fails to parse.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        if let Some(path) = path {
            return Self::load_from_file(path).await;
        }
        match Self::default_path() {
            Ok(default) if default.exists() => Self::load_from_file(&default).await,
            _ => Ok(Self::default()),
        }
    }

    /// Write configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            error: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::WriteError {
                    path: parent.display().to_string(),
                    error: e.to_string(),
                })?;
        }
        fs::write(path, contents)
            .await
            .map_err(|e| ConfigError::WriteError {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
        Ok(())
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        if let Ok(root) = std::env::var("KILN_ROOT") {
            self.paths.root = Some(PathBuf::from(root));
        }

        if let Ok(cache_dir) = std::env::var("KILN_CACHE_DIR") {
            self.paths.cache_dir = (!cache_dir.is_empty()).then(|| PathBuf::from(cache_dir));
        }

        if let Ok(arch) = std::env::var("KILN_ARCH") {
            self.repository.arch = Some(arch);
        }

        if let Ok(jobs) = std::env::var("KILN_JOBS") {
            self.general.jobs = jobs.parse().map_err(|_| ConfigError::InvalidValue {
                field: "KILN_JOBS".to_string(),
                value: jobs,
            })?;
        }

        // Whitespace separated, like etc/apk/repositories
        if let Ok(repos) = std::env::var("KILN_REPOSITORIES") {
            self.repository
                .repositories
                .extend(repos.split_whitespace().map(str::to_string));
        }

        if let Ok(value) = std::env::var("KILN_IGNORE_SIGNATURES") {
            self.security.ignore_signatures = parse_bool("KILN_IGNORE_SIGNATURES", value)?;
        }

        Ok(())
    }

    /// Target root, `/` by default
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.paths
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.paths.cache_dir.as_deref()
    }

    /// Explicit worker count, if configured
    #[must_use]
    pub fn jobs(&self) -> Option<usize> {
        (self.general.jobs > 0).then_some(self.general.jobs)
    }

    #[must_use]
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.network.retry_delay)
    }
}

/// apk architecture name of the running host
#[must_use]
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "x86",
        "arm" => "armv7",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

fn parse_bool(field: &str, value: String) -> Result<bool, Error> {
    match value.as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        }
        .into()),
    }
}
