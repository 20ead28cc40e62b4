//! Configuration sections

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal color handling for CLI output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    #[default]
    Auto,
    Never,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Expansion workers; 0 derives the count from available parallelism
    #[serde(default)]
    pub jobs: usize,
    #[serde(default)]
    pub color: ColorChoice,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            color: ColorChoice::Auto,
        }
    }
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Target root; defaults to `/`
    pub root: Option<PathBuf>,
    /// Expanded-package cache; no cache when unset
    pub cache_dir: Option<PathBuf>,
}

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepositoryConfig {
    /// Repositories used in addition to `etc/apk/repositories`
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Primary architecture; defaults to `etc/apk/arch` or the host
    pub arch: Option<String>,
    /// Architectures whose indexes disqualify packages missing there
    #[serde(default)]
    pub sibling_arches: Vec<String>,
    /// World entries used instead of `etc/apk/world` when non-empty
    #[serde(default)]
    pub world: Vec<String>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // milliseconds
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            user_agent: default_user_agent(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Accept archives without checking their signature segment
    #[serde(default = "default_ignore_signatures")]
    pub ignore_signatures: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            ignore_signatures: default_ignore_signatures(),
        }
    }
}

// Default value functions for serde
fn default_timeout() -> u64 {
    300
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    500
}

fn default_user_agent() -> String {
    format!("kiln/{}", env!("CARGO_PKG_VERSION"))
}

// Signature verification is not implemented; trusting indexes is the only mode.
fn default_ignore_signatures() -> bool {
    true
}
