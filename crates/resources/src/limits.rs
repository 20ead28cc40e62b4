//! Resource limit configuration

use serde::{Deserialize, Serialize};

/// Resource limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of packages fetched and expanded at once
    pub concurrent_expansions: usize,
}

impl ResourceLimits {
    /// Limits derived from the host: one expansion worker per core plus one,
    /// so a worker blocked on the network does not idle a core.
    #[must_use]
    pub fn from_system() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1);

        Self {
            concurrent_expansions: cpu_count + 1,
        }
    }

    /// Explicit worker count, falling back to [`ResourceLimits::from_system`]
    #[must_use]
    pub fn from_jobs(jobs: Option<usize>) -> Self {
        match jobs {
            Some(jobs) if jobs > 0 => Self {
                concurrent_expansions: jobs,
            },
            _ => Self::from_system(),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from_system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_limits_exceed_core_count() {
        let cores = std::thread::available_parallelism().unwrap().get();
        assert_eq!(ResourceLimits::from_system().concurrent_expansions, cores + 1);
    }

    #[test]
    fn zero_jobs_means_auto() {
        assert_eq!(ResourceLimits::from_jobs(Some(0)), ResourceLimits::from_system());
        assert_eq!(ResourceLimits::from_jobs(Some(3)).concurrent_expansions, 3);
    }
}
