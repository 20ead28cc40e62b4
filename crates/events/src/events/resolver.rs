use serde::{Deserialize, Serialize};

/// Resolver domain events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResolverEvent {
    ResolutionStarted {
        world: Vec<String>,
        repositories: usize,
        sibling_arches: Vec<String>,
    },

    ResolutionCompleted {
        packages: Vec<String>,
        conflicts: Vec<String>,
    },

    /// Candidate dropped because a sibling architecture lacks it
    PackageExcluded {
        package: String,
        missing_arch: String,
    },

    IndexLoaded {
        url: String,
        packages: usize,
    },
}
