//! Package-related type definitions

use chrono::{DateTime, Utc};
use kiln_hash::Checksum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    /// Create a new package ID
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// Installed-package metadata record.
///
/// Built from the `.PKGINFO` of an expanded control segment, which is more
/// complete than what a repository index carries. Never mutated once the
/// package has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub description: String,
    pub url: String,
    pub license: String,
    pub origin: String,
    pub maintainer: String,
    pub commit: String,
    pub build_time: Option<DateTime<Utc>>,
    /// Size of the unpacked payload as declared by the package
    pub installed_size: u64,
    /// Size of the archive segments on disk
    pub size: u64,
    /// Checksum of the control segment; the package identity
    pub checksum: Checksum,
    pub dependencies: Vec<String>,
    pub provides: Vec<String>,
    pub replaces: Vec<String>,
    pub triggers: Vec<String>,
    pub datahash: Option<String>,
}

impl Package {
    #[must_use]
    pub fn id(&self) -> PackageId {
        PackageId::new(&self.name, &self.version)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A single dependency atom such as `so:libc.so.1`, `busybox>=1.36` or `!foo`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Version constraint including its operator, e.g. `>=1.36`
    pub constraint: Option<String>,
    /// `!name` atoms forbid the named package instead of requiring it
    pub conflict: bool,
}

impl Dependency {
    /// Parse one whitespace-free dependency atom
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        let (conflict, rest) = match atom.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, atom),
        };
        let split = rest.find(['<', '>', '=', '~']).unwrap_or(rest.len());
        let (name, constraint) = rest.split_at(split);
        Self {
            name: name.to_string(),
            constraint: (!constraint.is_empty()).then(|| constraint.to_string()),
            conflict,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflict {
            f.write_str("!")?;
        }
        f.write_str(&self.name)?;
        if let Some(constraint) = &self.constraint {
            f.write_str(constraint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_dependency_atoms() {
        let dep = Dependency::parse("busybox>=1.36.1-r0");
        assert_eq!(dep.name, "busybox");
        assert_eq!(dep.constraint.as_deref(), Some(">=1.36.1-r0"));
        assert!(!dep.conflict);

        let dep = Dependency::parse("so:libc.musl-x86_64.so.1");
        assert_eq!(dep.name, "so:libc.musl-x86_64.so.1");
        assert_eq!(dep.constraint, None);

        let dep = Dependency::parse("!openssl-dev");
        assert!(dep.conflict);
        assert_eq!(dep.name, "openssl-dev");
    }

    proptest! {
        #[test]
        fn dependency_display_round_trips(
            name in "[a-z][a-z0-9.+_-]{0,12}",
            constraint in proptest::option::of("(>=|<|=|~)[0-9][0-9.]{0,5}"),
            conflict in any::<bool>(),
        ) {
            let dep = Dependency { name, constraint, conflict };
            prop_assert_eq!(Dependency::parse(&dep.to_string()), dep);
        }
    }
}
