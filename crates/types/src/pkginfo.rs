//! `.PKGINFO` control metadata

use crate::Package;
use chrono::DateTime;
use kiln_errors::{Error, PackageError};
use kiln_hash::Checksum;

/// Parsed `key = value` lines of a `.PKGINFO` file.
///
/// Keys may repeat (`depend`, `provides`, ...), so values are kept in
/// file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PkgInfo {
    entries: Vec<(String, String)>,
}

impl PkgInfo {
    /// Parse `.PKGINFO` text
    ///
    /// # Errors
    /// Returns an error for a non-comment line without `=`.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                PackageError::InvalidMetadata {
                    message: format!(".PKGINFO line {}: missing '='", idx + 1),
                }
            })?;
            entries.push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self { entries })
    }

    /// First value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in file order
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The single declared `datahash`.
    ///
    /// # Errors
    /// Returns an error when the key is missing or declared more than once.
    pub fn datahash(&self) -> Result<&str, Error> {
        let mut values = self.all("datahash");
        match (values.next(), values.next()) {
            (Some(value), None) => Ok(value),
            (None, _) => Err(PackageError::InvalidMetadata {
                message: "control segment does not declare a datahash".to_string(),
            }
            .into()),
            (Some(_), Some(_)) => Err(PackageError::InvalidMetadata {
                message: "control segment declares more than one datahash".to_string(),
            }
            .into()),
        }
    }

    /// Build the installed-package record.
    ///
    /// `checksum` is the control segment hash and `size` the archive size.
    ///
    /// # Errors
    /// Returns an error when `pkgname`/`pkgver` are missing or numeric
    /// fields do not parse.
    pub fn to_package(&self, checksum: Checksum, size: u64) -> Result<Package, Error> {
        let required = |key: &str| {
            self.get(key)
                .map(str::to_string)
                .ok_or_else(|| PackageError::InvalidMetadata {
                    message: format!(".PKGINFO is missing {key}"),
                })
        };
        let number = |key: &str| -> Result<Option<i64>, PackageError> {
            self.get(key)
                .map(|v| {
                    v.parse::<i64>().map_err(|e| PackageError::InvalidMetadata {
                        message: format!(".PKGINFO {key} = {v}: {e}"),
                    })
                })
                .transpose()
        };
        let text = |key: &str| self.get(key).unwrap_or_default().to_string();
        let list = |key: &str| -> Vec<String> {
            self.all(key)
                .flat_map(str::split_whitespace)
                .map(str::to_string)
                .collect()
        };

        let build_time = number("builddate")?.and_then(|secs| DateTime::from_timestamp(secs, 0));
        let installed_size = number("size")?.map_or(0, |n| u64::try_from(n).unwrap_or(0));

        Ok(Package {
            name: required("pkgname")?,
            version: required("pkgver")?,
            arch: text("arch"),
            description: text("pkgdesc"),
            url: text("url"),
            license: text("license"),
            origin: text("origin"),
            maintainer: text("maintainer"),
            commit: text("commit"),
            build_time,
            installed_size,
            size,
            checksum,
            dependencies: list("depend"),
            provides: list("provides"),
            replaces: list("replaces"),
            triggers: list("triggers"),
            datahash: self.get("datahash").map(str::to_string),
        })
    }
}
