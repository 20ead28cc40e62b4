//! `usr/lib/apk/db/triggers`

use std::io;
use std::path::Path;
use std::sync::Arc;

use kiln_config::constants::TRIGGERS_FILE;
use kiln_errors::{Error, StateError};
use kiln_hash::Checksum;
use kiln_platform::TargetFs;
use kiln_types::Package;

use crate::io_error;

/// Registry of trigger paths, one line per package:
/// `Q1<b64> <path> <path>...`
#[derive(Debug, Clone)]
pub struct TriggerRegistry {
    fs: Arc<dyn TargetFs>,
}

impl TriggerRegistry {
    pub fn new(fs: Arc<dyn TargetFs>) -> Self {
        Self { fs }
    }

    /// Record the trigger paths of `package`, if it declares any
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be written.
    pub fn append(&self, package: &Package) -> Result<bool, Error> {
        if package.triggers.is_empty() {
            return Ok(false);
        }
        let line = format!("{} {}\n", package.checksum, package.triggers.join(" "));
        self.fs
            .append(Path::new(TRIGGERS_FILE), line.as_bytes())
            .map_err(io_error(TRIGGERS_FILE))?;
        Ok(true)
    }

    /// Every registered package checksum with its trigger paths
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or a line is
    /// malformed.
    pub fn read(&self) -> Result<Vec<(Checksum, Vec<String>)>, Error> {
        let bytes = match self.fs.read(Path::new(TRIGGERS_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(TRIGGERS_FILE)(e)),
        };
        String::from_utf8_lossy(&bytes)
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| -> Result<_, Error> {
                let mut fields = line.split_whitespace();
                let checksum = fields
                    .next()
                    .map(Checksum::parse)
                    .transpose()
                    .ok()
                    .flatten()
                    .ok_or_else(|| StateError::Corrupted {
                        line: idx + 1,
                        message: "trigger line without a checksum".to_string(),
                    })?;
                Ok((checksum, fields.map(str::to_string).collect()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_hash::{digest, HashAlgorithm};
    use kiln_platform::MemFs;

    #[test]
    fn only_packages_with_triggers_are_recorded() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("usr/lib/apk/db"), 0o755)
            .unwrap();
        let registry = TriggerRegistry::new(Arc::new(fs));

        let mut pkg = Package {
            name: "mkinitfs".into(),
            version: "3.9-r0".into(),
            arch: "x86_64".into(),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            origin: String::new(),
            maintainer: String::new(),
            commit: String::new(),
            build_time: None,
            installed_size: 0,
            size: 0,
            checksum: digest(HashAlgorithm::Sha1, b"mkinitfs"),
            dependencies: vec![],
            provides: vec![],
            replaces: vec![],
            triggers: vec![],
            datahash: None,
        };
        assert!(!registry.append(&pkg).unwrap());
        assert!(registry.read().unwrap().is_empty());

        pkg.triggers = vec!["/usr/share/kernel/*".into(), "/lib/modules/*".into()];
        assert!(registry.append(&pkg).unwrap());

        let recorded = registry.read().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, pkg.checksum);
        assert_eq!(recorded[0].1, pkg.triggers);
    }
}
