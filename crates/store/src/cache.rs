//! Content-addressed cache of expanded packages

use std::path::{Path, PathBuf};

use kiln_errors::{Error, StorageError};
use kiln_events::{AcquisitionEvent, AppEvent, EventEmitter, EventSender};
use kiln_hash::{hash_file, HashAlgorithm};
use kiln_types::InstallablePackage;
use tokio::fs;

use crate::control::ControlSegment;
use crate::expanded::{ExpandedPackage, Segment};
use crate::names;
use crate::tarfs::DataTree;

/// On-disk cache keyed by control checksum and data hash
///
/// Entries live in `<root>/<first two hex chars of the checksum>/`:
///
/// ```text
/// <hex>.ctl.tar.gz
/// <hex>.sig.tar.gz        (signed packages only)
/// <datahash>.dat.tar.gz
/// <datahash>.dat.tar
/// ```
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
    tx: Option<EventSender>,
}

impl EventEmitter for PackageCache {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl PackageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tx: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subdirectory holding the entry for `pkg`
    #[must_use]
    pub fn cache_dir_for(&self, pkg: &dyn InstallablePackage) -> PathBuf {
        let hex = pkg.checksum().to_hex();
        self.root.join(&hex[..2])
    }

    /// Create the subdirectory for `pkg`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn prepare_dir(&self, pkg: &dyn InstallablePackage) -> Result<PathBuf, Error> {
        let dir = self.cache_dir_for(pkg);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;
        Ok(dir)
    }

    /// Look up a previously adopted entry for `pkg` in `dir`
    ///
    /// Any failure is a miss; the reason is reported as an event.
    pub async fn lookup(&self, pkg: &dyn InstallablePackage, dir: &Path) -> Option<ExpandedPackage> {
        match self.try_lookup(pkg, dir).await {
            Ok(expanded) => {
                self.emit(AppEvent::Acquisition(AcquisitionEvent::CacheHit {
                    package: pkg.name().to_string(),
                    checksum: pkg.checksum().to_string(),
                    cache_dir: dir.to_path_buf(),
                }));
                Some(expanded)
            }
            Err(e) => {
                self.emit(AppEvent::Acquisition(AcquisitionEvent::CacheMiss {
                    package: pkg.name().to_string(),
                    checksum: pkg.checksum().to_string(),
                    reason: e.to_string(),
                }));
                None
            }
        }
    }

    async fn try_lookup(
        &self,
        pkg: &dyn InstallablePackage,
        dir: &Path,
    ) -> Result<ExpandedPackage, Error> {
        let hex = pkg.checksum().to_hex();

        let control_path = dir.join(names::control(&hex));
        let compressed = fs::read(&control_path)
            .await
            .map_err(|e| Error::io_with_path(&e, &control_path))?;
        let control_segment = ControlSegment::from_gz(&compressed)?;
        let data_hash = control_segment.pkginfo().datahash()?.to_ascii_lowercase();

        let data_path = dir.join(names::data(&data_hash));
        let data_size = file_size(&data_path).await?;
        let tar_path = dir.join(names::data_tar(&data_hash));
        file_size(&tar_path).await?;

        let signature_path = dir.join(names::signature(&hex));
        let (signature, signature_hash) = match file_size(&signature_path).await {
            Ok(size) => {
                let hash = kiln_hash::hash_file(&signature_path, HashAlgorithm::Sha1).await?;
                (
                    Some(Segment {
                        path: signature_path,
                        size,
                    }),
                    Some(hash),
                )
            }
            Err(_) => (None, None),
        };

        Ok(ExpandedPackage {
            control: Segment {
                path: control_path,
                size: compressed.len() as u64,
            },
            control_hash: pkg.checksum().clone(),
            control_segment,
            signature,
            signature_hash,
            data: Segment {
                path: data_path,
                size: data_size,
            },
            data_hash,
            tree: DataTree::new(tar_path),
            temp_dir: None,
        })
    }

    /// Move a freshly expanded package into `dir` under its canonical names
    ///
    /// The scratch directory must be on the same filesystem as `dir`.
    ///
    /// # Errors
    ///
    /// Returns `AtomicRenameFailed` if a segment cannot be moved into place.
    pub async fn adopt(&self, expanded: ExpandedPackage, dir: &Path) -> Result<ExpandedPackage, Error> {
        let ExpandedPackage {
            control,
            control_hash,
            control_segment,
            signature,
            signature_hash,
            data,
            data_hash,
            tree,
            temp_dir,
        } = expanded;
        let hex = control_hash.to_hex();

        let control = adopt_segment(control, dir.join(names::control(&hex))).await?;
        let signature = match signature {
            Some(segment) => Some(adopt_segment(segment, dir.join(names::signature(&hex))).await?),
            None => None,
        };
        let data = adopt_segment(data, dir.join(names::data(&data_hash))).await?;
        let tar_path = dir.join(names::data_tar(&data_hash));
        rename_into_place(tree.path(), &tar_path).await?;
        drop(temp_dir);

        self.emit(AppEvent::Acquisition(AcquisitionEvent::Adopted {
            package: control_segment
                .pkginfo()
                .get("pkgname")
                .unwrap_or_default()
                .to_string(),
            cache_dir: dir.to_path_buf(),
        }));

        Ok(ExpandedPackage {
            control,
            control_hash,
            control_segment,
            signature,
            signature_hash,
            data,
            data_hash,
            tree: DataTree::new(tar_path),
            temp_dir: None,
        })
    }
}

async fn file_size(path: &Path) -> Result<u64, Error> {
    let meta = fs::metadata(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    if meta.is_file() {
        Ok(meta.len())
    } else {
        Err(StorageError::InvalidPath {
            path: path.display().to_string(),
        }
        .into())
    }
}

async fn adopt_segment(segment: Segment, dest: PathBuf) -> Result<Segment, Error> {
    rename_into_place(&segment.path, &dest).await?;
    Ok(Segment {
        path: dest,
        size: segment.size,
    })
}

async fn rename_into_place(from: &Path, to: &Path) -> Result<(), Error> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        // Another process adopted the same content first
        Err(_) if same_content(from, to).await => Ok(()),
        Err(e) => Err(StorageError::AtomicRenameFailed {
            message: format!("{} -> {}: {e}", from.display(), to.display()),
        }
        .into()),
    }
}

async fn same_content(a: &Path, b: &Path) -> bool {
    let (Ok(meta_a), Ok(meta_b)) = (fs::metadata(a).await, fs::metadata(b).await) else {
        return false;
    };
    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return false;
    }
    match (
        hash_file(a, HashAlgorithm::Sha256).await,
        hash_file(b, HashAlgorithm::Sha256).await,
    ) {
        (Ok(hash_a), Ok(hash_b)) => hash_a == hash_b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn existing_destination_must_match_byte_for_byte() {
        let dir = TempDir::new().unwrap();
        let write = |name: &str, body: &[u8]| {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            path
        };
        let original = write("a.dat.tar", b"payload");
        let copy = write("b.dat.tar", b"payload");
        let same_size = write("c.dat.tar", b"PAYLOAD");
        let shorter = write("d.dat.tar", b"pay");

        assert!(same_content(&original, &copy).await);
        assert!(!same_content(&original, &same_size).await);
        assert!(!same_content(&original, &shorter).await);
        assert!(!same_content(&original, &dir.path().join("missing")).await);
        assert!(!same_content(&original, dir.path()).await);
    }

    #[tokio::test]
    async fn failed_rename_onto_different_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("segment");
        std::fs::write(&from, b"payload").unwrap();
        let occupied = dir.path().join("occupied");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("entry"), b"x").unwrap();

        let err = rename_into_place(&from, &occupied).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::AtomicRenameFailed { .. })
        ));
    }
}
