//! Reconciling the legacy `lib/apk` location with `usr/lib/apk`

use std::io;
use std::path::{Component, Path, PathBuf};

use kiln_config::constants::{LEGACY_APK_DIR, LEGACY_APK_LINK_TARGET};
use kiln_errors::{Error, OpsError};
use kiln_platform::{FileKind, TargetFs};

const LIB_DIR: &str = "lib";

/// What [`resolve_db_location`] found or did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbLocation {
    /// `lib` is a link to `/usr/lib`, so `lib/apk` already is the database
    LibLinked,
    /// `lib/apk` already links to `/usr/lib/apk`
    AlreadyLinked,
    /// The link was created after removing `removed` empty directories
    Linked { removed: usize },
}

impl DbLocation {
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::LibLinked => "lib-linked",
            Self::AlreadyLinked => "already-linked",
            Self::Linked { .. } => "linked",
        }
    }
}

fn location_error(path: impl Into<String>, reason: impl Into<String>) -> Error {
    OpsError::DatabaseLocation {
        path: path.into(),
        reason: reason.into(),
    }
    .into()
}

/// Make `lib/apk` resolve to the database under `usr/lib/apk`
///
/// Nothing changes when `lib` links to `/usr/lib` or `lib/apk` already
/// links to `/usr/lib/apk`. Otherwise `lib` is created if missing, a
/// `lib/apk` directory holding only empty directories is removed, and
/// `lib/apk` becomes a link to `../usr/lib/apk`.
///
/// # Errors
///
/// Returns `DatabaseLocation` if `lib/apk` holds a file or a non-empty
/// directory, or exists as something other than a directory; returns an
/// I/O error if the root cannot be read or changed.
pub fn resolve_db_location(fs: &dyn TargetFs) -> Result<DbLocation, Error> {
    if links_to(fs, LIB_DIR, "/usr/lib") {
        return Ok(DbLocation::LibLinked);
    }
    if links_to(fs, LEGACY_APK_DIR, "/usr/lib/apk") {
        return Ok(DbLocation::AlreadyLinked);
    }

    let lib = Path::new(LIB_DIR);
    if !fs.exists(lib) {
        fs.create_dir(lib, 0o755)
            .map_err(|e| Error::io_with_path(&e, lib))?;
    }

    let legacy = Path::new(LEGACY_APK_DIR);
    let removed = match fs.symlink_metadata(legacy) {
        Ok(meta) if meta.is_dir() => remove_empty_tree(fs, legacy)?,
        Ok(_) => {
            return Err(location_error(
                LEGACY_APK_DIR,
                "exists and is not a directory",
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(Error::io_with_path(&e, legacy)),
    };

    fs.symlink(Path::new(LEGACY_APK_LINK_TARGET), legacy)
        .map_err(|e| Error::io_with_path(&e, legacy))?;
    Ok(DbLocation::Linked { removed })
}

/// Whether `path` is a symlink whose target, taken from `/`, is `want`
fn links_to(fs: &dyn TargetFs, path: &str, want: &str) -> bool {
    fs.read_link(Path::new(path))
        .is_ok_and(|target| clean_from_root(&target) == Path::new(want))
}

/// Lexically resolve `target` as if it were relative to `/`
fn clean_from_root(target: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in target.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Remove `dir` and its children, which must all be empty directories
///
/// Nothing is removed unless every child qualifies.
fn remove_empty_tree(fs: &dyn TargetFs, dir: &Path) -> Result<usize, Error> {
    let children = fs
        .read_dir(dir)
        .map_err(|e| Error::io_with_path(&e, dir))?;

    for child in &children {
        let path = dir.join(&child.name);
        if child.kind != FileKind::Directory {
            return Err(location_error(
                path.display().to_string(),
                "contains a file",
            ));
        }
        let grandchildren = fs
            .read_dir(&path)
            .map_err(|e| Error::io_with_path(&e, &path))?;
        if !grandchildren.is_empty() {
            return Err(location_error(
                path.display().to_string(),
                "directory is not empty",
            ));
        }
    }

    for child in &children {
        let path = dir.join(&child.name);
        fs.remove_dir(&path)
            .map_err(|e| Error::io_with_path(&e, &path))?;
    }
    fs.remove_dir(dir)
        .map_err(|e| Error::io_with_path(&e, dir))?;
    Ok(children.len())
}
