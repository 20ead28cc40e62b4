//! Writing a package's data tree into the target root

use std::path::Path;

use kiln_errors::{Error, InstallError, PackageError};
use kiln_platform::{TargetFs, WriteHeader};
use kiln_resources::CancelScope;
use kiln_store::{DataEntry, DataTree, ExpandedPackage};
use kiln_types::{EntryKind, FileHeader};

const DEFAULT_DIR_MODE: u32 = 0o755;

/// Install every entry of `expanded`, in archive order
///
/// Uses the target's lazy [`WriteHeader`] capability when it has one and
/// falls back to copying for anything it declines. Returns the headers of
/// every entry written.
pub(crate) fn apply_data(
    fs: &dyn TargetFs,
    expanded: &ExpandedPackage,
    scope: &CancelScope,
) -> Result<Vec<FileHeader>, Error> {
    let tree = expanded.data();
    let entries = tree.entries()?;
    let lazy = fs.header_writer();

    let mut installed = Vec::with_capacity(entries.len());
    for entry in entries {
        scope.check()?;
        ensure_parent(fs, &entry.header)?;

        let handled = match lazy {
            Some(writer) => write_lazily(writer, tree, entry)?,
            None => false,
        };
        if !handled {
            copy_entry(fs, tree, entry)?;
        }
        installed.push(entry.header.clone());
    }
    Ok(installed)
}

fn write_lazily(writer: &dyn WriteHeader, tree: &DataTree, entry: &DataEntry) -> Result<bool, Error> {
    let header = &entry.header;
    let source = (header.kind == EntryKind::File).then(|| tree.content_source(entry));
    writer
        .write_header(header, source.as_ref())
        .map_err(|e| InstallError::filesystem("write_header", &header.path, &e).into())
}

/// Streaming fallback: directories, file contents and links written one by one
fn copy_entry(fs: &dyn TargetFs, tree: &DataTree, entry: &DataEntry) -> Result<(), Error> {
    let header = &entry.header;
    let path = Path::new(&header.path);
    let fs_error = |op: &str, e: &std::io::Error| -> Error {
        InstallError::filesystem(op, &header.path, e).into()
    };

    match header.kind {
        EntryKind::Directory => match fs.symlink_metadata(path) {
            // An existing symlink (lib -> usr/lib) stands in for the directory
            Ok(meta) if meta.is_dir() || meta.is_symlink() => Ok(()),
            Ok(_) => Err(fs_error(
                "mkdir",
                &std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            )),
            Err(_) => fs
                .create_dir_all(path, header.mode)
                .map_err(|e| fs_error("mkdir", &e)),
        },
        EntryKind::File => {
            let mut contents = tree.open_entry(entry)?;
            fs.write_from(path, &mut contents, header.mode)
                .map(|_| ())
                .map_err(|e| fs_error("write", &e))
        }
        EntryKind::Symlink => {
            let target = link_target(header)?;
            fs.symlink(Path::new(target), path)
                .map_err(|e| fs_error("symlink", &e))
        }
        EntryKind::Hardlink => {
            let target = link_target(header)?;
            let original = target.trim_start_matches("./").trim_start_matches('/');
            fs.hard_link(Path::new(original), path)
                .map_err(|e| fs_error("link", &e))
        }
    }
}

fn link_target(header: &FileHeader) -> Result<&str, Error> {
    header.link_target.as_deref().ok_or_else(|| {
        PackageError::Corrupted {
            message: format!("link {} has no target", header.path),
        }
        .into()
    })
}

/// Archives normally list directories first; create any that are missing.
fn ensure_parent(fs: &dyn TargetFs, header: &FileHeader) -> Result<(), Error> {
    let parent = header.parent();
    if parent.is_empty() || fs.exists(Path::new(parent)) {
        return Ok(());
    }
    fs.create_dir_all(Path::new(parent), DEFAULT_DIR_MODE)
        .map_err(|e| InstallError::filesystem("mkdir", parent, &e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_platform::{DirFs, MemFs};
    use kiln_store::{expand_archive, scratch_dir, PackageBuilder};
    use tempfile::TempDir;

    fn expanded(workdir: &Path) -> ExpandedPackage {
        let archive = workdir.join("hello-1.0-r0.apk");
        PackageBuilder::new("hello", "1.0-r0")
            .dir("usr", 0o755)
            .dir("usr/bin", 0o755)
            .file("usr/bin/hello", 0o755, b"#!/bin/sh\necho hello\n")
            .symlink("usr/bin/hi", "hello")
            .hardlink("usr/bin/hey", "usr/bin/hello")
            .file("etc/hello.conf", 0o600, b"greeting=hi\n")
            .write_to(&archive)
            .unwrap();
        let temp = scratch_dir(workdir).unwrap();
        expand_archive(&archive, temp, &CancelScope::new()).unwrap()
    }

    #[test]
    fn streaming_copy_writes_every_entry() {
        let work = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let expanded = expanded(work.path());
        let fs = DirFs::new(root.path());

        let headers = apply_data(&fs, &expanded, &CancelScope::new()).unwrap();
        assert_eq!(headers.len(), 6);
        assert_eq!(
            std::fs::read(root.path().join("usr/bin/hey")).unwrap(),
            b"#!/bin/sh\necho hello\n"
        );
        assert_eq!(
            std::fs::read_link(root.path().join("usr/bin/hi")).unwrap(),
            Path::new("hello")
        );
        // parent created on demand
        assert!(root.path().join("etc").is_dir());
        let meta = fs.symlink_metadata(Path::new("etc/hello.conf")).unwrap();
        assert_eq!(meta.mode, 0o600);
    }

    #[test]
    fn lazy_target_keeps_references() {
        let work = TempDir::new().unwrap();
        let expanded = expanded(work.path());
        let fs = MemFs::new();

        apply_data(&fs, &expanded, &CancelScope::new()).unwrap();
        assert!(fs.is_lazy(Path::new("usr/bin/hello")).unwrap());
        // hard links share the original's reference
        assert!(fs.is_lazy(Path::new("usr/bin/hey")).unwrap());
        assert_eq!(fs.read(Path::new("etc/hello.conf")).unwrap(), b"greeting=hi\n");
        assert!(fs.symlink_metadata(Path::new("usr/bin/hi")).unwrap().is_symlink());
    }

    #[test]
    fn cancelled_scope_stops_before_writing() {
        let work = TempDir::new().unwrap();
        let expanded = expanded(work.path());
        let fs = MemFs::new();
        let scope = CancelScope::new();
        scope.cancel();

        let err = apply_data(&fs, &expanded, &scope).unwrap_err();
        assert!(err.is_cancelled());
        assert!(!fs.exists(Path::new("usr")));
    }
}
