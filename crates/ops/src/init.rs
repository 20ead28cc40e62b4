//! Root initialization

use std::io;
use std::path::Path;
use std::sync::Arc;

use kiln_config::constants::{ARCH_FILE, INIT_DIRECTORIES, INIT_FILES};
use kiln_errors::{Error, OpsError};
use kiln_platform::TargetFs;
use kiln_state::{write_repositories, write_world, ScriptsArchive};

use crate::{blocking, OpsCtx};

/// Lay out an empty package database in the context's root
///
/// Creates the apk directory skeleton and empty database files, records
/// the context's architecture, and writes `repositories` and `world`
/// when given. Existing directories are kept; database files are reset.
///
/// # Errors
///
/// Returns `InitializationFailed` if a skeleton path exists as something
/// other than a directory, or an I/O error if a write fails.
pub async fn init_db(
    ctx: &OpsCtx,
    repositories: &[String],
    world: &[String],
) -> Result<(), Error> {
    let fs = Arc::clone(&ctx.fs);
    let arch = ctx.arch.clone();
    let repositories = repositories.to_vec();
    let world = world.to_vec();
    ctx.with_operation("init", || {
        blocking(move || initialize(fs, &arch, &repositories, &world))
    })
    .await
}

fn initialize(
    fs: Arc<dyn TargetFs>,
    arch: &str,
    repositories: &[String],
    world: &[String],
) -> Result<(), Error> {
    for (dir, mode) in INIT_DIRECTORIES {
        create_dir(fs.as_ref(), dir, *mode)?;
    }
    for (path, mode, contents) in INIT_FILES {
        fs.write(Path::new(path), contents, *mode)
            .map_err(|e| Error::io_with_path(&e, Path::new(path)))?;
    }
    fs.write(Path::new(ARCH_FILE), format!("{arch}\n").as_bytes(), 0o644)
        .map_err(|e| Error::io_with_path(&e, Path::new(ARCH_FILE)))?;

    if !repositories.is_empty() {
        write_repositories(fs.as_ref(), repositories)?;
    }
    if !world.is_empty() {
        write_world(fs.as_ref(), world)?;
    }
    ScriptsArchive::new(fs).initialize()
}

fn create_dir(fs: &dyn TargetFs, dir: &str, mode: u32) -> Result<(), Error> {
    let path = Path::new(dir);
    match fs.create_dir(path, mode) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            // usr/lib may be provided by a link, as on merged-usr roots
            let meta = fs
                .symlink_metadata(path)
                .map_err(|e| Error::io_with_path(&e, path))?;
            if meta.is_dir() || meta.is_symlink() {
                Ok(())
            } else {
                Err(OpsError::InitializationFailed {
                    message: format!("{dir} exists and is not a directory"),
                }
                .into())
            }
        }
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::constants::{INSTALLED_DB, REPOSITORIES_FILE, SCRIPTS_TAR, WORLD_FILE};
    use kiln_platform::MemFs;
    use kiln_state::{read_repositories, read_world};

    use crate::OpsContextBuilder;

    fn context(fs: Arc<MemFs>) -> OpsCtx {
        let (tx, _rx) = kiln_events::channel();
        OpsContextBuilder::new()
            .with_fs(fs)
            .with_arch("aarch64")
            .with_event_sender(tx)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn creates_skeleton_and_records_arch() {
        let fs = Arc::new(MemFs::new());
        let ctx = context(fs.clone());
        init_db(
            &ctx,
            &["https://dl.example.org/v3.20/main".to_string()],
            &["busybox".to_string(), "alpine-baselayout".to_string()],
        )
        .await
        .unwrap();

        for (dir, _) in INIT_DIRECTORIES {
            assert!(fs.symlink_metadata(Path::new(dir)).unwrap().is_dir(), "{dir}");
        }
        assert_eq!(fs.read(Path::new(ARCH_FILE)).unwrap(), b"aarch64\n");
        assert!(fs.read(Path::new(INSTALLED_DB)).unwrap().is_empty());
        assert_eq!(fs.read(Path::new(SCRIPTS_TAR)).unwrap().len(), 1024);
        assert_eq!(
            read_repositories(fs.as_ref()).unwrap(),
            vec!["https://dl.example.org/v3.20/main"]
        );
        assert_eq!(
            read_world(fs.as_ref()).unwrap(),
            vec!["alpine-baselayout", "busybox"]
        );
    }

    #[tokio::test]
    async fn reinit_keeps_directories_and_resets_files() {
        let fs = Arc::new(MemFs::new());
        let ctx = context(fs.clone());
        init_db(&ctx, &[], &["busybox".to_string()]).await.unwrap();
        fs.write(Path::new("etc/apk/keys/dev.rsa.pub"), b"key", 0o644)
            .unwrap();

        init_db(&ctx, &[], &[]).await.unwrap();
        assert_eq!(fs.read(Path::new(WORLD_FILE)).unwrap(), b"\n");
        assert_eq!(fs.read(Path::new(REPOSITORIES_FILE)).unwrap(), b"\n");
        assert!(fs.exists(Path::new("etc/apk/keys/dev.rsa.pub")));
    }

    #[tokio::test]
    async fn file_in_place_of_directory_fails() {
        let fs = Arc::new(MemFs::new());
        fs.write(Path::new("var"), b"", 0o644).unwrap();
        let ctx = context(fs);

        let err = init_db(&ctx, &[], &[]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Ops(OpsError::InitializationFailed { .. })
        ));
    }
}
