//! `etc/apk/world` and `etc/apk/repositories`

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use kiln_config::constants::{REPOSITORIES_FILE, WORLD_FILE};
use kiln_errors::{Error, StateError};
use kiln_platform::TargetFs;

use crate::io_error;

fn read_lines(fs: &dyn TargetFs, path: &'static str) -> Result<Vec<String>, Error> {
    match fs.read(Path::new(path)) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// World constraints, in file order
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_world(fs: &dyn TargetFs) -> Result<Vec<String>, Error> {
    Ok(read_lines(fs, WORLD_FILE)?
        .iter()
        .flat_map(|line| line.split_whitespace())
        .map(str::to_string)
        .collect())
}

/// Replace the world with `names`, sorted and deduplicated
///
/// # Errors
///
/// Returns `InvalidWorld` for names containing whitespace, or an I/O
/// error if the file cannot be written.
pub fn write_world(fs: &dyn TargetFs, names: &[String]) -> Result<(), Error> {
    if let Some(bad) = names
        .iter()
        .find(|name| name.is_empty() || name.contains(char::is_whitespace))
    {
        return Err(StateError::InvalidWorld {
            message: format!("invalid world entry {bad:?}"),
        }
        .into());
    }
    let names: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let mut contents = names.into_iter().collect::<Vec<_>>().join("\n");
    contents.push('\n');
    fs.write(Path::new(WORLD_FILE), contents.as_bytes(), 0o644)
        .map_err(io_error(WORLD_FILE))
}

/// Add `names` to the world and return the resulting list
///
/// # Errors
///
/// Returns an error if the world cannot be read or written.
pub fn add_to_world(fs: &dyn TargetFs, names: &[String]) -> Result<Vec<String>, Error> {
    let mut world = read_world(fs)?;
    world.extend(names.iter().cloned());
    world.sort();
    world.dedup();
    write_world(fs, &world)?;
    Ok(world)
}

/// Configured repositories, skipping blank lines and comments
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_repositories(fs: &dyn TargetFs) -> Result<Vec<String>, Error> {
    read_lines(fs, REPOSITORIES_FILE)
}

/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_repositories(fs: &dyn TargetFs, repositories: &[String]) -> Result<(), Error> {
    let mut contents = repositories.join("\n");
    contents.push('\n');
    fs.write(Path::new(REPOSITORIES_FILE), contents.as_bytes(), 0o644)
        .map_err(io_error(REPOSITORIES_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_platform::MemFs;

    fn root() -> MemFs {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("etc/apk"), 0o755).unwrap();
        fs
    }

    #[test]
    fn world_is_sorted_and_deduplicated() {
        let fs = root();
        assert!(read_world(&fs).unwrap().is_empty());

        write_world(&fs, &["zlib".into(), "busybox".into(), "zlib".into()]).unwrap();
        assert_eq!(fs.read(Path::new(WORLD_FILE)).unwrap(), b"busybox\nzlib\n");

        let world = add_to_world(&fs, &["alpine-base".into(), "busybox".into()]).unwrap();
        assert_eq!(world, vec!["alpine-base", "busybox", "zlib"]);
        assert_eq!(read_world(&fs).unwrap(), world);
    }

    #[test]
    fn world_rejects_entries_with_whitespace() {
        let fs = root();
        let err = write_world(&fs, &["two words".into()]).unwrap_err();
        assert!(matches!(err, Error::State(StateError::InvalidWorld { .. })));
    }

    #[test]
    fn repositories_skip_comments() {
        let fs = root();
        fs.write(
            Path::new(REPOSITORIES_FILE),
            b"# main\nhttps://dl.example.org/main\n\n/srv/local\n",
            0o644,
        )
        .unwrap();
        assert_eq!(
            read_repositories(&fs).unwrap(),
            vec!["https://dl.example.org/main", "/srv/local"]
        );

        write_repositories(&fs, &["/srv/other".into()]).unwrap();
        assert_eq!(read_repositories(&fs).unwrap(), vec!["/srv/other"]);
    }
}
