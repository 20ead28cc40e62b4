//! An in-memory target root

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kiln_types::{EntryKind, FileHeader};

use crate::filesystem::{
    relative, ContentSource, DirEntry, FileKind, FsMetadata, TargetFs, WriteHeader,
};

#[derive(Debug, Clone)]
enum Content {
    Inline(Arc<Vec<u8>>),
    Lazy(ContentSource),
}

impl Content {
    fn len(&self) -> u64 {
        match self {
            Self::Inline(data) => data.len() as u64,
            Self::Lazy(source) => source.size,
        }
    }

    fn bytes(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Inline(data) => Ok(data.as_ref().clone()),
            Self::Lazy(source) => source.read(),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir { mode: u32 },
    File { mode: u32, content: Content },
    Symlink { target: PathBuf },
}

impl Node {
    fn metadata(&self) -> FsMetadata {
        match self {
            Self::Dir { mode } => FsMetadata {
                kind: FileKind::Directory,
                mode: *mode,
                size: 0,
            },
            Self::File { mode, content } => FsMetadata {
                kind: FileKind::File,
                mode: *mode,
                size: content.len(),
            },
            Self::Symlink { target } => FsMetadata {
                kind: FileKind::Symlink,
                mode: 0o777,
                size: target.as_os_str().len() as u64,
            },
        }
    }
}

/// A filesystem tree held in memory
///
/// Regular files installed through [`WriteHeader`] are kept as references
/// into the expanded data tarball and only read when asked for.
#[derive(Debug, Default)]
pub struct MemFs {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, path.display().to_string())
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, path.display().to_string())
}

fn poisoned() -> io::Error {
    io::Error::other("memfs lock poisoned")
}

impl MemFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_nodes(&self) -> io::Result<RwLockReadGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes.read().map_err(|_| poisoned())
    }

    fn write_nodes(&self) -> io::Result<RwLockWriteGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes.write().map_err(|_| poisoned())
    }

    /// Whether `path` is backed by a lazy reference rather than copied bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist.
    pub fn is_lazy(&self, path: &Path) -> io::Result<bool> {
        let path = relative(path)?;
        match self.read_nodes()?.get(&path) {
            Some(Node::File {
                content: Content::Lazy(_),
                ..
            }) => Ok(true),
            Some(_) => Ok(false),
            None => Err(not_found(&path)),
        }
    }

    fn require_parent(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
        match path.parent() {
            None => Ok(()),
            Some(parent) if parent.as_os_str().is_empty() => Ok(()),
            Some(parent) => match nodes.get(parent) {
                Some(Node::Dir { .. }) => Ok(()),
                Some(_) => Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    parent.display().to_string(),
                )),
                None => Err(not_found(parent)),
            },
        }
    }

    /// Insert a non-directory node, replacing any non-directory already there
    fn place(&self, path: &Path, node: Node) -> io::Result<()> {
        let path = relative(path)?;
        let mut nodes = self.write_nodes()?;
        Self::require_parent(&nodes, &path)?;
        if let Some(Node::Dir { .. }) = nodes.get(&path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                path.display().to_string(),
            ));
        }
        nodes.insert(path, node);
        Ok(())
    }
}

impl TargetFs for MemFs {
    fn symlink_metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let path = relative(path)?;
        if path.as_os_str().is_empty() {
            return Ok(Node::Dir { mode: 0o755 }.metadata());
        }
        self.read_nodes()?
            .get(&path)
            .map(Node::metadata)
            .ok_or_else(|| not_found(&path))
    }

    fn create_dir(&self, path: &Path, mode: u32) -> io::Result<()> {
        let path = relative(path)?;
        let mut nodes = self.write_nodes()?;
        if path.as_os_str().is_empty() || nodes.contains_key(&path) {
            return Err(already_exists(&path));
        }
        Self::require_parent(&nodes, &path)?;
        nodes.insert(path, Node::Dir { mode });
        Ok(())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let path = relative(path)?;
        let mut nodes = self.write_nodes()?;
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            match nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        current.display().to_string(),
                    ));
                }
                None => {
                    nodes.insert(current.clone(), Node::Dir { mode });
                }
            }
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = relative(path)?;
        let content = match self.read_nodes()?.get(&path) {
            Some(Node::File { content, .. }) => content.clone(),
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a regular file: {}", path.display()),
                ));
            }
            None => return Err(not_found(&path)),
        };
        // Lazy content is read without holding the lock
        content.bytes()
    }

    fn write(&self, path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        self.place(
            path,
            Node::File {
                mode,
                content: Content::Inline(Arc::new(contents.to_vec())),
            },
        )
    }

    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let rel = relative(path)?;
        let existing = match self.read_nodes()?.get(&rel) {
            Some(Node::File { mode, content }) => Some((*mode, content.clone())),
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a regular file: {}", rel.display()),
                ));
            }
            None => None,
        };
        let (mode, mut data) = match existing {
            Some((mode, content)) => (mode, content.bytes()?),
            None => (0o644, Vec::new()),
        };
        data.extend_from_slice(contents);
        self.write(&rel, &data, mode)
    }

    fn write_from(&self, path: &Path, reader: &mut dyn Read, mode: u32) -> io::Result<u64> {
        let mut data = Vec::new();
        let written = reader.read_to_end(&mut data)? as u64;
        self.write(path, &data, mode)?;
        Ok(written)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.place(
            link,
            Node::Symlink {
                target: target.to_path_buf(),
            },
        )
    }

    fn hard_link(&self, original: &Path, link: &Path) -> io::Result<()> {
        let original = relative(original)?;
        let node = match self.read_nodes()?.get(&original) {
            Some(node @ Node::File { .. }) => node.clone(),
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot hard link {}", original.display()),
                ));
            }
            None => return Err(not_found(&original)),
        };
        self.place(link, node)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let path = relative(path)?;
        match self.read_nodes()?.get(&path) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a symlink: {}", path.display()),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let path = relative(path)?;
        let nodes = self.read_nodes()?;
        if !path.as_os_str().is_empty() {
            match nodes.get(&path) {
                Some(Node::Dir { .. }) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        path.display().to_string(),
                    ));
                }
                None => return Err(not_found(&path)),
            }
        }
        // BTreeMap iteration keeps the listing sorted
        Ok(nodes
            .iter()
            .filter(|(child, _)| child.parent() == Some(path.as_path()))
            .filter_map(|(child, node)| {
                let name = child.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    kind: node.metadata().kind,
                })
            })
            .collect())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = relative(path)?;
        let mut nodes = self.write_nodes()?;
        match nodes.get(&path) {
            Some(Node::Dir { .. }) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                path.display().to_string(),
            )),
            Some(_) => {
                nodes.remove(&path);
                Ok(())
            }
            None => Err(not_found(&path)),
        }
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let path = relative(path)?;
        let mut nodes = self.write_nodes()?;
        match nodes.get(&path) {
            Some(Node::Dir { .. }) => {
                if nodes.keys().any(|child| child.parent() == Some(path.as_path())) {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        path.display().to_string(),
                    ));
                }
                nodes.remove(&path);
                Ok(())
            }
            Some(_) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                path.display().to_string(),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn header_writer(&self) -> Option<&dyn WriteHeader> {
        Some(self)
    }
}

impl WriteHeader for MemFs {
    fn write_header(
        &self,
        header: &FileHeader,
        source: Option<&ContentSource>,
    ) -> io::Result<bool> {
        let path = Path::new(&header.path);
        match header.kind {
            EntryKind::Directory => match self.symlink_metadata(path) {
                Ok(meta) if meta.is_dir() => Ok(true),
                _ => self.create_dir_all(path, header.mode).map(|()| true),
            },
            EntryKind::File => match source {
                Some(source) => self
                    .place(
                        path,
                        Node::File {
                            mode: header.mode,
                            content: Content::Lazy(source.clone()),
                        },
                    )
                    .map(|()| true),
                None => Ok(false),
            },
            // Links are cheap; let the caller create them
            EntryKind::Symlink | EntryKind::Hardlink => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn directory_rules() {
        let fs = MemFs::new();
        assert!(fs.create_dir(Path::new("usr/lib"), 0o755).is_err());
        fs.create_dir_all(Path::new("usr/lib/apk"), 0o755).unwrap();
        assert!(fs.symlink_metadata(Path::new("usr")).unwrap().is_dir());
        assert_eq!(
            fs.create_dir(Path::new("usr"), 0o755).unwrap_err().kind(),
            io::ErrorKind::AlreadyExists
        );

        fs.write(Path::new("usr/lib/apk/x"), b"x", 0o644).unwrap();
        assert_eq!(
            fs.remove_dir(Path::new("usr/lib/apk")).unwrap_err().kind(),
            io::ErrorKind::DirectoryNotEmpty
        );
        fs.remove_file(Path::new("usr/lib/apk/x")).unwrap();
        fs.remove_dir(Path::new("usr/lib/apk")).unwrap();
        assert!(!fs.exists(Path::new("usr/lib/apk")));
    }

    #[test]
    fn files_links_and_appends() {
        let fs = MemFs::new();
        fs.create_dir_all(Path::new("etc/apk"), 0o755).unwrap();
        fs.append(Path::new("etc/apk/world"), b"busybox\n").unwrap();
        fs.append(Path::new("etc/apk/world"), b"zlib\n").unwrap();
        assert_eq!(fs.read(Path::new("/etc/apk/world")).unwrap(), b"busybox\nzlib\n");

        fs.symlink(Path::new("world"), Path::new("etc/apk/alias"))
            .unwrap();
        assert_eq!(
            fs.read_link(Path::new("etc/apk/alias")).unwrap(),
            PathBuf::from("world")
        );
        fs.hard_link(Path::new("etc/apk/world"), Path::new("etc/apk/copy"))
            .unwrap();
        assert_eq!(fs.read(Path::new("etc/apk/copy")).unwrap(), b"busybox\nzlib\n");

        let names: Vec<_> = fs
            .read_dir(Path::new("etc/apk"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["alias", "copy", "world"]);
        assert_eq!(fs.read_dir(Path::new("/")).unwrap().len(), 1);
    }

    #[test]
    fn header_writer_records_lazy_references() {
        let mut archive = tempfile::NamedTempFile::new().unwrap();
        archive.write_all(b"....hello world....").unwrap();

        let fs = MemFs::new();
        let writer = fs.header_writer().unwrap();
        let dir = FileHeader {
            path: "usr/share".into(),
            kind: EntryKind::Directory,
            mode: 0o755,
            uid: 0,
            gid: 0,
            size: 0,
            link_target: None,
            checksum: None,
        };
        assert!(writer.write_header(&dir, None).unwrap());

        let file = FileHeader {
            path: "usr/share/greeting".into(),
            kind: EntryKind::File,
            mode: 0o644,
            size: 11,
            ..dir.clone()
        };
        let source = ContentSource {
            archive: archive.path().to_path_buf(),
            offset: 4,
            size: 11,
        };
        assert!(writer.write_header(&file, Some(&source)).unwrap());
        assert!(fs.is_lazy(Path::new("usr/share/greeting")).unwrap());
        assert_eq!(fs.read(Path::new("usr/share/greeting")).unwrap(), b"hello world");

        let link = FileHeader {
            path: "usr/share/alias".into(),
            kind: EntryKind::Symlink,
            link_target: Some("greeting".into()),
            ..dir
        };
        assert!(!writer.write_header(&link, None).unwrap());
    }
}
