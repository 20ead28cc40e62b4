//! The installed-package database

use std::fmt::Write as _;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use kiln_config::constants::INSTALLED_DB;
use kiln_errors::{Error, StateError};
use kiln_hash::Checksum;
use kiln_platform::TargetFs;
use kiln_types::{EntryKind, FileHeader, Package};

use crate::io_error;

/// A package record together with the entries it installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub package: Package,
    pub files: Vec<FileHeader>,
}

/// Reader and writer for `usr/lib/apk/db/installed`
///
/// Each package is one block of `X:value` lines terminated by a blank
/// line: package fields first, then `F:` directory lines (with optional
/// `M:` ownership) and `R:` file lines (with `a:` ownership and `Z:`
/// checksum).
#[derive(Debug, Clone)]
pub struct InstalledDb {
    fs: Arc<dyn TargetFs>,
}

impl InstalledDb {
    pub fn new(fs: Arc<dyn TargetFs>) -> Self {
        Self { fs }
    }

    /// All recorded packages, in installation order
    ///
    /// A missing database reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read or parsed.
    pub fn read_all(&self) -> Result<Vec<InstalledPackage>, Error> {
        match self.fs.read(Path::new(INSTALLED_DB)) {
            Ok(bytes) => parse(&String::from_utf8_lossy(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_error(INSTALLED_DB)(e)),
        }
    }

    /// Whether a package named `name` is recorded, at any version
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read.
    pub fn is_installed(&self, name: &str) -> Result<bool, Error> {
        Ok(self
            .read_all()?
            .iter()
            .any(|installed| installed.package.name == name))
    }

    /// Append a package block
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be written.
    pub fn append_installed(&self, package: &Package, files: &[FileHeader]) -> Result<(), Error> {
        self.fs
            .append(Path::new(INSTALLED_DB), format_block(package, files).as_bytes())
            .map_err(io_error(INSTALLED_DB))
    }
}

fn format_block(package: &Package, files: &[FileHeader]) -> String {
    let mut out = String::new();
    let mut line = |key: char, value: &str| {
        if !value.is_empty() {
            let _ = writeln!(out, "{key}:{value}");
        }
    };

    line('C', &package.checksum.to_string());
    line('P', &package.name);
    line('V', &package.version);
    line('A', &package.arch);
    line('S', &package.size.to_string());
    line('I', &package.installed_size.to_string());
    line('T', &package.description);
    line('U', &package.url);
    line('L', &package.license);
    line('o', &package.origin);
    line('m', &package.maintainer);
    if let Some(build_time) = package.build_time {
        line('t', &build_time.timestamp().to_string());
    }
    line('c', &package.commit);
    line('D', &package.dependencies.join(" "));
    line('p', &package.provides.join(" "));
    line('r', &package.replaces.join(" "));

    // Root-level files have no F: line to return to, so they lead
    let (top, nested): (Vec<_>, Vec<_>) = files
        .iter()
        .partition(|header| !header.is_dir() && header.parent().is_empty());
    let mut current_dir: Option<&str> = None;
    for header in top.into_iter().chain(nested) {
        if header.is_dir() {
            line('F', &header.path);
            line('M', &ownership(header));
            current_dir = Some(&header.path);
            continue;
        }
        let parent = header.parent();
        if current_dir != Some(parent) {
            line('F', parent);
            current_dir = Some(parent);
        }
        line('R', header.file_name());
        line('a', &ownership(header));
        if let Some(checksum) = &header.checksum {
            line('Z', &checksum.to_string());
        }
    }

    out.push('\n');
    out
}

fn ownership(header: &FileHeader) -> String {
    format!("{}:{}:{:o}", header.uid, header.gid, header.mode & 0o7777)
}

#[derive(Default)]
struct Block {
    fields: Vec<(char, String)>,
    files: Vec<FileHeader>,
    start: usize,
}

fn parse(text: &str) -> Result<Vec<InstalledPackage>, Error> {
    let mut packages = Vec::new();
    let mut block: Option<Block> = None;
    let mut dir = String::new();

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        if raw.trim().is_empty() {
            if let Some(done) = block.take() {
                packages.push(finish(done)?);
            }
            dir.clear();
            continue;
        }
        let corrupted = |message: &str| StateError::Corrupted {
            line: lineno,
            message: message.to_string(),
        };
        let (key, value) = raw
            .split_once(':')
            .filter(|(key, _)| key.len() == 1)
            .ok_or_else(|| corrupted("expected a single-letter key"))?;
        let key = key.chars().next().unwrap_or_default();
        let current = block.get_or_insert_with(|| Block {
            start: lineno,
            ..Block::default()
        });

        match key {
            'F' => {
                dir = value.to_string();
                current.files.push(FileHeader {
                    path: dir.clone(),
                    kind: EntryKind::Directory,
                    mode: 0o755,
                    uid: 0,
                    gid: 0,
                    size: 0,
                    link_target: None,
                    checksum: None,
                });
            }
            'R' => {
                let path = if dir.is_empty() {
                    value.to_string()
                } else {
                    format!("{dir}/{value}")
                };
                current.files.push(FileHeader {
                    path,
                    kind: EntryKind::File,
                    mode: 0o644,
                    uid: 0,
                    gid: 0,
                    size: 0,
                    link_target: None,
                    checksum: None,
                });
            }
            'M' | 'a' => {
                let (uid, gid, mode) =
                    parse_ownership(value).ok_or_else(|| corrupted("malformed ownership"))?;
                let expected = if key == 'M' {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                let header = current
                    .files
                    .last_mut()
                    .filter(|h| h.kind == expected)
                    .ok_or_else(|| corrupted("ownership without an entry"))?;
                header.uid = uid;
                header.gid = gid;
                header.mode = mode;
            }
            'Z' => {
                let checksum =
                    Checksum::parse(value).map_err(|e| corrupted(&e.to_string()))?;
                let header = current
                    .files
                    .last_mut()
                    .filter(|h| h.kind == EntryKind::File)
                    .ok_or_else(|| corrupted("checksum without a file"))?;
                header.checksum = Some(checksum);
            }
            _ => current.fields.push((key, value.to_string())),
        }
    }
    if let Some(done) = block.take() {
        packages.push(finish(done)?);
    }
    Ok(packages)
}

fn parse_ownership(value: &str) -> Option<(u64, u64, u32)> {
    let mut parts = value.splitn(3, ':');
    let uid = parts.next()?.parse().ok()?;
    let gid = parts.next()?.parse().ok()?;
    let mode = u32::from_str_radix(parts.next()?, 8).ok()?;
    Some((uid, gid, mode))
}

fn finish(block: Block) -> Result<InstalledPackage, Error> {
    let corrupted = |message: String| StateError::Corrupted {
        line: block.start,
        message,
    };
    let get = |key: char| {
        block
            .fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    };
    let text = |key: char| get(key).unwrap_or_default().to_string();
    let list = |key: char| -> Vec<String> {
        get(key)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    };
    let number = |key: char| get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

    let checksum = get('C')
        .ok_or_else(|| corrupted("package without a checksum".to_string()))
        .and_then(|c| Checksum::parse(c).map_err(|e| corrupted(e.to_string())))?;
    let name = get('P').ok_or_else(|| corrupted("package without a name".to_string()))?;

    let package = Package {
        name: name.to_string(),
        version: text('V'),
        arch: text('A'),
        description: text('T'),
        url: text('U'),
        license: text('L'),
        origin: text('o'),
        maintainer: text('m'),
        commit: text('c'),
        build_time: get('t')
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        installed_size: number('I'),
        size: number('S'),
        checksum,
        dependencies: list('D'),
        provides: list('p'),
        replaces: list('r'),
        triggers: Vec::new(),
        datahash: None,
    };
    Ok(InstalledPackage {
        package,
        files: block.files,
    })
}
