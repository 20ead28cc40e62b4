//! Splitting package archives into their gzip segments
//!
//! A package is a concatenation of up to three gzip members: an optional
//! signature, the control tarball and the data tarball. Each member is
//! copied verbatim to its own file while it is decoded, so the segment
//! hashes cover the exact compressed bytes.

mod builder;

pub use builder::{BuiltPackage, PackageBuilder};

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::bufread::GzDecoder;
use kiln_errors::{Error, PackageError};
use kiln_hash::{Checksum, HashAlgorithm, HashingWriter};
use kiln_resources::CancelScope;
use tempfile::TempDir;

use crate::control::ControlSegment;
use crate::expanded::{ExpandedPackage, Segment};
use crate::tarfs::DataTree;

const SIGNATURE_PREFIX: &str = ".SIGN.";

/// Buffered reader that copies every consumed byte into the current sink
struct SegmentTee<'a, R> {
    inner: R,
    sink: Option<HashingWriter<BufWriter<File>>>,
    sink_error: Option<io::Error>,
    cancel: &'a CancelScope,
}

impl<'a, R: BufRead> SegmentTee<'a, R> {
    fn new(inner: R, cancel: &'a CancelScope) -> Self {
        Self {
            inner,
            sink: None,
            sink_error: None,
            cancel,
        }
    }

    fn start(&mut self, path: &Path, algorithm: HashAlgorithm) -> Result<(), Error> {
        let file = File::create(path).map_err(|e| Error::io_with_path(&e, path))?;
        self.sink = Some(HashingWriter::new(BufWriter::new(file), algorithm));
        Ok(())
    }

    fn finish(&mut self, path: &Path) -> Result<(Checksum, u64), Error> {
        if let Some(e) = self.sink_error.take() {
            return Err(Error::io_with_path(&e, path));
        }
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::internal("no segment in progress"))?;
        let (mut writer, checksum, size) = sink.finish();
        writer.flush().map_err(|e| Error::io_with_path(&e, path))?;
        Ok((checksum, size))
    }

    fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.fill_buf()?.is_empty())
    }

    /// Classify a failure while decoding the member being written to `path`
    fn failure(&mut self, what: &str, e: &io::Error, path: &Path) -> Error {
        if let Some(sink_error) = self.sink_error.take() {
            return Error::io_with_path(&sink_error, path);
        }
        if self.cancel.is_cancelled() {
            return self.cancel.annotate(Error::cancelled());
        }
        match e.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other => PackageError::Corrupted {
                message: format!("{what} segment: {e}"),
            }
            .into(),
            _ => Error::io_with_path(e, path),
        }
    }
}

impl<R: BufRead> BufRead for SegmentTee<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("expansion cancelled"));
        }
        if self.sink_error.is_some() {
            return Err(io::Error::other("segment write failed"));
        }
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if amt > 0 && self.sink_error.is_none() {
            if let Some(sink) = self.sink.as_mut() {
                let written = self
                    .inner
                    .fill_buf()
                    .and_then(|buf| sink.write_all(&buf[..amt]));
                if let Err(e) = written {
                    self.sink_error = Some(e);
                }
            }
        }
        self.inner.consume(amt);
    }
}

impl<R: BufRead> Read for SegmentTee<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

fn read_failure(cancel: &CancelScope, e: &io::Error, archive: &Path) -> Error {
    if cancel.is_cancelled() {
        cancel.annotate(Error::cancelled())
    } else {
        Error::io_with_path(e, archive)
    }
}

fn first_entry_name(tar_bytes: &[u8]) -> Option<String> {
    let mut archive = tar::Archive::new(tar_bytes);
    let mut entries = archive.entries().ok()?;
    let entry = entries.next()?.ok()?;
    let path = entry.path().ok()?;
    Some(path.to_string_lossy().trim_start_matches("./").to_string())
}

/// Expand the package archive at `archive` into `temp_dir`
///
/// Blocking; run it on a blocking thread. The returned package owns
/// `temp_dir` until it is adopted into the cache.
///
/// # Errors
///
/// Returns `Corrupted` for malformed gzip or tar streams, `MissingControl`
/// or `MissingData` for absent segments, `DataHashMismatch` when the data
/// segment does not match the declared `datahash`, and `Cancelled` when
/// `cancel` fires mid-way.
pub fn expand_archive(
    archive: &Path,
    temp_dir: TempDir,
    cancel: &CancelScope,
) -> Result<ExpandedPackage, Error> {
    cancel.check()?;
    let file = File::open(archive).map_err(|e| Error::io_with_path(&e, archive))?;
    let mut tee = SegmentTee::new(BufReader::new(file), cancel);
    let dir = temp_dir.path().to_path_buf();

    let mut signature: Option<(Segment, Checksum)> = None;
    let mut control: Option<(Segment, Checksum, ControlSegment)> = None;

    // Signature and control segments are small and read into memory.
    while control.is_none() {
        if tee.at_end().map_err(|e| read_failure(cancel, &e, archive))? {
            return Err(PackageError::MissingControl.into());
        }
        let member = dir.join(format!("segment-{}.tar.gz", usize::from(signature.is_some())));
        tee.start(&member, HashAlgorithm::Sha1)?;
        let mut bytes = Vec::new();
        let decoded = GzDecoder::new(&mut tee).read_to_end(&mut bytes);
        if let Err(e) = decoded {
            return Err(tee.failure("control", &e, &member));
        }
        let (hash, size) = tee.finish(&member)?;
        let segment = Segment { path: member, size };

        let is_signature = first_entry_name(&bytes)
            .is_some_and(|name| name.starts_with(SIGNATURE_PREFIX));
        if is_signature && signature.is_none() {
            signature = Some((segment, hash));
        } else {
            control = Some((segment, hash, ControlSegment::from_tar(&bytes)?));
        }
    }
    let Some((control, control_hash, control_segment)) = control else {
        return Err(PackageError::MissingControl.into());
    };

    if tee.at_end().map_err(|e| read_failure(cancel, &e, archive))? {
        return Err(PackageError::MissingData.into());
    }
    let data_path = dir.join("data.tar.gz");
    let tar_path = dir.join("data.tar");
    tee.start(&data_path, HashAlgorithm::Sha256)?;
    let out = File::create(&tar_path).map_err(|e| Error::io_with_path(&e, &tar_path))?;
    let mut out = BufWriter::new(out);
    let copied = io::copy(&mut GzDecoder::new(&mut tee), &mut out);
    if let Err(e) = copied {
        return Err(tee.failure("data", &e, &data_path));
    }
    out.flush().map_err(|e| Error::io_with_path(&e, &tar_path))?;
    drop(out);
    let (data_checksum, data_size) = tee.finish(&data_path)?;

    if !tee.at_end().map_err(|e| read_failure(cancel, &e, archive))? {
        return Err(PackageError::Corrupted {
            message: "unexpected data after the data segment".to_string(),
        }
        .into());
    }

    let data_hash = data_checksum.to_hex();
    let declared = control_segment.pkginfo().datahash()?;
    if !declared.eq_ignore_ascii_case(&data_hash) {
        return Err(PackageError::DataHashMismatch {
            declared: declared.to_string(),
            actual: data_hash,
        }
        .into());
    }

    let (signature, signature_hash) = signature.map_or((None, None), |(s, h)| (Some(s), Some(h)));
    Ok(ExpandedPackage {
        control,
        control_hash,
        control_segment,
        signature,
        signature_hash,
        data: Segment {
            path: data_path,
            size: data_size,
        },
        data_hash,
        tree: DataTree::new(tar_path),
        temp_dir: Some(temp_dir),
    })
}

/// Scratch directory for one expansion, created under `parent`
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn scratch_dir(parent: &Path) -> Result<TempDir, Error> {
    tempfile::Builder::new()
        .prefix(".expand-")
        .tempdir_in(parent)
        .map_err(|e| Error::io_with_path(&e, parent))
}
