#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package checksums and segment digests for kiln
//!
//! Package identity is the tagged checksum carried by repository indexes
//! (`Q1` followed by base64 of a SHA-1 digest). Cache file names use the
//! hex form of the same bytes. Data segments are addressed by a hex
//! SHA-256 declared in the control metadata.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kiln_errors::{Error, PackageError};
use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};
use sha2::Sha256;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// Digest algorithms used by package archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-1, tag `Q1`
    Sha1,
    /// SHA-256, tag `Q2`
    Sha256,
}

impl HashAlgorithm {
    /// Two-character tag used in checksum strings
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Sha1 => "Q1",
            Self::Sha256 => "Q2",
        }
    }

    /// Expected digest length in bytes
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Q1" => Some(Self::Sha1),
            "Q2" => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// A tagged package checksum such as `Q1dGVzdA...`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Checksum {
    /// Wrap raw digest bytes
    ///
    /// # Errors
    /// Returns an error if the digest length does not match the algorithm.
    pub fn from_digest(algorithm: HashAlgorithm, bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != algorithm.digest_len() {
            return Err(PackageError::InvalidChecksum {
                checksum: hex::encode(bytes),
                message: format!(
                    "{} digest must be {} bytes, got {}",
                    algorithm.tag(),
                    algorithm.digest_len(),
                    bytes.len()
                ),
            }
            .into());
        }
        Ok(Self {
            algorithm,
            bytes: bytes.to_vec(),
        })
    }

    /// Parse the tagged base64 form
    ///
    /// # Errors
    /// Returns an error for unknown tags, invalid base64, or a wrong digest length.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let invalid = |message: String| PackageError::InvalidChecksum {
            checksum: s.to_string(),
            message,
        };
        let (tag, encoded) = s
            .split_at_checked(2)
            .ok_or_else(|| invalid("checksum is too short".to_string()))?;
        let algorithm = HashAlgorithm::from_tag(tag)
            .ok_or_else(|| invalid(format!("unsupported checksum tag {tag}")))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| invalid(format!("invalid base64: {e}")))?;
        if bytes.len() != algorithm.digest_len() {
            return Err(invalid(format!(
                "{tag} digest must be {} bytes, got {}",
                algorithm.digest_len(),
                bytes.len()
            ))
            .into());
        }
        Ok(Self { algorithm, bytes })
    }

    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex encoding of the raw digest, used for cache file names
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Base64 encoding of the raw digest, without the tag
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.algorithm.tag(), self.to_base64())
    }
}

impl FromStr for Checksum {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental digest over one of the supported algorithms
#[derive(Clone)]
pub enum Digester {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Digester {
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha1(_) => HashAlgorithm::Sha1,
            Self::Sha256(_) => HashAlgorithm::Sha256,
        }
    }

    /// Consume the digester and return the raw digest bytes
    #[must_use]
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
        }
    }

    /// Consume the digester into a tagged checksum
    #[must_use]
    pub fn finalize_checksum(self) -> Checksum {
        let algorithm = self.algorithm();
        Checksum {
            algorithm,
            bytes: self.finalize(),
        }
    }
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Digester").field(&self.algorithm()).finish()
    }
}

/// Digest a byte slice in one go
#[must_use]
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Checksum {
    let mut digester = Digester::new(algorithm);
    digester.update(data);
    digester.finalize_checksum()
}

/// Writer adapter that digests and counts everything written through it
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    digester: Digester,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            digester: Digester::new(algorithm),
            written: 0,
        }
    }

    /// Bytes written so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Split into the inner writer, the digest, and the byte count
    pub fn finish(self) -> (W, Checksum, u64) {
        (self.inner, self.digester.finalize_checksum(), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digester.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader adapter that digests everything read through it
#[derive(Debug)]
pub struct HashingReader<R> {
    inner: R,
    digester: Digester,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            digester: Digester::new(algorithm),
        }
    }

    #[must_use]
    pub fn finish(self) -> Checksum {
        self.digester.finalize_checksum()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digester.update(&buf[..n]);
        Ok(n)
    }
}

/// Compute the digest of a file
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<Checksum, Error> {
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;

    let mut digester = Digester::new(algorithm);
    let mut buffer = vec![0; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        digester.update(&buffer[..n]);
    }

    Ok(digester.finalize_checksum())
}

#[cfg(test)]
mod tests;
