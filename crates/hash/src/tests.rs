//! Tests for checksum parsing and digest helpers

use super::*;
use std::io::Write as _;
use tempfile::TempDir;

const ABC_SHA1_HEX: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
const ABC_SHA1_Q1: &str = "Q1qZk+NkcGgWq6PiVxeFDCbJzQ2J0=";
const ABC_SHA256_HEX: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

#[test]
fn parses_q1_checksum_and_renders_hex() {
    let checksum = Checksum::parse(ABC_SHA1_Q1).unwrap();
    assert_eq!(checksum.algorithm(), HashAlgorithm::Sha1);
    assert_eq!(checksum.to_hex(), ABC_SHA1_HEX);
    assert_eq!(checksum.to_string(), ABC_SHA1_Q1);
}

#[test]
fn rejects_malformed_checksums() {
    for bad in ["", "Q", "Z1qZk+NkcGgWq6PiVxeFDCbJzQ2J0=", "Q1not base64!", "Q1YWJj"] {
        let err = Checksum::parse(bad).unwrap_err();
        assert!(
            matches!(err, Error::Package(PackageError::InvalidChecksum { .. })),
            "{bad}: {err}"
        );
    }
}

#[test]
fn digest_matches_known_vectors() {
    assert_eq!(digest(HashAlgorithm::Sha1, b"abc").to_hex(), ABC_SHA1_HEX);
    assert_eq!(digest(HashAlgorithm::Sha256, b"abc").to_hex(), ABC_SHA256_HEX);
}

#[test]
fn hashing_writer_counts_and_digests() {
    let mut writer = HashingWriter::new(Vec::new(), HashAlgorithm::Sha1);
    writer.write_all(b"a").unwrap();
    writer.write_all(b"bc").unwrap();
    assert_eq!(writer.written(), 3);
    let (inner, checksum, written) = writer.finish();
    assert_eq!(inner, b"abc");
    assert_eq!(written, 3);
    assert_eq!(checksum.to_string(), ABC_SHA1_Q1);
}

#[test]
fn hashing_reader_digests_consumed_bytes() {
    let mut reader = HashingReader::new(&b"abc"[..], HashAlgorithm::Sha256);
    let mut sink = Vec::new();
    std::io::copy(&mut reader, &mut sink).unwrap();
    assert_eq!(reader.finish().to_hex(), ABC_SHA256_HEX);
}

#[test]
fn checksum_serde_uses_tagged_form() {
    let checksum = Checksum::parse(ABC_SHA1_Q1).unwrap();
    let json = serde_json::to_string(&checksum).unwrap();
    assert_eq!(json, format!("\"{ABC_SHA1_Q1}\""));
    let back: Checksum = serde_json::from_str(&json).unwrap();
    assert_eq!(back, checksum);
}

#[tokio::test]
async fn hash_file_streams_contents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("payload");
    std::fs::write(&path, b"abc").unwrap();

    let checksum = hash_file(&path, HashAlgorithm::Sha256).await.unwrap();
    assert_eq!(checksum.to_hex(), ABC_SHA256_HEX);

    let missing = hash_file(&dir.path().join("missing"), HashAlgorithm::Sha1).await;
    assert!(matches!(missing, Err(Error::Io { path: Some(_), .. })));
}
