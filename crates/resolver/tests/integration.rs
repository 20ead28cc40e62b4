//! Integration tests for resolver crate

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use kiln_errors::{Error, OpsError};
    use kiln_hash::{digest, HashAlgorithm};
    use kiln_net::Fetcher;
    use kiln_resolver::*;
    use kiln_resources::CancelScope;
    use kiln_types::{InstallablePackage, Repository};
    use tempfile::tempdir;

    fn gz_tar(entries: &[(&str, &[u8])], finish: bool) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in entries {
            let mut header = tar::Header::new_ustar();
            header.set_mode(0o644);
            header.set_size(body.len() as u64);
            builder.append_data(&mut header, name, *body).unwrap();
        }
        let mut bytes = builder.into_inner().unwrap();
        if !finish {
            bytes.truncate(bytes.len() - 1024);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn apkindex() -> String {
        let sum = |name: &str| digest(HashAlgorithm::Sha1, name.as_bytes());
        format!(
            "C:{}\nP:musl\nV:1.2.5-r0\nS:1\nI:2\np:so:libc.musl-aarch64.so.1=1\n\n\
             C:{}\nP:zlib\nV:1.3.1-r0\nD:so:libc.musl-aarch64.so.1\n\n",
            sum("musl"),
            sum("zlib")
        )
    }

    fn write_index(repo: &Path, arch: &str, signed: bool) {
        let dir = repo.join(arch);
        std::fs::create_dir_all(&dir).unwrap();
        let mut bytes = Vec::new();
        if signed {
            bytes.extend(gz_tar(&[(".SIGN.RSA.build.rsa.pub", b"sig")], false));
        }
        bytes.extend(gz_tar(
            &[("DESCRIPTION", b"main"), ("APKINDEX", apkindex().as_bytes())],
            true,
        ));
        std::fs::write(dir.join("APKINDEX.tar.gz"), bytes).unwrap();
    }

    #[tokio::test]
    async fn test_load_signed_local_index_and_resolve() {
        let repo_dir = tempdir().unwrap();
        write_index(repo_dir.path(), "aarch64", true);

        let (tx, mut rx) = kiln_events::channel();
        let fetcher = Fetcher::with_defaults().unwrap().with_event_sender(tx);
        let repository = Repository::new(repo_dir.path().display().to_string());
        let index = PackageIndex::load(&fetcher, &repository, "aarch64", &CancelScope::new())
            .await
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.packages[1].dependencies, vec!["so:libc.musl-aarch64.so.1"]);
        assert_eq!(
            index.packages[1].url(),
            format!("{}/aarch64/zlib-1.3.1-r0.apk", repo_dir.path().display())
        );

        let mut loaded = false;
        while let Ok(message) = rx.try_recv() {
            if let kiln_events::AppEvent::Resolver(kiln_events::ResolverEvent::IndexLoaded {
                packages,
                ..
            }) = message.event
            {
                assert_eq!(packages, 2);
                loaded = true;
            }
        }
        assert!(loaded);

        let resolved = IndexResolver::new()
            .resolve(&["zlib".to_string()], &[index], &[])
            .unwrap();
        let names: Vec<_> = resolved.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["musl", "zlib"]);
    }

    #[tokio::test]
    async fn test_unsigned_index_parses() {
        let repo_dir = tempdir().unwrap();
        write_index(repo_dir.path(), "x86_64", false);
        let bytes = std::fs::read(repo_dir.path().join("x86_64/APKINDEX.tar.gz")).unwrap();
        let index = PackageIndex::from_archive(&bytes, Repository::new("/srv/repo"), "x86_64")
            .unwrap();
        assert_eq!(index.packages[0].arch, "x86_64");
        assert!(index.names().contains("zlib"));
    }

    #[tokio::test]
    async fn test_index_without_apkindex_entry() {
        let bytes = gz_tar(&[("DESCRIPTION", b"nothing here")], true);
        let err = PackageIndex::from_archive(&bytes, Repository::new("/srv/repo"), "x86_64")
            .unwrap_err();
        assert!(matches!(err, Error::Ops(OpsError::InvalidIndex { .. })));
    }

    #[tokio::test]
    async fn test_missing_index_is_a_fetch_error() {
        let repo_dir = tempdir().unwrap();
        let fetcher = Fetcher::with_defaults().unwrap();
        let repository = Repository::new(repo_dir.path().display().to_string());
        let err = PackageIndex::load(&fetcher, &repository, "x86_64", &CancelScope::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
