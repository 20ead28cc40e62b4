//! Integration tests for the install pipeline

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use httpmock::prelude::*;
    use kiln_errors::{Error, InstallError, PackageError};
    use kiln_events::{channel, AcquisitionEvent, AppEvent, EventReceiver, InstallEvent};
    use kiln_install::*;
    use kiln_net::{Fetcher, NetConfig, RetryConfig};
    use kiln_platform::{DirFs, MemFs, TargetFs};
    use kiln_resources::{CancelScope, ResourceLimits};
    use kiln_state::{InstalledDb, ScriptsArchive, TriggerRegistry};
    use kiln_store::{BuiltPackage, PackageBuilder, PackageCache};
    use kiln_types::{InstallablePackage, PackageRef, Repository, RepositoryPackage};
    use tempfile::TempDir;

    const ARCH: &str = "x86_64";

    fn fetcher() -> Fetcher {
        Fetcher::new(NetConfig {
            retry: RetryConfig {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                ..RetryConfig::default()
            },
            ..NetConfig::default()
        })
        .unwrap()
    }

    fn builder(name: &str, version: &str) -> PackageBuilder {
        PackageBuilder::new(name, version).arch(ARCH)
    }

    fn repo_package(name: &str, version: &str, built: &BuiltPackage, repo: &str) -> PackageRef {
        Arc::new(RepositoryPackage {
            name: name.into(),
            version: version.into(),
            arch: ARCH.into(),
            checksum: built.checksum.clone(),
            description: String::new(),
            size: built.bytes.len() as u64,
            installed_size: 0,
            dependencies: vec![],
            provides: vec![],
            origin: name.into(),
            repository: Repository::new(repo),
        })
    }

    /// Write the archive into a local repository and return its index entry
    fn publish(repo: &Path, name: &str, version: &str, builder: PackageBuilder) -> PackageRef {
        let arch_dir = repo.join(ARCH);
        std::fs::create_dir_all(&arch_dir).unwrap();
        let built = builder
            .write_to(&arch_dir.join(format!("{name}-{version}.apk")))
            .unwrap();
        repo_package(name, version, &built, repo.to_str().unwrap())
    }

    fn target(root: &Path) -> Arc<dyn TargetFs> {
        let fs = DirFs::new(root);
        fs.create_dir_all(Path::new("usr/lib/apk/db"), 0o755).unwrap();
        Arc::new(fs)
    }

    fn installer(fs: Arc<dyn TargetFs>, cache: Option<&Path>) -> Installer {
        let expander = PackageExpander::new(fetcher(), cache.map(PackageCache::new));
        Installer::new(fs, expander).with_limits(ResourceLimits {
            concurrent_expansions: 4,
        })
    }

    fn drain(rx: &mut EventReceiver) -> Vec<AppEvent> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push(message.event);
        }
        events
    }

    #[tokio::test]
    async fn test_concurrent_expansions_share_one_fetch() {
        let server = MockServer::start_async().await;
        let built = builder("zlib", "1.3.1-r0")
            .file("usr/lib/libz.so.1", 0o755, b"\x7fELF zlib")
            .build()
            .unwrap();
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/main/x86_64/zlib-1.3.1-r0.apk");
                then.status(200)
                    .delay(Duration::from_millis(100))
                    .body(&built.bytes);
            })
            .await;
        let pkg = repo_package("zlib", "1.3.1-r0", &built, &server.url("/main"));

        let expander = PackageExpander::new(fetcher(), None);
        let scope = CancelScope::new();
        let (a, b) = tokio::join!(expander.expand(&pkg, &scope), expander.expand(&pkg, &scope));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(mock.hits_async().await, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.control_hash(), &built.checksum);
        assert!(!a.is_adopted());
        assert!(expander.coordinator().is_resolved(&server.url("/main/x86_64/zlib-1.3.1-r0.apk")));
    }

    #[tokio::test]
    async fn test_populated_cache_needs_no_network() {
        let server = MockServer::start_async().await;
        let built = builder("busybox", "1.36.1-r2")
            .signed(true)
            .dir("bin", 0o755)
            .file("bin/busybox", 0o755, b"\x7fELF busybox")
            .build()
            .unwrap();
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/main/x86_64/busybox-1.36.1-r2.apk");
                then.status(200).body(&built.bytes);
            })
            .await;
        let pkg = repo_package("busybox", "1.36.1-r2", &built, &server.url("/main"));
        let cache = TempDir::new().unwrap();
        let scope = CancelScope::new();

        let first = PackageExpander::new(fetcher(), Some(PackageCache::new(cache.path())));
        let expanded = first.expand(&pkg, &scope).await.unwrap();
        assert!(expanded.is_adopted());
        assert_eq!(mock.hits_async().await, 1);

        // A fresh coordinator only has the disk cache to go on
        let (tx, mut rx) = channel();
        let second = PackageExpander::new(fetcher(), Some(PackageCache::new(cache.path())))
            .with_event_sender(tx);
        let again = second.expand(&pkg, &scope).await.unwrap();
        assert_eq!(mock.hits_async().await, 1);
        assert_eq!(again.data_hash(), expanded.data_hash());
        assert_eq!(again.size(), built.bytes.len() as u64);
        assert!(drain(&mut rx).iter().any(|event| matches!(
            event,
            AppEvent::Acquisition(AcquisitionEvent::CacheHit { package, .. }) if package == "busybox"
        )));

        let hex = built.checksum.to_hex();
        let dir = cache.path().join(&hex[..2]);
        assert!(dir.join(format!("{hex}.ctl.tar.gz")).is_file());
        assert!(dir.join(format!("{hex}.sig.tar.gz")).is_file());
        assert!(dir.join(format!("{}.dat.tar.gz", built.datahash)).is_file());
        assert!(dir.join(format!("{}.dat.tar", built.datahash)).is_file());
    }

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let repo = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let packages = vec![
            publish(
                repo.path(),
                "musl",
                "1.2.5-r0",
                builder("musl", "1.2.5-r0")
                    .dir("lib", 0o755)
                    .file("lib/ld-musl-x86_64.so.1", 0o755, b"\x7fELF musl")
                    .symlink("lib/libc.musl-x86_64.so.1", "ld-musl-x86_64.so.1"),
            ),
            publish(
                repo.path(),
                "fontconfig",
                "2.15.0-r1",
                builder("fontconfig", "2.15.0-r1")
                    .depend("musl")
                    .triggers("/usr/share/fonts/*")
                    .script(".post-install", b"#!/bin/sh\nexit 0\n")
                    .file("etc/fonts/fonts.conf", 0o644, b"<fontconfig/>\n"),
            ),
        ];
        let fs = target(root.path());

        let first = installer(fs.clone(), Some(cache.path()))
            .install(&packages, &CancelScope::new())
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].triggers, vec!["/usr/share/fonts/*"]);
        assert_eq!(
            std::fs::read_link(root.path().join("lib/libc.musl-x86_64.so.1")).unwrap(),
            Path::new("ld-musl-x86_64.so.1")
        );

        let db = InstalledDb::new(fs.clone());
        assert_eq!(db.read_all().unwrap().len(), 2);
        let scripts = ScriptsArchive::new(fs.clone()).entries().unwrap();
        assert_eq!(
            scripts,
            vec![format!("fontconfig-2.15.0-r1.{}.post-install", first[1].checksum)]
        );
        let triggers = TriggerRegistry::new(fs.clone()).read().unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].0, first[1].checksum);

        let installed_db = std::fs::read(root.path().join("usr/lib/apk/db/installed")).unwrap();
        let scripts_tar = std::fs::read(root.path().join("usr/lib/apk/db/scripts.tar")).unwrap();

        let (tx, mut rx) = channel();
        let second = installer(fs.clone(), Some(cache.path()))
            .with_event_sender(tx)
            .install(&packages, &CancelScope::new())
            .await
            .unwrap();

        let ids = |records: &[kiln_types::Package]| {
            records
                .iter()
                .map(|p| (p.name.clone(), p.checksum.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&second), ids(&first));
        assert_eq!(
            std::fs::read(root.path().join("usr/lib/apk/db/installed")).unwrap(),
            installed_db
        );
        assert_eq!(
            std::fs::read(root.path().join("usr/lib/apk/db/scripts.tar")).unwrap(),
            scripts_tar
        );

        let events = drain(&mut rx);
        let skipped = events
            .iter()
            .filter(|e| matches!(e, AppEvent::Install(InstallEvent::Skipped { .. })))
            .count();
        assert_eq!(skipped, 2);
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::Install(InstallEvent::BatchCompleted { installed: 0, skipped: 2, .. })
        )));
    }

    #[tokio::test]
    async fn test_later_package_takes_over_shared_paths() {
        let repo = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let packages = vec![
            publish(
                repo.path(),
                "alpha",
                "1.0-r0",
                builder("alpha", "1.0-r0")
                    .dir("usr/share/common", 0o755)
                    .file("usr/share/common/data.txt", 0o644, b"from alpha\n")
                    .file("usr/share/alpha.txt", 0o644, b"alpha only\n"),
            ),
            publish(
                repo.path(),
                "beta",
                "1.0-r0",
                builder("beta", "1.0-r0")
                    .dir("usr/share/common", 0o755)
                    .file("usr/share/common/data.txt", 0o644, b"from beta\n"),
            ),
        ];
        let fs = target(root.path());

        installer(fs.clone(), None)
            .install(&packages, &CancelScope::new())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(root.path().join("usr/share/common/data.txt")).unwrap(),
            b"from beta\n"
        );

        let installed = InstalledDb::new(fs).read_all().unwrap();
        let paths = |index: usize| {
            installed[index]
                .files
                .iter()
                .map(|h| h.path.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(installed[0].package.name, "alpha");
        assert!(paths(0).contains(&"usr/share/common"));
        assert!(paths(0).contains(&"usr/share/alpha.txt"));
        assert!(!paths(0).contains(&"usr/share/common/data.txt"));
        assert!(paths(1).contains(&"usr/share/common"));
        assert!(paths(1).contains(&"usr/share/common/data.txt"));
    }

    #[tokio::test]
    async fn test_failed_expansion_stops_later_applies() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/main/x86_64/broken-1.0-r0.apk");
                then.status(404).delay(Duration::from_millis(300));
            })
            .await;
        let broken = builder("broken", "1.0-r0").build().unwrap();

        let repo = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let packages = vec![
            publish(
                repo.path(),
                "first",
                "1.0-r0",
                builder("first", "1.0-r0").file("opt/first", 0o644, b"1"),
            ),
            publish(
                repo.path(),
                "second",
                "1.0-r0",
                builder("second", "1.0-r0").file("opt/second", 0o644, b"2"),
            ),
            repo_package("broken", "1.0-r0", &broken, &server.url("/main")),
            publish(
                repo.path(),
                "fourth",
                "1.0-r0",
                builder("fourth", "1.0-r0").file("opt/fourth", 0o644, b"4"),
            ),
        ];
        let fs = target(root.path());

        let err = installer(fs.clone(), None)
            .install(&packages, &CancelScope::new())
            .await
            .unwrap_err();

        match &err {
            Error::Install(InstallError::ExpansionFailed { package, source }) => {
                assert_eq!(package, "broken-1.0-r0");
                assert!(matches!(**source, Error::Network(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(root.path().join("opt/first").is_file());
        assert!(root.path().join("opt/second").is_file());
        assert!(!root.path().join("opt/fourth").exists());
        // No rollback, and no database records for a failed batch
        assert!(InstalledDb::new(fs).read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_early_failure_still_applies_slower_lower_indexes() {
        let server = MockServer::start_async().await;
        let first = builder("first", "1.0-r0")
            .file("opt/first", 0o644, b"1")
            .build()
            .unwrap();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/main/x86_64/first-1.0-r0.apk");
                then.status(200)
                    .delay(Duration::from_millis(400))
                    .body(&first.bytes);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/main/x86_64/broken-1.0-r0.apk");
                then.status(404);
            })
            .await;
        let broken = builder("broken", "1.0-r0").build().unwrap();

        let root = TempDir::new().unwrap();
        let packages = vec![
            repo_package("first", "1.0-r0", &first, &server.url("/main")),
            repo_package("broken", "1.0-r0", &broken, &server.url("/main")),
        ];
        let fs = target(root.path());

        let err = installer(fs.clone(), None)
            .install(&packages, &CancelScope::new())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, Error::Install(InstallError::ExpansionFailed { package, .. }) if package == "broken-1.0-r0"),
            "unexpected error: {err}"
        );
        assert_eq!(std::fs::read(root.path().join("opt/first")).unwrap(), b"1");
        assert!(InstalledDb::new(fs).read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_returns_promptly() {
        let server = MockServer::start_async().await;
        let built = builder("slow", "1.0-r0").build().unwrap();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/main/x86_64/slow-1.0-r0.apk");
                then.status(200)
                    .delay(Duration::from_secs(10))
                    .body(&built.bytes);
            })
            .await;
        let packages = vec![repo_package("slow", "1.0-r0", &built, &server.url("/main"))];
        let root = TempDir::new().unwrap();
        let installer = installer(target(root.path()), None);

        let scope = CancelScope::new();
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            installer.install(&packages, &scope),
        )
        .await
        .expect("install did not observe cancellation");
        let err = result.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_rejected() {
        let repo = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let real = publish(
            repo.path(),
            "zstd",
            "1.5.6-r0",
            builder("zstd", "1.5.6-r0").file("usr/bin/zstd", 0o755, b"zstd"),
        );
        let other = builder("other", "1.0-r0").build().unwrap();
        // Index entry points at the real archive but declares another checksum
        let lying = repo_package(
            real.name(),
            real.version(),
            &other,
            repo.path().to_str().unwrap(),
        );

        let err = installer(target(root.path()), None)
            .install(&[lying], &CancelScope::new())
            .await
            .unwrap_err();
        match err {
            Error::Install(InstallError::ExpansionFailed { source, .. }) => {
                assert!(matches!(
                    *source,
                    Error::Package(PackageError::ChecksumMismatch { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!root.path().join("usr/bin/zstd").exists());
    }

    #[tokio::test]
    async fn test_lazy_target_references_cached_data() {
        let repo = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let packages = vec![publish(
            repo.path(),
            "ca-certificates",
            "20240705-r0",
            builder("ca-certificates", "20240705-r0")
                .dir("etc/ssl/certs", 0o755)
                .file("etc/ssl/certs/ca-certificates.crt", 0o644, b"-----BEGIN CERTIFICATE-----\n"),
        )];
        let mem = Arc::new(MemFs::new());
        mem.create_dir_all(Path::new("usr/lib/apk/db"), 0o755).unwrap();
        let fs: Arc<dyn TargetFs> = mem.clone();

        let (tx, mut rx) = channel();
        installer(fs.clone(), Some(cache.path()))
            .with_event_sender(tx)
            .install(&packages, &CancelScope::new())
            .await
            .unwrap();

        let path = Path::new("etc/ssl/certs/ca-certificates.crt");
        assert!(mem.is_lazy(path).unwrap());
        assert_eq!(mem.read(path).unwrap(), b"-----BEGIN CERTIFICATE-----\n");
        assert_eq!(InstalledDb::new(fs).read_all().unwrap().len(), 1);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            AppEvent::Install(InstallEvent::Finalized { files_kept: 2, files_dropped: 0, .. })
        )));
    }

    #[tokio::test]
    async fn test_expand_all_leaves_root_untouched() {
        let repo = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let packages = vec![
            publish(
                repo.path(),
                "one",
                "1-r0",
                builder("one", "1-r0").file("one", 0o644, b"1"),
            ),
            publish(
                repo.path(),
                "two",
                "2-r0",
                builder("two", "2-r0").file("two", 0o644, b"2"),
            ),
        ];

        let expanded = installer(target(root.path()), None)
            .expand_all(&packages, &CancelScope::new())
            .await
            .unwrap();

        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].control_hash(), packages[0].checksum());
        assert_eq!(expanded[1].control_hash(), packages[1].checksum());
        assert!(!root.path().join("one").exists());
        assert!(InstalledDb::new(target(root.path())).read_all().unwrap().is_empty());
    }
}
