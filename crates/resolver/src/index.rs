//! Repository indexes

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use kiln_errors::{Error, OpsError};
use kiln_events::{AppEvent, EventEmitter, ResolverEvent};
use kiln_hash::Checksum;
use kiln_net::Fetcher;
use kiln_resources::CancelScope;
use kiln_types::{Repository, RepositoryPackage};

const INDEX_ENTRY: &str = "APKINDEX";

/// Packages advertised by one repository for one architecture
#[derive(Debug, Clone)]
pub struct PackageIndex {
    pub repository: Repository,
    pub arch: String,
    pub packages: Vec<Arc<RepositoryPackage>>,
}

impl PackageIndex {
    /// Parse a signed or unsigned `APKINDEX.tar.gz`
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` if the archive is malformed or has no
    /// `APKINDEX` entry.
    pub fn from_archive(bytes: &[u8], repository: Repository, arch: &str) -> Result<Self, Error> {
        let url = repository.index_url(arch);
        let invalid = |message: String| OpsError::InvalidIndex {
            url: url.clone(),
            message,
        };

        // The signature and index tarballs decode as one stream.
        let mut archive = tar::Archive::new(MultiGzDecoder::new(bytes));
        archive.set_ignore_zeros(true);
        let mut text = None;
        for entry in archive.entries().map_err(|e| invalid(e.to_string()))? {
            let mut entry = entry.map_err(|e| invalid(e.to_string()))?;
            let is_index = entry
                .path()
                .is_ok_and(|p| p.to_string_lossy().trim_start_matches("./") == INDEX_ENTRY);
            if is_index {
                let mut contents = String::new();
                entry
                    .read_to_string(&mut contents)
                    .map_err(|e| invalid(e.to_string()))?;
                text = Some(contents);
                break;
            }
        }
        let text = text.ok_or_else(|| invalid(format!("no {INDEX_ENTRY} entry")))?;

        let packages = parse_apkindex(&text, &repository, arch)?
            .into_iter()
            .map(Arc::new)
            .collect();
        Ok(Self {
            repository,
            arch: arch.to_string(),
            packages,
        })
    }

    /// Fetch and parse the index of `repository` for `arch`
    ///
    /// # Errors
    ///
    /// Returns a network error if the index cannot be fetched, or
    /// `InvalidIndex` if it does not parse.
    pub async fn load(
        fetcher: &Fetcher,
        repository: &Repository,
        arch: &str,
        scope: &CancelScope,
    ) -> Result<Self, Error> {
        let url = repository.index_url(arch);
        let fetched = fetcher.fetch(&url, scope).await?;
        let bytes = tokio::fs::read(fetched.path())
            .await
            .map_err(|e| Error::io_with_path(&e, fetched.path()))?;
        let index = Self::from_archive(&bytes, repository.clone(), arch)?;
        fetcher.emit(AppEvent::Resolver(ResolverEvent::IndexLoaded {
            url,
            packages: index.len(),
        }));
        Ok(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Package names in this index
    #[must_use]
    pub fn names(&self) -> HashSet<&str> {
        self.packages.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Parse the text of an `APKINDEX` entry
///
/// # Errors
///
/// Returns `InvalidIndex` for malformed lines, packages without a name,
/// version or checksum, and unparsable checksums or sizes.
pub fn parse_apkindex(
    text: &str,
    repository: &Repository,
    arch: &str,
) -> Result<Vec<RepositoryPackage>, Error> {
    let mut packages = Vec::new();
    let mut fields: Vec<(char, &str)> = Vec::new();
    let mut start = 1;

    for (idx, line) in text.lines().chain(std::iter::once("")).enumerate() {
        if line.trim().is_empty() {
            if !fields.is_empty() {
                packages.push(build(&fields, repository, arch, start)?);
                fields.clear();
            }
            start = idx + 2;
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .filter(|(key, _)| key.len() == 1)
            .ok_or_else(|| OpsError::InvalidIndex {
                url: repository.index_url(arch),
                message: format!("line {}: expected a single-letter key", idx + 1),
            })?;
        fields.push((key.chars().next().unwrap_or_default(), value));
    }
    Ok(packages)
}

fn build(
    fields: &[(char, &str)],
    repository: &Repository,
    arch: &str,
    start: usize,
) -> Result<RepositoryPackage, Error> {
    let invalid = |message: String| OpsError::InvalidIndex {
        url: repository.index_url(arch),
        message: format!("entry at line {start}: {message}"),
    };
    let get = |key: char| fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
    let required = |key: char, what: &str| {
        get(key)
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("missing {what}")))
    };
    let number = |key: char| {
        get(key)
            .map(|v| v.parse::<u64>().map_err(|e| invalid(format!("{key}:{v}: {e}"))))
            .transpose()
            .map(Option::unwrap_or_default)
    };
    let list = |key: char| -> Vec<String> {
        get(key)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    };

    let checksum = required('C', "checksum")?;
    let checksum = Checksum::parse(&checksum).map_err(|e| invalid(e.to_string()))?;

    Ok(RepositoryPackage {
        name: required('P', "name")?,
        version: required('V', "version")?,
        arch: get('A').unwrap_or(arch).to_string(),
        checksum,
        description: get('T').unwrap_or_default().to_string(),
        size: number('S')?,
        installed_size: number('I')?,
        dependencies: list('D'),
        provides: list('p'),
        origin: get('o').unwrap_or_default().to_string(),
        repository: repository.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_hash::{digest, HashAlgorithm};

    fn checksum(name: &str) -> String {
        digest(HashAlgorithm::Sha1, name.as_bytes()).to_string()
    }

    #[test]
    fn parses_index_blocks() {
        let text = format!(
            "C:{}\nP:musl\nV:1.2.5-r0\nA:x86_64\nS:400000\nI:700000\nT:the musl c library\np:so:libc.musl-x86_64.so.1=1\no:musl\n\n\
             C:{}\nP:busybox\nV:1.36.1-r29\nD:so:libc.musl-x86_64.so.1 !busybox-static\n",
            checksum("musl"),
            checksum("busybox")
        );
        let repo = Repository::new("https://dl.example.org/main");
        let packages = parse_apkindex(&text, &repo, "x86_64").unwrap();

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "musl");
        assert_eq!(packages[0].size, 400_000);
        assert_eq!(packages[0].provides, vec!["so:libc.musl-x86_64.so.1=1"]);
        assert_eq!(packages[1].arch, "x86_64");
        assert_eq!(
            packages[1].dependencies,
            vec!["so:libc.musl-x86_64.so.1", "!busybox-static"]
        );
    }

    #[test]
    fn rejects_incomplete_entries() {
        let repo = Repository::new("/srv/repo");
        let err = parse_apkindex("P:musl\nV:1\n", &repo, "x86_64").unwrap_err();
        assert!(matches!(err, Error::Ops(OpsError::InvalidIndex { .. })));

        let err = parse_apkindex("garbage\n", &repo, "x86_64").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
