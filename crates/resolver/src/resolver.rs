//! World resolution over repository indexes

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use kiln_errors::{Error, InstallError};
use kiln_events::{AppEvent, EventEmitter, EventSender, ResolverEvent};
use kiln_types::{Dependency, RepositoryPackage};

use crate::graph::DependencyGraph;
use crate::index::PackageIndex;

/// Outcome of resolving a world
#[derive(Debug, Clone, Default)]
pub struct ResolvedWorld {
    /// Packages to install, dependencies before dependents
    pub packages: Vec<Arc<RepositoryPackage>>,
    /// Names that must not be installed (`!name` atoms)
    pub conflicts: Vec<String>,
}

/// Turns world constraints into an ordered install set
pub trait Resolver: Send + Sync {
    /// Resolve `world` against `indexes` for the primary architecture
    ///
    /// Packages missing from any of `sibling_indexes` are excluded so that
    /// every architecture installs the same set.
    ///
    /// # Errors
    ///
    /// Returns `PackageNotFound` for unknown world entries and
    /// `ResolutionFailed` for unsatisfiable dependencies.
    fn resolve(
        &self,
        world: &[String],
        indexes: &[PackageIndex],
        sibling_indexes: &[PackageIndex],
    ) -> Result<ResolvedWorld, Error>;
}

/// Resolver that picks the first candidate in repository order
///
/// A candidate provides its own name and every `p:` entry. Once a provider
/// has been chosen for any name, it is reused for every other name it
/// provides. Exact `=version` constraints on a package's own name select
/// that version; other operators are not evaluated.
#[derive(Debug, Clone, Default)]
pub struct IndexResolver {
    tx: Option<EventSender>,
}

impl EventEmitter for IndexResolver {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl IndexResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }
}

struct Candidates<'a> {
    providers: HashMap<&'a str, Vec<&'a Arc<RepositoryPackage>>>,
    siblings: BTreeMap<&'a str, HashSet<&'a str>>,
}

impl<'a> Candidates<'a> {
    fn new(indexes: &'a [PackageIndex], sibling_indexes: &'a [PackageIndex]) -> Self {
        let mut providers: HashMap<&str, Vec<&Arc<RepositoryPackage>>> = HashMap::new();
        for pkg in indexes.iter().flat_map(|index| &index.packages) {
            providers.entry(pkg.name.as_str()).or_default().push(pkg);
            for provided in &pkg.provides {
                let name = provided
                    .split(['=', '<', '>', '~'])
                    .next()
                    .unwrap_or(provided);
                providers.entry(name).or_default().push(pkg);
            }
        }

        let mut siblings: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for index in sibling_indexes {
            siblings
                .entry(index.arch.as_str())
                .or_default()
                .extend(index.names());
        }
        Self {
            providers,
            siblings,
        }
    }

    fn choose(
        &self,
        dep: &Dependency,
        chosen: &HashMap<String, Arc<RepositoryPackage>>,
    ) -> Option<Arc<RepositoryPackage>> {
        let candidates = self.providers.get(dep.name.as_str())?;
        if let Some(selected) = candidates.iter().find(|c| chosen.contains_key(&c.name)) {
            return Some(Arc::clone(selected));
        }
        let exact = dep
            .constraint
            .as_deref()
            .and_then(|c| c.strip_prefix('='))
            .and_then(|version| {
                candidates
                    .iter()
                    .find(|c| c.name == dep.name && c.version == version)
            });
        exact.or_else(|| candidates.first()).map(|c| Arc::clone(c))
    }

    /// First sibling architecture that lacks `name`
    fn missing_arch(&self, name: &str) -> Option<&'a str> {
        self.siblings
            .iter()
            .find(|(_, names)| !names.contains(name))
            .map(|(arch, _)| *arch)
    }
}

impl Resolver for IndexResolver {
    fn resolve(
        &self,
        world: &[String],
        indexes: &[PackageIndex],
        sibling_indexes: &[PackageIndex],
    ) -> Result<ResolvedWorld, Error> {
        let candidates = Candidates::new(indexes, sibling_indexes);
        self.emit(AppEvent::Resolver(ResolverEvent::ResolutionStarted {
            world: world.to_vec(),
            repositories: indexes.len(),
            sibling_arches: candidates.siblings.keys().map(ToString::to_string).collect(),
        }));

        let mut graph = DependencyGraph::new();
        let mut chosen: HashMap<String, Arc<RepositoryPackage>> = HashMap::new();
        let mut conflicts: Vec<String> = Vec::new();
        let mut roots = Vec::new();
        let mut pending = Vec::new();

        for atom in world {
            let dep = Dependency::parse(atom);
            if dep.conflict {
                conflicts.push(dep.name);
                continue;
            }
            let pkg = candidates
                .choose(&dep, &chosen)
                .ok_or_else(|| InstallError::PackageNotFound {
                    package: dep.name.clone(),
                })?;
            if let Some(arch) = candidates.missing_arch(&pkg.name) {
                self.emit(AppEvent::Resolver(ResolverEvent::PackageExcluded {
                    package: pkg.name.clone(),
                    missing_arch: arch.to_string(),
                }));
                return Err(InstallError::PackageNotFound { package: dep.name }.into());
            }
            graph.add_node(&pkg.name);
            roots.push(pkg.name.clone());
            if !chosen.contains_key(&pkg.name) {
                chosen.insert(pkg.name.clone(), Arc::clone(&pkg));
                pending.push(pkg);
            }
        }

        while let Some(pkg) = pending.pop() {
            for atom in &pkg.dependencies {
                let dep = Dependency::parse(atom);
                if dep.conflict {
                    conflicts.push(dep.name);
                    continue;
                }
                let provider = candidates.choose(&dep, &chosen).ok_or_else(|| {
                    InstallError::ResolutionFailed {
                        message: format!("{pkg} depends on {atom}, which no repository provides"),
                    }
                })?;
                if let Some(arch) = candidates.missing_arch(&provider.name) {
                    self.emit(AppEvent::Resolver(ResolverEvent::PackageExcluded {
                        package: provider.name.clone(),
                        missing_arch: arch.to_string(),
                    }));
                    continue;
                }
                graph.add_edge(&pkg.name, &provider.name);
                if !chosen.contains_key(&provider.name) {
                    chosen.insert(provider.name.clone(), Arc::clone(&provider));
                    pending.push(provider);
                }
            }
        }

        let mut seen = HashSet::new();
        conflicts.retain(|name| seen.insert(name.clone()));

        let packages: Vec<_> = graph
            .install_order(&roots)
            .iter()
            .filter_map(|name| chosen.get(name).cloned())
            .collect();

        self.emit(AppEvent::Resolver(ResolverEvent::ResolutionCompleted {
            packages: packages.iter().map(ToString::to_string).collect(),
            conflicts: conflicts.clone(),
        }));
        Ok(ResolvedWorld {
            packages,
            conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_hash::{digest, HashAlgorithm};
    use kiln_types::Repository;

    fn pkg(name: &str, version: &str, deps: &[&str], provides: &[&str]) -> RepositoryPackage {
        RepositoryPackage {
            name: name.into(),
            version: version.into(),
            arch: "x86_64".into(),
            checksum: digest(HashAlgorithm::Sha1, format!("{name}-{version}").as_bytes()),
            description: String::new(),
            size: 0,
            installed_size: 0,
            dependencies: deps.iter().map(ToString::to_string).collect(),
            provides: provides.iter().map(ToString::to_string).collect(),
            origin: name.into(),
            repository: Repository::new("/srv/main"),
        }
    }

    fn index(arch: &str, packages: Vec<RepositoryPackage>) -> PackageIndex {
        PackageIndex {
            repository: Repository::new("/srv/main"),
            arch: arch.into(),
            packages: packages.into_iter().map(Arc::new).collect(),
        }
    }

    fn world(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn names(resolved: &ResolvedWorld) -> Vec<String> {
        resolved.packages.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn follows_provides_and_orders_dependencies_first() {
        let main = index(
            "x86_64",
            vec![
                pkg("busybox", "1.36", &["so:libc.musl-x86_64.so.1"], &["cmd:sh=1.36"]),
                pkg("musl", "1.2.5", &[], &["so:libc.musl-x86_64.so.1=1"]),
                pkg("alpine-base", "3.20", &["busybox", "cmd:sh", "!busybox-static"], &[]),
            ],
        );
        let resolved = IndexResolver::new()
            .resolve(&world(&["alpine-base"]), &[main], &[])
            .unwrap();
        assert_eq!(names(&resolved), vec!["musl", "busybox", "alpine-base"]);
        assert_eq!(resolved.conflicts, vec!["busybox-static"]);
    }

    #[test]
    fn first_repository_wins() {
        let first = index("x86_64", vec![pkg("zlib", "1.3.1", &[], &[])]);
        let second = index("x86_64", vec![pkg("zlib", "1.3.2", &[], &[])]);
        let resolved = IndexResolver::new()
            .resolve(&world(&["zlib"]), &[first.clone(), second.clone()], &[])
            .unwrap();
        assert_eq!(resolved.packages[0].version, "1.3.1");

        let pinned = IndexResolver::new()
            .resolve(&world(&["zlib=1.3.2"]), &[first, second], &[])
            .unwrap();
        assert_eq!(pinned.packages[0].version, "1.3.2");
    }

    #[test]
    fn world_conflicts_are_collected_once() {
        let main = index("x86_64", vec![pkg("a", "1", &["!c"], &[])]);
        let resolved = IndexResolver::new()
            .resolve(&world(&["a", "!c"]), &[main], &[])
            .unwrap();
        assert_eq!(resolved.conflicts, vec!["c"]);
    }

    #[test]
    fn missing_packages_fail() {
        let main = index("x86_64", vec![pkg("a", "1", &["ghost"], &[])]);
        let err = IndexResolver::new()
            .resolve(&world(&["nope"]), &[main.clone()], &[])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Install(InstallError::PackageNotFound { ref package }) if package == "nope"
        ));

        let err = IndexResolver::new()
            .resolve(&world(&["a"]), &[main], &[])
            .unwrap_err();
        assert!(matches!(err, Error::Install(InstallError::ResolutionFailed { .. })));
    }

    #[test]
    fn sibling_architectures_exclude_missing_packages() {
        let main = index(
            "x86_64",
            vec![
                pkg("app", "1", &["libfoo", "intel-ucode"], &[]),
                pkg("libfoo", "1", &[], &[]),
                pkg("intel-ucode", "1", &[], &[]),
            ],
        );
        let sibling = index(
            "aarch64",
            vec![pkg("app", "1", &["libfoo"], &[]), pkg("libfoo", "1", &[], &[])],
        );

        let (tx, mut rx) = kiln_events::channel();
        let resolved = IndexResolver::new()
            .with_event_sender(tx)
            .resolve(&world(&["app"]), &[main.clone()], &[sibling.clone()])
            .unwrap();
        assert_eq!(names(&resolved), vec!["libfoo", "app"]);

        let mut excluded = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let AppEvent::Resolver(ResolverEvent::PackageExcluded { package, missing_arch }) =
                message.event
            {
                excluded.push((package, missing_arch));
            }
        }
        assert_eq!(excluded, vec![("intel-ucode".to_string(), "aarch64".to_string())]);

        let err = IndexResolver::new()
            .resolve(&world(&["intel-ucode"]), &[main], &[sibling])
            .unwrap_err();
        assert!(matches!(err, Error::Install(InstallError::PackageNotFound { .. })));
    }
}
