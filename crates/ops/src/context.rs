//! Operations context for dependency injection

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use kiln_config::constants::ARCH_FILE;
use kiln_config::{host_arch, Config};
use kiln_errors::{Error, OpsError};
use kiln_events::{EventEmitter, EventSender, FailureContext};
use kiln_install::{Installer, PackageExpander};
use kiln_net::{Fetcher, NetConfig};
use kiln_platform::{DirFs, TargetFs};
use kiln_resolver::{IndexResolver, Resolver};
use kiln_resources::{CancelScope, ResourceLimits};
use kiln_store::PackageCache;

/// Operations context providing access to all system components
pub struct OpsCtx {
    /// Root being managed
    pub fs: Arc<dyn TargetFs>,
    /// System configuration
    pub config: Config,
    /// Primary architecture
    pub arch: String,
    /// Transport shared by index loads and package fetches
    pub fetcher: Fetcher,
    pub installer: Installer,
    pub resolver: Arc<dyn Resolver>,
    /// Event sender for progress reporting
    pub tx: EventSender,
    /// Cancelling this scope stops every operation run with the context
    pub scope: CancelScope,
}

impl EventEmitter for OpsCtx {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.tx)
    }
}

impl OpsCtx {
    /// Repositories from `etc/apk/repositories` followed by configured ones
    ///
    /// # Errors
    ///
    /// Returns an error if the repositories file cannot be read.
    pub fn repositories(&self) -> Result<Vec<String>, Error> {
        let mut repositories = kiln_state::read_repositories(self.fs.as_ref())?;
        for extra in &self.config.repository.repositories {
            if !repositories.contains(extra) {
                repositories.push(extra.clone());
            }
        }
        Ok(repositories)
    }

    /// World constraints: the configured override, or `etc/apk/world`
    ///
    /// # Errors
    ///
    /// Returns an error if the world file cannot be read.
    pub fn world(&self) -> Result<Vec<String>, Error> {
        if self.config.repository.world.is_empty() {
            kiln_state::read_world(self.fs.as_ref())
        } else {
            Ok(self.config.repository.world.clone())
        }
    }

    /// Run `operation`, reporting its start and outcome as events
    ///
    /// # Errors
    ///
    /// Returns the operation's error unchanged.
    pub async fn with_operation<F, Fut, T>(&self, name: &str, operation: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.emit_operation_started(name);
        match operation().await {
            Ok(value) => {
                self.emit_operation_completed(name, true);
                Ok(value)
            }
            Err(e) => {
                self.emit_operation_failed(name, FailureContext::from_error(&e));
                Err(e)
            }
        }
    }

    /// Installer that stamps recorded scripts with `source_date_epoch`
    ///
    /// Shares the expansion coordinator with the context's installer.
    #[must_use]
    pub fn installer_for(&self, source_date_epoch: Option<u64>) -> Installer {
        self.installer
            .clone()
            .with_source_date_epoch(source_date_epoch)
    }
}

/// Builder for operations context
#[derive(Default)]
pub struct OpsContextBuilder {
    fs: Option<Arc<dyn TargetFs>>,
    config: Option<Config>,
    arch: Option<String>,
    fetcher: Option<Fetcher>,
    resolver: Option<Arc<dyn Resolver>>,
    tx: Option<EventSender>,
    scope: Option<CancelScope>,
}

impl OpsContextBuilder {
    /// Create new context builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target filesystem; defaults to the configured root on disk
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn TargetFs>) -> Self {
        self.fs = Some(fs);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the primary architecture
    #[must_use]
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set event sender
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    #[must_use]
    pub fn with_cancel_scope(mut self, scope: CancelScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Build the context
    ///
    /// Missing components get defaults derived from the configuration:
    /// a [`DirFs`] over the configured root, a fetcher from the network
    /// settings, the [`IndexResolver`], and a package cache when a cache
    /// directory is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if no event sender was given or the default
    /// fetcher cannot be created.
    pub fn build(self) -> Result<OpsCtx, Error> {
        let tx = self.tx.ok_or_else(|| OpsError::InitializationFailed {
            message: "no event sender configured".to_string(),
        })?;
        let config = self.config.unwrap_or_default();

        let fs = self
            .fs
            .unwrap_or_else(|| Arc::new(DirFs::new(config.root())) as Arc<dyn TargetFs>);
        let arch = match self.arch.or_else(|| config.repository.arch.clone()) {
            Some(arch) => arch,
            None => recorded_arch(fs.as_ref()).unwrap_or_else(|| host_arch().to_string()),
        };

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Fetcher::new(NetConfig::from(&config.network))?,
        }
        .with_event_sender(tx.clone());

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(IndexResolver::new().with_event_sender(tx.clone())));

        let cache = config.cache_dir().map(PackageCache::new);
        let expander = PackageExpander::new(fetcher.clone(), cache);
        let installer = Installer::new(Arc::clone(&fs), expander)
            .with_limits(ResourceLimits::from_jobs(config.jobs()))
            .with_event_sender(tx.clone());

        Ok(OpsCtx {
            fs,
            config,
            arch,
            fetcher,
            installer,
            resolver,
            tx,
            scope: self.scope.unwrap_or_default(),
        })
    }
}

/// Architecture recorded in `etc/apk/arch` by a previous init
fn recorded_arch(fs: &dyn TargetFs) -> Option<String> {
    let bytes = fs.read(Path::new(ARCH_FILE)).ok()?;
    let arch = String::from_utf8_lossy(&bytes).trim().to_string();
    (!arch.is_empty()).then_some(arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_platform::MemFs;

    #[test]
    fn builder_requires_an_event_sender() {
        let err = OpsContextBuilder::new()
            .with_fs(Arc::new(MemFs::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Ops(OpsError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn arch_prefers_override_then_config_then_root() {
        let (tx, _rx) = kiln_events::channel();
        let fs = Arc::new(MemFs::new());
        fs.create_dir_all(Path::new("etc/apk"), 0o755).unwrap();
        fs.write(Path::new(ARCH_FILE), b"riscv64\n", 0o644).unwrap();

        let ctx = OpsContextBuilder::new()
            .with_fs(fs.clone())
            .with_event_sender(tx.clone())
            .build()
            .unwrap();
        assert_eq!(ctx.arch, "riscv64");

        let mut config = Config::default();
        config.repository.arch = Some("aarch64".to_string());
        let ctx = OpsContextBuilder::new()
            .with_fs(fs.clone())
            .with_config(config.clone())
            .with_event_sender(tx.clone())
            .build()
            .unwrap();
        assert_eq!(ctx.arch, "aarch64");

        let ctx = OpsContextBuilder::new()
            .with_fs(fs)
            .with_config(config)
            .with_arch("x86_64")
            .with_event_sender(tx)
            .build()
            .unwrap();
        assert_eq!(ctx.arch, "x86_64");
    }

    #[test]
    fn configured_repositories_follow_the_root_list() {
        let (tx, _rx) = kiln_events::channel();
        let fs = Arc::new(MemFs::new());
        fs.create_dir_all(Path::new("etc/apk"), 0o755).unwrap();
        kiln_state::write_repositories(fs.as_ref(), &["/srv/main".to_string()]).unwrap();

        let mut config = Config::default();
        config.repository.repositories =
            vec!["/srv/main".to_string(), "https://dl.example.org/community".to_string()];
        config.repository.world = vec!["busybox".to_string()];
        let ctx = OpsContextBuilder::new()
            .with_fs(fs)
            .with_config(config)
            .with_event_sender(tx)
            .build()
            .unwrap();

        assert_eq!(
            ctx.repositories().unwrap(),
            vec!["/srv/main", "https://dl.example.org/community"]
        );
        assert_eq!(ctx.world().unwrap(), vec!["busybox"]);
    }
}
