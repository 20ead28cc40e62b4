//! Resolving and fixating the world

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use kiln_errors::{Error, InstallError, OpsError};
use kiln_events::{AppEvent, EventEmitter, InstallEvent};
use kiln_resolver::{PackageIndex, ResolvedWorld};
use kiln_state::{add_to_world, InstalledDb, InstalledPackage};
use kiln_store::ExpandedPackage;
use kiln_types::{PackageRef, Repository, RepositoryPackage};

use crate::database::resolve_db_location;
use crate::types::{InstallReport, PackageSummary};
use crate::{blocking, OpsCtx};

/// Resolve the root's world against its repositories
///
/// Indexes are loaded concurrently for the primary architecture and for
/// every configured sibling architecture.
///
/// # Errors
///
/// Returns `NoRepositories` when none are configured, a network or
/// `InvalidIndex` error if an index cannot be loaded, and the resolver's
/// error for unknown or unsatisfiable constraints.
pub async fn resolve_world(ctx: &OpsCtx) -> Result<ResolvedWorld, Error> {
    let world = ctx.world()?;
    let repositories: Vec<Repository> = ctx
        .repositories()?
        .into_iter()
        .map(Repository::new)
        .collect();
    if repositories.is_empty() {
        return Err(OpsError::NoRepositories.into());
    }

    let indexes = load_indexes(ctx, &repositories, &ctx.arch).await?;
    let sibling_arches: Vec<&str> = ctx
        .config
        .repository
        .sibling_arches
        .iter()
        .map(String::as_str)
        .filter(|arch| *arch != ctx.arch)
        .collect();
    let sibling_indexes = try_join_all(
        sibling_arches
            .iter()
            .map(|arch| load_indexes(ctx, &repositories, arch)),
    )
    .await?
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    ctx.resolver.resolve(&world, &indexes, &sibling_indexes)
}

async fn load_indexes(
    ctx: &OpsCtx,
    repositories: &[Repository],
    arch: &str,
) -> Result<Vec<PackageIndex>, Error> {
    try_join_all(
        repositories
            .iter()
            .map(|repository| PackageIndex::load(&ctx.fetcher, repository, arch, &ctx.scope)),
    )
    .await
}

fn package_refs(packages: &[Arc<RepositoryPackage>]) -> Vec<PackageRef> {
    packages
        .iter()
        .map(|pkg| Arc::clone(pkg) as PackageRef)
        .collect()
}

/// Resolve the world and expand every package without touching the root
///
/// With a cache configured this leaves every package of the world ready
/// for an offline install.
///
/// # Errors
///
/// Returns the first resolution, fetch or expansion failure.
pub async fn calculate_world(
    ctx: &OpsCtx,
) -> Result<Vec<(Arc<RepositoryPackage>, Arc<ExpandedPackage>)>, Error> {
    ctx.with_operation("calculate", || async {
        let resolved = resolve_world(ctx).await?;
        let expanded = ctx
            .installer
            .expand_all(&package_refs(&resolved.packages), &ctx.scope)
            .await?;
        Ok(resolved.packages.into_iter().zip(expanded).collect())
    })
    .await
}

/// Bring the root in line with its world
///
/// Resolves the world, refuses to proceed when a conflicting package is
/// installed, installs everything in dependency order, and finally makes
/// `lib/apk` resolve to the database. Recorded scripts are stamped with
/// `source_date_epoch` when given.
///
/// # Errors
///
/// Returns `InstallError::Conflict` for an installed conflict, the
/// installer's first failure, or `DatabaseLocation` if the legacy
/// location cannot be reconciled.
pub async fn fixate_world(
    ctx: &OpsCtx,
    source_date_epoch: Option<u64>,
) -> Result<InstallReport, Error> {
    ctx.with_operation("fixate", || fixate(ctx, source_date_epoch))
        .await
}

async fn fixate(ctx: &OpsCtx, source_date_epoch: Option<u64>) -> Result<InstallReport, Error> {
    let resolved = resolve_world(ctx).await?;

    let fs = Arc::clone(&ctx.fs);
    let conflicts = resolved.conflicts.clone();
    blocking(move || {
        let db = InstalledDb::new(fs);
        for name in conflicts {
            if db.is_installed(&name)? {
                return Err(InstallError::Conflict { package: name }.into());
            }
        }
        Ok(())
    })
    .await?;

    let installed = ctx
        .installer_for(source_date_epoch)
        .install(&package_refs(&resolved.packages), &ctx.scope)
        .await?;

    // Packages may ship a legacy lib/apk tree, so this runs last
    let fs = Arc::clone(&ctx.fs);
    let location = blocking(move || resolve_db_location(fs.as_ref())).await?;
    ctx.emit(AppEvent::Install(InstallEvent::DatabaseLocationResolved {
        path: kiln_config::constants::LEGACY_APK_DIR.into(),
        action: location.action().to_string(),
    }));

    Ok(InstallReport {
        packages: installed.iter().map(PackageSummary::from).collect(),
        db_location: location.action().to_string(),
    })
}

/// Add `names` to the world file and fixate the result
///
/// # Errors
///
/// Returns `NoPackagesSpecified` for an empty list, `InvalidWorld` for
/// malformed names, and any [`fixate_world`] failure.
pub async fn add_packages(
    ctx: &OpsCtx,
    names: &[String],
    source_date_epoch: Option<u64>,
) -> Result<InstallReport, Error> {
    if names.is_empty() {
        return Err(OpsError::NoPackagesSpecified.into());
    }
    let fs = Arc::clone(&ctx.fs);
    let names = names.to_vec();
    let world = blocking(move || add_to_world(fs.as_ref(), &names)).await?;
    ctx.emit_debug_with_context(
        "world updated",
        HashMap::from([("world".to_string(), world.join(" "))]),
    );
    fixate_world(ctx, source_date_epoch).await
}

/// Packages recorded in the root's installed database
///
/// # Errors
///
/// Returns an error if the database cannot be read or parsed.
pub async fn list_installed(ctx: &OpsCtx) -> Result<Vec<InstalledPackage>, Error> {
    let fs = Arc::clone(&ctx.fs);
    blocking(move || InstalledDb::new(fs).read_all()).await
}

