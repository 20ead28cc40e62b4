#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package installation for kiln
//!
//! Packages are fetched and expanded in parallel, then applied to the
//! target root strictly in the order the resolver produced. Expansion is
//! deduplicated twice: the [`FetchCoordinator`] makes sure one batch never
//! expands the same archive twice, and the on-disk package cache carries
//! expanded packages across runs.

mod apply;
mod coordinator;
mod expander;
mod installer;
mod ownership;

pub use coordinator::{ExpansionResult, FetchCoordinator};
pub use expander::PackageExpander;
pub use installer::Installer;
pub use ownership::OwnershipTracker;

// Re-export EventSender for callers wiring up installers
pub use kiln_events::EventSender;

fn package_tag(pkg: &dyn kiln_types::InstallablePackage) -> kiln_events::PackageTag {
    kiln_events::PackageTag::new(pkg.name(), pkg.checksum())
}
