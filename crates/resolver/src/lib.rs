#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Dependency resolution for kiln
//!
//! Repository indexes (`APKINDEX.tar.gz`) are parsed into
//! [`PackageIndex`] values; a [`Resolver`] turns the world constraints into
//! an install order in which every dependency precedes its dependents.

mod graph;
mod index;
mod resolver;

pub use graph::DependencyGraph;
pub use index::{parse_apkindex, PackageIndex};
pub use resolver::{IndexResolver, ResolvedWorld, Resolver};
