#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the kiln package engine
//!
//! This crate provides the package records shared by the cache, the
//! installer and the resolver: installable packages from repository
//! indexes, installed-package metadata parsed from `.PKGINFO`, and the
//! headers of files written into a target root.

pub mod file;
pub mod package;
pub mod pkginfo;
pub mod repository;

// Re-export commonly used types
pub use file::{EntryKind, FileHeader};
pub use kiln_hash::Checksum;
pub use package::{Dependency, Package, PackageId};
pub use pkginfo::PkgInfo;
pub use repository::{InstallablePackage, PackageRef, Repository, RepositoryPackage};
