#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package database of a target root
//!
//! The database lives inside the root it describes, under
//! `usr/lib/apk/db`, in the plain-text formats apk-tools reads:
//! the installed database, the scripts archive and the trigger registry.
//! World and repository lists live under `etc/apk`.

mod installed;
mod scripts;
mod triggers;
mod world;

pub use installed::{InstalledDb, InstalledPackage};
pub use scripts::{script_entry_name, ScriptsArchive};
pub use triggers::TriggerRegistry;
pub use world::{add_to_world, read_repositories, read_world, write_repositories, write_world};

use std::path::Path;

use kiln_errors::Error;

/// Attach the database path to an I/O failure
pub(crate) fn io_error(path: &str) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |e| Error::io_with_path(&e, Path::new(path))
}
