#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Target filesystem abstraction for kiln
//!
//! The installer never touches `std::fs` directly. It writes through a
//! [`TargetFs`], addressed with paths relative to the root being managed:
//! - [`DirFs`] maps those paths onto a real directory
//! - [`MemFs`] keeps the tree in memory and implements the optional
//!   [`WriteHeader`] capability, recording lazy references into expanded
//!   package data instead of copying it
//!
//! All operations are blocking; callers run them off the async runtime.

mod dir;
pub mod filesystem;
mod mem;

pub use dir::DirFs;
pub use filesystem::{ContentSource, DirEntry, FileKind, FsMetadata, TargetFs, WriteHeader};
pub use mem::MemFs;
