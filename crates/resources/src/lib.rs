#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Resource management for kiln
//!
//! Worker-pool limits, the expansion semaphore and the cancellation scope
//! shared by every task of an install batch.

mod cancel;
mod limits;
mod manager;

pub use cancel::CancelScope;
pub use limits::ResourceLimits;
pub use manager::{acquire_semaphore_permit, ResourceManager};
