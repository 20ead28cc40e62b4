//! Scheme-dispatched fetching of package archives and indexes

mod config;
mod core;
mod retry;
mod stream;
mod validation;

pub use config::{FetchedArchive, RetryConfig};
pub use self::core::Fetcher;
pub use validation::FetchSource;
