//! Offline cache for the app shell and remote map tiles.
//!
//! Two kinds of cache live side by side under one storage root:
//! - the versioned app-shell cache (`walk_app_cache_<version>`), filled at
//!   install time from a fixed manifest and wholly replaced on a version bump;
//! - the unversioned tile cache, filled lazily on first successful fetch and
//!   never evicted.

pub mod fetch;
pub mod manager;
pub mod storage;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use fetch::{FetchError, Fetcher, HttpFetcher, Request, Response, ResponseSource};
pub use manager::{CacheRole, CacheStatus, CacheSummary, InstallReport, OfflineCache};
pub use storage::{CacheStorage, NamedCache};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Network(#[from] FetchError),

    #[error("Cache storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry at {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),

    #[error("Installing {cache} failed: {reason}")]
    InstallFailed { cache: String, reason: String },

    #[error("Cache {0} is not installed")]
    NotInstalled(String),
}

impl CacheError {
    pub(crate) fn storage(path: &Path, source: std::io::Error) -> Self {
        CacheError::Storage {
            path: path.to_path_buf(),
            source,
        }
    }
}
