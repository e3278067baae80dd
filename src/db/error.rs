//! Error types for the pin store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be created, opened or initialized.
    #[error("Pin storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The database was written by a newer build; opening it would risk the data.
    #[error("Pin store schema version {found} is newer than supported version {supported}")]
    UpgradeBlocked { found: i64, supported: i64 },

    #[error("Invalid pin: {0}")]
    InvalidPin(String),

    #[error("Write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("Read failed: {0}")]
    Read(#[source] rusqlite::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn unavailable(context: &str, err: impl std::fmt::Display) -> Self {
        StoreError::StorageUnavailable(format!("{}: {}", context, err))
    }
}
