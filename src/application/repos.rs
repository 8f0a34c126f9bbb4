//! Repository traits describing persistence adapters.
//!
//! Every method is one unit of work: reads run as single statements and
//! writes commit their own transaction before returning.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{BackupRecord, FileRecord, PreferenceRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait FilesRepo: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, RepoError>;

    /// Insert or replace the record with the same id.
    async fn put(&self, record: &FileRecord) -> Result<(), RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    /// All files, most recently updated first.
    async fn get_all(&self) -> Result<Vec<FileRecord>, RepoError>;
}

#[async_trait]
pub trait PreferencesRepo: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PreferenceRecord>, RepoError>;

    async fn put(&self, record: &PreferenceRecord) -> Result<(), RepoError>;

    async fn delete(&self, key: &str) -> Result<(), RepoError>;

    /// All preferences ordered by key.
    async fn get_all(&self) -> Result<Vec<PreferenceRecord>, RepoError>;
}

#[async_trait]
pub trait BackupsRepo: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<BackupRecord>, RepoError>;

    async fn put(&self, record: &BackupRecord) -> Result<(), RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    /// Backups of one file, newest first.
    async fn list_for_file(&self, file_id: Uuid) -> Result<Vec<BackupRecord>, RepoError>;

    /// Remove every backup of `file_id`, returning how many were deleted.
    async fn delete_for_file(&self, file_id: Uuid) -> Result<u64, RepoError>;
}
