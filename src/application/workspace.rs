//! Editor-facing operations over the persistence gateway.

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{BackupsRepo, FilesRepo, PreferencesRepo, RepoError};
use crate::domain::entities::{BackupRecord, FileRecord, MAX_FILE_NAME_LEN, PreferenceRecord};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl WorkspaceError {
    fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct WorkspaceService {
    files: Arc<dyn FilesRepo>,
    preferences: Arc<dyn PreferencesRepo>,
    backups: Arc<dyn BackupsRepo>,
    max_backups_per_file: usize,
}

impl WorkspaceService {
    pub fn new(
        files: Arc<dyn FilesRepo>,
        preferences: Arc<dyn PreferencesRepo>,
        backups: Arc<dyn BackupsRepo>,
        max_backups_per_file: usize,
    ) -> Self {
        Self {
            files,
            preferences,
            backups,
            max_backups_per_file,
        }
    }

    pub async fn create_file(
        &self,
        name: &str,
        content: impl Into<String>,
    ) -> Result<FileRecord, WorkspaceError> {
        let name = validate_file_name(name)?;
        let now = OffsetDateTime::now_utc();
        let record = FileRecord {
            id: Uuid::new_v4(),
            name,
            content: content.into(),
            created_at: now,
            updated_at: now,
        };
        self.files.put(&record).await?;

        info!(
            target = "application::workspace::create_file",
            file_id = %record.id,
            name = %record.name,
            "File created"
        );
        Ok(record)
    }

    pub async fn open_file(&self, id: Uuid) -> Result<FileRecord, WorkspaceError> {
        self.files
            .get(id)
            .await?
            .ok_or_else(|| WorkspaceError::not_found("file", id))
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>, WorkspaceError> {
        self.files.get_all().await.map_err(WorkspaceError::from)
    }

    /// Replace a file's content. When the content changes, the previous
    /// version is kept as a backup first.
    pub async fn save_file(
        &self,
        id: Uuid,
        content: impl Into<String>,
    ) -> Result<FileRecord, WorkspaceError> {
        let content = content.into();
        let mut record = self.open_file(id).await?;
        if record.content == content {
            debug!(
                target = "application::workspace::save_file",
                file_id = %id,
                "Content unchanged; skipping write"
            );
            return Ok(record);
        }

        self.snapshot(&record).await?;

        record.content = content;
        record.updated_at = OffsetDateTime::now_utc();
        self.files.put(&record).await?;

        info!(
            target = "application::workspace::save_file",
            file_id = %id,
            bytes = record.content.len(),
            "File saved"
        );
        Ok(record)
    }

    pub async fn rename_file(&self, id: Uuid, name: &str) -> Result<FileRecord, WorkspaceError> {
        let name = validate_file_name(name)?;
        let mut record = self.open_file(id).await?;
        record.name = name;
        record.updated_at = OffsetDateTime::now_utc();
        self.files.put(&record).await?;
        Ok(record)
    }

    /// Delete a file together with all of its backups.
    pub async fn delete_file(&self, id: Uuid) -> Result<(), WorkspaceError> {
        self.open_file(id).await?;
        let removed = self.backups.delete_for_file(id).await?;
        self.files.delete(id).await.map_err(|err| match err {
            RepoError::NotFound => WorkspaceError::not_found("file", id),
            other => other.into(),
        })?;

        info!(
            target = "application::workspace::delete_file",
            file_id = %id,
            backups_removed = removed,
            "File deleted"
        );
        Ok(())
    }

    pub async fn set_preference(
        &self,
        key: &str,
        value: Value,
    ) -> Result<PreferenceRecord, WorkspaceError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(WorkspaceError::Validation(
                "preference key must not be empty".to_string(),
            ));
        }
        let record = PreferenceRecord {
            key: key.to_string(),
            value,
            updated_at: OffsetDateTime::now_utc(),
        };
        self.preferences.put(&record).await?;
        Ok(record)
    }

    pub async fn preference(&self, key: &str) -> Result<Option<Value>, WorkspaceError> {
        Ok(self
            .preferences
            .get(key.trim())
            .await?
            .map(|record| record.value))
    }

    pub async fn preferences(&self) -> Result<Vec<PreferenceRecord>, WorkspaceError> {
        self.preferences
            .get_all()
            .await
            .map_err(WorkspaceError::from)
    }

    /// Backups of `file_id`, newest first.
    pub async fn backups(&self, file_id: Uuid) -> Result<Vec<BackupRecord>, WorkspaceError> {
        self.backups
            .list_for_file(file_id)
            .await
            .map_err(WorkspaceError::from)
    }

    /// Put a backup's content back into its file. The content being replaced
    /// is itself backed up, so a restore can be undone.
    pub async fn restore_backup(&self, backup_id: Uuid) -> Result<FileRecord, WorkspaceError> {
        let backup = self
            .backups
            .get(backup_id)
            .await?
            .ok_or_else(|| WorkspaceError::not_found("backup", backup_id))?;

        if checksum(&backup.content) != backup.checksum {
            return Err(RepoError::Integrity {
                message: format!("backup `{backup_id}` content does not match its checksum"),
            }
            .into());
        }

        let record = self.save_file(backup.file_id, backup.content).await?;
        info!(
            target = "application::workspace::restore_backup",
            file_id = %record.id,
            backup_id = %backup_id,
            "Backup restored"
        );
        Ok(record)
    }

    async fn snapshot(&self, record: &FileRecord) -> Result<(), WorkspaceError> {
        let backup = BackupRecord {
            id: Uuid::new_v4(),
            file_id: record.id,
            name: record.name.clone(),
            checksum: checksum(&record.content),
            content: record.content.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.backups.put(&backup).await?;
        self.prune_backups(record.id).await
    }

    async fn prune_backups(&self, file_id: Uuid) -> Result<(), WorkspaceError> {
        let backups = self.backups.list_for_file(file_id).await?;
        let mut pruned = 0usize;
        for stale in backups.iter().skip(self.max_backups_per_file) {
            self.backups.delete(stale.id).await?;
            pruned += 1;
        }
        if pruned > 0 {
            debug!(
                target = "application::workspace::prune_backups",
                file_id = %file_id,
                pruned,
                "Old backups pruned"
            );
        }
        Ok(())
    }
}

/// Hex-encoded SHA-256 of `content`.
pub fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn validate_file_name(name: &str) -> Result<String, WorkspaceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WorkspaceError::Validation(
            "file name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(WorkspaceError::Validation(format!(
            "file name must be at most {MAX_FILE_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}
