use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{BackupsRepo, RepoError},
    domain::entities::BackupRecord,
};

use super::{SqliteRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct BackupRow {
    id: Uuid,
    file_id: Uuid,
    name: String,
    content: String,
    checksum: String,
    created_at: OffsetDateTime,
}

impl From<BackupRow> for BackupRecord {
    fn from(row: BackupRow) -> Self {
        Self {
            id: row.id,
            file_id: row.file_id,
            name: row.name,
            content: row.content,
            checksum: row.checksum,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl BackupsRepo for SqliteRepositories {
    async fn get(&self, id: Uuid) -> Result<Option<BackupRecord>, RepoError> {
        let row = sqlx::query_as::<_, BackupRow>(
            r#"
            SELECT id, file_id, name, content, checksum, created_at
            FROM backups
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(BackupRecord::from))
    }

    async fn put(&self, record: &BackupRecord) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO backups (id, file_id, name, content, checksum, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                content = excluded.content,
                checksum = excluded.checksum
            "#,
        )
        .bind(record.id)
        .bind(record.file_id)
        .bind(&record.name)
        .bind(&record.content)
        .bind(&record.checksum)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM backups WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_for_file(&self, file_id: Uuid) -> Result<Vec<BackupRecord>, RepoError> {
        let rows = sqlx::query_as::<_, BackupRow>(
            r#"
            SELECT id, file_id, name, content, checksum, created_at
            FROM backups
            WHERE file_id = ?1
            ORDER BY seq DESC
            "#,
        )
        .bind(file_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BackupRecord::from).collect())
    }

    async fn delete_for_file(&self, file_id: Uuid) -> Result<u64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM backups WHERE file_id = ?1")
            .bind(file_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
