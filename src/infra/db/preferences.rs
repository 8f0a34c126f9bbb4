use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::{
    application::repos::{PreferencesRepo, RepoError},
    domain::entities::PreferenceRecord,
};

use super::{SqliteRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    key: String,
    value: Json<serde_json::Value>,
    updated_at: OffsetDateTime,
}

impl From<PreferenceRow> for PreferenceRecord {
    fn from(row: PreferenceRow) -> Self {
        Self {
            key: row.key,
            value: row.value.0,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PreferencesRepo for SqliteRepositories {
    async fn get(&self, key: &str) -> Result<Option<PreferenceRecord>, RepoError> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            "SELECT key, value, updated_at FROM preferences WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PreferenceRecord::from))
    }

    async fn put(&self, record: &PreferenceRecord) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO preferences (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.key)
        .bind(Json(&record.value))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM preferences WHERE key = ?1")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<PreferenceRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PreferenceRow>(
            "SELECT key, value, updated_at FROM preferences ORDER BY key ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PreferenceRecord::from).collect())
    }
}
