//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Longest file name accepted by the workspace.
pub const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceRecord {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: OffsetDateTime,
}

/// Point-in-time copy of a file taken before it was overwritten.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub file_id: Uuid,
    pub name: String,
    pub content: String,
    /// Hex-encoded SHA-256 of `content`.
    pub checksum: String,
    pub created_at: OffsetDateTime,
}
