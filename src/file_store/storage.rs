//! sqlx-backed persistence for File Records (§3.7).

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRow {
    pub session_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub parent_folder_path: Option<String>,
    #[sqlx(default)]
    pub content: Vec<u8>,
    pub mime_type: String,
    pub file_size: i64,
    pub content_hash: String,
    pub uploaded_by_user_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_compressed: bool,
}

#[derive(Clone)]
pub struct FileStoreDb {
    pool: SqlitePool,
}

impl FileStoreDb {
    pub async fn new(store_uri: &str) -> Result<Self> {
        if let Some(parent) = Path::new(store_uri).parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{store_uri}?mode=rwc"))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        for sql in [include_str!("migrations/001_files.sql")] {
            for stmt in sql.split(';') {
                let stmt = stmt.trim();
                if !stmt.is_empty() {
                    sqlx::query(stmt).execute(pool).await?;
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn put_file(
        &self,
        session_id: &str,
        file_path: &str,
        file_name: &str,
        file_type: &str,
        parent_folder_path: Option<&str>,
        content: &[u8],
        mime_type: &str,
        content_hash: &str,
        uploaded_by_user_id: &str,
        is_compressed: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let existing_created_at = sqlx::query(
            "SELECT created_at FROM files WHERE session_id = ? AND file_path = ?",
        )
        .bind(session_id)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?
        .map(|r| r.try_get::<String, _>("created_at"))
        .transpose()?;
        let created_at = existing_created_at.unwrap_or_else(|| now.to_rfc3339());

        sqlx::query(
            "INSERT INTO files (session_id, file_path, file_name, file_type, \
             parent_folder_path, content, mime_type, file_size, content_hash, \
             uploaded_by_user_id, created_at, updated_at, is_compressed) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(session_id, file_path) DO UPDATE SET \
             file_name = excluded.file_name, file_type = excluded.file_type, \
             parent_folder_path = excluded.parent_folder_path, content = excluded.content, \
             mime_type = excluded.mime_type, file_size = excluded.file_size, \
             content_hash = excluded.content_hash, uploaded_by_user_id = excluded.uploaded_by_user_id, \
             updated_at = excluded.updated_at, is_compressed = excluded.is_compressed",
        )
        .bind(session_id)
        .bind(file_path)
        .bind(file_name)
        .bind(file_type)
        .bind(parent_folder_path)
        .bind(content)
        .bind(mime_type)
        .bind(content.len() as i64)
        .bind(content_hash)
        .bind(uploaded_by_user_id)
        .bind(created_at)
        .bind(now.to_rfc3339())
        .bind(is_compressed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, session_id: &str, file_path: &str) -> Result<Option<FileRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM files WHERE session_id = ? AND file_path = ?",
        )
        .bind(session_id)
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Metadata only, ordered by `filePath` (§4.3). `content` is left empty.
    pub async fn list_session_files(&self, session_id: &str) -> Result<Vec<FileRow>> {
        Ok(sqlx::query_as(
            "SELECT session_id, file_path, file_name, file_type, parent_folder_path, \
             x'' as content, mime_type, file_size, content_hash, uploaded_by_user_id, \
             created_at, updated_at, is_compressed FROM files WHERE session_id = ? \
             ORDER BY file_path ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn delete_file(&self, session_id: &str, file_path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE session_id = ? AND file_path = ?")
            .bind(session_id)
            .bind(file_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_session_files(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM files WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self, session_id: &str) -> Result<(i64, i64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n, COALESCE(SUM(file_size), 0) as total FROM files WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.try_get("n")?, row.try_get("total")?))
    }
}
