//! §4.3 File Store — durable per-session file content and hierarchy,
//! archive ingestion, and the transactional updates the Persistence Worker
//! relies on.

pub mod archive;
pub mod hierarchy;
pub mod model;
pub mod storage;

use crate::errors::{HubError, HubResult};
use crate::security::normalize_file_path;
use archive::EntryOutcome;
use chrono::Utc;
use model::{split_path, FileRecord, FileStats, HierarchyNode, IngestProgressEvent, IngestSummary};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::sync::Arc;
use storage::{FileRow, FileStoreDb};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

pub struct FileStore {
    db: FileStoreDb,
    compression_threshold_bytes: u64,
    allowed_ext: Vec<String>,
    max_file_bytes: u64,
}

impl FileStore {
    pub async fn new(
        store_uri: &str,
        compression_threshold_bytes: u64,
        allowed_ext: Vec<String>,
        max_file_bytes: u64,
    ) -> HubResult<Arc<Self>> {
        let db = FileStoreDb::new(store_uri).await.map_err(HubError::Internal)?;
        Ok(Arc::new(Self {
            db,
            compression_threshold_bytes,
            allowed_ext,
            max_file_bytes,
        }))
    }

    pub fn is_allowed_ext(&self, ext: &str) -> bool {
        self.allowed_ext.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(bytes)?;
        encoder.finish()
    }

    fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = flate2::read::DeflateDecoder::new(bytes);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn row_to_record(row: &FileRow) -> FileRecord {
        FileRecord {
            session_id: row.session_id.clone(),
            file_path: row.file_path.clone(),
            file_name: row.file_name.clone(),
            file_type: row.file_type.clone(),
            parent_folder_path: row.parent_folder_path.clone(),
            mime_type: row.mime_type.clone(),
            file_size: row.file_size,
            content_hash: row.content_hash.clone(),
            uploaded_by_user_id: row.uploaded_by_user_id.clone(),
            created_at: parse_ts(&row.created_at),
            updated_at: parse_ts(&row.updated_at),
            is_compressed: row.is_compressed,
        }
    }

    /// Upsert by `(sessionId, filePath)`. Atomic: a concurrent reader either
    /// sees the prior version or the new one (§4.3).
    pub async fn put_file(
        &self,
        session_id: &str,
        raw_file_path: &str,
        content: Vec<u8>,
        mime_type: &str,
        uploader_user_id: &str,
    ) -> HubResult<FileRecord> {
        let file_path =
            normalize_file_path(raw_file_path).map_err(|e| HubError::ValidationError(e.to_string()))?;
        let (file_name, file_type, parent_folder_path) = split_path(&file_path);

        if !self.is_allowed_ext(&file_type) {
            return Err(HubError::UnsupportedMediaType(file_type));
        }
        if content.len() as u64 > self.max_file_bytes {
            return Err(HubError::TooLarge);
        }

        let content_hash = hex::encode(Sha256::digest(&content));
        let original_len = content.len() as i64;

        let (stored_bytes, is_compressed) = if content.len() as u64 > self.compression_threshold_bytes
        {
            match Self::compress(&content) {
                Ok(compressed) => (compressed, true),
                Err(e) => {
                    warn!(err = %e, "compression failed, storing raw");
                    (content, false)
                }
            }
        } else {
            (content, false)
        };

        let now = Utc::now();
        self.db
            .put_file(
                session_id,
                &file_path,
                &file_name,
                &file_type,
                parent_folder_path.as_deref(),
                &stored_bytes,
                mime_type,
                &content_hash,
                uploader_user_id,
                is_compressed,
                now,
            )
            .await
            .map_err(HubError::Internal)?;

        let row = self
            .db
            .get_file(session_id, &file_path)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::Internal(anyhow::anyhow!("file vanished after put")))?;
        let mut record = Self::row_to_record(&row);
        record.file_size = original_len;
        Ok(record)
    }

    pub async fn get_file(
        &self,
        session_id: &str,
        raw_file_path: &str,
    ) -> HubResult<(Vec<u8>, FileRecord)> {
        let file_path =
            normalize_file_path(raw_file_path).map_err(|e| HubError::ValidationError(e.to_string()))?;
        let row = self
            .db
            .get_file(session_id, &file_path)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::NotFound("file".into()))?;

        let bytes = if row.is_compressed {
            Self::decompress(&row.content).map_err(|e| HubError::Internal(e.into()))?
        } else {
            row.content.clone()
        };
        Ok((bytes, Self::row_to_record(&row)))
    }

    /// Reads the current text content for room initialization (§4.5
    /// seeding), decoded as UTF-8 lossily — non-UTF-8 file content cannot
    /// seed a text CRDT document.
    pub async fn get_text(&self, session_id: &str, file_path: &str) -> HubResult<String> {
        let (bytes, _) = self.get_file(session_id, file_path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn list_session_files(&self, session_id: &str) -> HubResult<Vec<FileRecord>> {
        let rows = self
            .db
            .list_session_files(session_id)
            .await
            .map_err(HubError::Internal)?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    pub async fn get_hierarchy(&self, session_id: &str) -> HubResult<Vec<HierarchyNode>> {
        let rows = self
            .db
            .list_session_files(session_id)
            .await
            .map_err(HubError::Internal)?;
        let paths: Vec<String> = rows.into_iter().map(|r| r.file_path).collect();
        Ok(hierarchy::build_hierarchy(&paths))
    }

    pub async fn delete_file(&self, session_id: &str, raw_file_path: &str) -> HubResult<bool> {
        let file_path =
            normalize_file_path(raw_file_path).map_err(|e| HubError::ValidationError(e.to_string()))?;
        self.db
            .delete_file(session_id, &file_path)
            .await
            .map_err(HubError::Internal)
    }

    pub async fn delete_session_files(&self, session_id: &str) -> HubResult<u64> {
        self.db
            .delete_session_files(session_id)
            .await
            .map_err(HubError::Internal)
    }

    pub async fn stats(&self, session_id: &str) -> HubResult<FileStats> {
        let (file_count, total_bytes) = self.db.stats(session_id).await.map_err(HubError::Internal)?;
        Ok(FileStats {
            file_count,
            total_bytes,
        })
    }

    /// Enumerates `archiveBytes`, storing every allowed entry and streaming
    /// one progress event per processed entry; resolves to a
    /// `{succeeded, failed}` summary (§4.3). Ignored system files are
    /// neither a success nor a failure.
    pub fn ingest_archive(
        self: &Arc<Self>,
        session_id: String,
        archive_bytes: Vec<u8>,
        uploader_user_id: String,
    ) -> (ReceiverStream<IngestProgressEvent>, tokio::task::JoinHandle<HubResult<IngestSummary>>) {
        let (tx, rx) = mpsc::channel(32);
        let store = Arc::clone(self);
        let archive_size = archive_bytes.len() as u64;
        let max_entry_bytes = self.max_file_bytes;
        let allowed_ext = self.allowed_ext.clone();

        let handle = tokio::spawn(async move {
            let outcomes = tokio::task::spawn_blocking(move || {
                archive::enumerate_archive(archive_bytes, archive_size, max_entry_bytes, |ext| {
                    allowed_ext.iter().any(|e| e.eq_ignore_ascii_case(ext))
                })
            })
            .await
            .map_err(|e| HubError::Internal(e.into()))?
            .map_err(HubError::Internal)?;

            let mut summary = IngestSummary::default();
            for outcome in outcomes {
                match outcome {
                    EntryOutcome::Stored { path, bytes } => {
                        let mime_type = mime_type_for(&path);
                        match store
                            .put_file(&session_id, &path, bytes, mime_type, &uploader_user_id)
                            .await
                        {
                            Ok(_) => {
                                summary.succeeded += 1;
                                let _ = tx
                                    .send(IngestProgressEvent {
                                        path,
                                        ok: true,
                                        error: None,
                                    })
                                    .await;
                            }
                            Err(e) => {
                                summary.failed += 1;
                                let _ = tx
                                    .send(IngestProgressEvent {
                                        path,
                                        ok: false,
                                        error: Some(e.to_string()),
                                    })
                                    .await;
                            }
                        }
                    }
                    EntryOutcome::Failed { path, reason } => {
                        summary.failed += 1;
                        let _ = tx
                            .send(IngestProgressEvent {
                                path,
                                ok: false,
                                error: Some(reason),
                            })
                            .await;
                    }
                    EntryOutcome::Skipped { .. } => {}
                }
            }
            Ok(summary)
        });

        (ReceiverStream::new(rx), handle)
    }
}

pub(crate) fn mime_type_for(path: &str) -> &'static str {
    match path.rfind('.').map(|i| &path[i..]) {
        Some(".js") => "text/javascript",
        Some(".java") => "text/x-java-source",
        Some(".py") => "text/x-python",
        _ => "application/octet-stream",
    }
}

fn parse_ts(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = FileStore::new(
            ":memory:",
            64 * 1024,
            vec![".js".into(), ".py".into(), ".java".into(), ".zip".into()],
            MAX_UPLOAD_BYTES,
        )
        .await
        .unwrap();

        store
            .put_file("s1", "src/main.py", b"print(1)".to_vec(), "text/x-python", "u1")
            .await
            .unwrap();

        let (bytes, record) = store.get_file("s1", "src/main.py").await.unwrap();
        assert_eq!(bytes, b"print(1)");
        assert_eq!(record.file_name, "main.py");
        assert_eq!(record.parent_folder_path.as_deref(), Some("src"));
    }

    #[tokio::test]
    async fn rejects_disallowed_extension() {
        let store = FileStore::new(":memory:", 64 * 1024, vec![".py".into()], MAX_UPLOAD_BYTES)
            .await
            .unwrap();
        let err = store
            .put_file("s1", "evil.exe", b"x".to_vec(), "application/octet-stream", "u1")
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn compresses_large_content() {
        let store = FileStore::new(":memory:", 16, vec![".py".into()], MAX_UPLOAD_BYTES)
            .await
            .unwrap();
        let content = vec![b'a'; 1024];
        store
            .put_file("s1", "big.py", content.clone(), "text/x-python", "u1")
            .await
            .unwrap();
        let (bytes, record) = store.get_file("s1", "big.py").await.unwrap();
        assert!(record.is_compressed);
        assert_eq!(bytes, content);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = FileStore::new(":memory:", 64 * 1024, vec![".py".into()], MAX_UPLOAD_BYTES)
            .await
            .unwrap();
        store
            .put_file("s1", "a.py", b"x".to_vec(), "text/x-python", "u1")
            .await
            .unwrap();
        assert!(store.delete_file("s1", "a.py").await.unwrap());
        assert!(!store.delete_file("s1", "a.py").await.unwrap());
    }
}
