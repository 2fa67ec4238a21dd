//! Data model for §3.4 File Record and derived views.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub session_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub parent_folder_path: Option<String>,
    pub mime_type: String,
    pub file_size: i64,
    pub content_hash: String,
    pub uploaded_by_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_compressed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub name: String,
    pub path: String,
    pub is_folder: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct IngestSummary {
    pub succeeded: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestProgressEvent {
    pub path: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub file_count: i64,
    pub total_bytes: i64,
}

/// Derive `fileName`/`fileType`/`parentFolderPath` from a normalized
/// `filePath` (§3.4: `fileName == basename(filePath)`,
/// `parentFolderPath == dirname(filePath) or null`).
pub fn split_path(file_path: &str) -> (String, String, Option<String>) {
    let (parent, file_name) = match file_path.rfind('/') {
        Some(idx) => (
            Some(file_path[..idx].to_string()),
            file_path[idx + 1..].to_string(),
        ),
        None => (None, file_path.to_string()),
    };
    let file_type = match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name[idx..].to_string(),
        _ => String::new(),
    };
    (file_name, file_type, parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_path() {
        let (name, ty, parent) = split_path("src/util/io.js");
        assert_eq!(name, "io.js");
        assert_eq!(ty, ".js");
        assert_eq!(parent.as_deref(), Some("src/util"));
    }

    #[test]
    fn splits_top_level_path() {
        let (name, ty, parent) = split_path("main.py");
        assert_eq!(name, "main.py");
        assert_eq!(ty, ".py");
        assert_eq!(parent, None);
    }

    #[test]
    fn dotfile_has_no_extension() {
        let (name, ty, _) = split_path(".gitignore");
        assert_eq!(name, ".gitignore");
        assert_eq!(ty, "");
    }
}
