// SPDX-License-Identifier: MIT
//! Security utilities.
//!
//! Guards against path traversal and unsafe file paths in the Session-Scoped
//! File Store (§4.3) and archive ingestion.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Basenames ignored by archive ingestion (§4.3 ignore policy).
const IGNORED_BASENAMES: &[&str] = &["__MACOSX", ".DS_Store", "Thumbs.db"];

/// Validate that `path` is within `base_dir` (no traversal attacks).
///
/// Resolves `.`/`..` without requiring the path to exist, then checks the
/// normalized path still starts with `base_dir`.
pub fn safe_path(base_dir: &Path, relative_path: &Path) -> Result<PathBuf> {
    if relative_path.is_absolute() {
        bail!(
            "path traversal: absolute path not allowed: {}",
            relative_path.display()
        );
    }

    let joined = base_dir.join(relative_path);
    let normalized = normalize_path(&joined);

    let base_normalized = normalize_path(base_dir);
    if !normalized.starts_with(&base_normalized) {
        bail!(
            "path traversal: {} escapes base directory {}",
            relative_path.display(),
            base_dir.display()
        );
    }

    Ok(normalized)
}

/// Normalize a path by resolving `.` and `..` components without requiring
/// the path to exist on disk (unlike std::fs::canonicalize).
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        use std::path::Component::*;
        match component {
            ParentDir => {
                if matches!(components.last(), Some(Normal(_))) {
                    components.pop();
                }
            }
            CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Normalize a client-supplied `filePath` for the File Store (§4.3):
/// backslashes become forward slashes, a leading slash is stripped, and any
/// `..` segment is rejected outright rather than silently resolved away —
/// unlike `safe_path`, there is no base directory to re-anchor into.
pub fn normalize_file_path(raw: &str) -> Result<String> {
    let replaced = raw.replace('\\', "/");
    let trimmed = replaced.trim_start_matches('/');

    if trimmed.is_empty() {
        bail!("file path must not be empty");
    }

    for segment in trimmed.split('/') {
        if segment == ".." {
            bail!("file path must not contain '..' segments: {}", raw);
        }
        if segment.is_empty() {
            bail!("file path must not contain empty segments: {}", raw);
        }
    }

    Ok(trimmed.to_string())
}

/// Whether an archive entry should be skipped during ingestion (§4.3 ignore
/// policy): `__MACOSX`, `.DS_Store`, `Thumbs.db`, and any `._*` AppleDouble
/// sidecar, matched against the entry's basename.
pub fn is_ignored_entry(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    normalized.split('/').any(|segment| {
        IGNORED_BASENAMES.contains(&segment) || segment.starts_with("._")
    })
}

/// Validate that a session ID is a valid UUID (no injection possible).
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.len() != 36 {
        bail!("invalid session ID length: {}", id.len());
    }
    for (i, c) in id.chars().enumerate() {
        let is_dash = matches!(i, 8 | 13 | 18 | 23);
        if is_dash {
            if c != '-' {
                bail!("invalid session ID format at position {}", i);
            }
        } else if !c.is_ascii_hexdigit() {
            bail!("invalid session ID character at position {}: {}", i, c);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_safe_path_normal() {
        let base = Path::new("/home/user/repo");
        let result = safe_path(base, Path::new("src/main.rs")).unwrap();
        assert_eq!(result, PathBuf::from("/home/user/repo/src/main.rs"));
    }

    #[test]
    fn test_safe_path_traversal_blocked() {
        let base = Path::new("/home/user/repo");
        let result = safe_path(base, Path::new("../../etc/passwd"));
        assert!(result.is_err(), "path traversal should be blocked");
    }

    #[test]
    fn test_safe_path_absolute_blocked() {
        let base = Path::new("/home/user/repo");
        let result = safe_path(base, Path::new("/etc/passwd"));
        assert!(result.is_err(), "absolute paths should be blocked");
    }

    #[test]
    fn test_normalize_path() {
        let p = Path::new("/a/b/../c/./d");
        assert_eq!(normalize_path(p), PathBuf::from("/a/c/d"));
    }

    #[test]
    fn test_validate_session_id_valid() {
        assert!(validate_session_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn test_validate_session_id_invalid() {
        assert!(validate_session_id("not-a-uuid").is_err());
        assert!(validate_session_id("550e8400-e29b-41d4-a716-44665544000X").is_err());
    }

    #[test]
    fn test_normalize_file_path_strips_leading_slash_and_backslashes() {
        assert_eq!(normalize_file_path("/src/main.py").unwrap(), "src/main.py");
        assert_eq!(
            normalize_file_path("src\\util\\io.js").unwrap(),
            "src/util/io.js"
        );
    }

    #[test]
    fn test_normalize_file_path_rejects_dotdot() {
        assert!(normalize_file_path("../etc/passwd").is_err());
        assert!(normalize_file_path("src/../../etc/passwd").is_err());
    }

    #[test]
    fn test_normalize_file_path_rejects_empty() {
        assert!(normalize_file_path("").is_err());
        assert!(normalize_file_path("//").is_err());
    }

    #[test]
    fn test_is_ignored_entry() {
        assert!(is_ignored_entry("__MACOSX/src/main.py"));
        assert!(is_ignored_entry("src/.DS_Store"));
        assert!(is_ignored_entry("Thumbs.db"));
        assert!(is_ignored_entry("src/._main.py"));
        assert!(!is_ignored_entry("src/main.py"));
    }
}
