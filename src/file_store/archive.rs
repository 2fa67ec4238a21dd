//! §4.3 `IngestArchive` — zip enumeration, ignore policy, and the
//! decompression-size cap that defeats zip-bombs.

use crate::security::{is_ignored_entry, normalize_file_path};
use anyhow::{bail, Result};
use std::io::Read;
use zip::ZipArchive;

/// One decoded archive entry, or the reason it was rejected.
pub enum EntryOutcome {
    Stored { path: String, bytes: Vec<u8> },
    Skipped { path: String },
    Failed { path: String, reason: String },
}

/// Synchronously walk a zip archive, enforcing the ignore policy, the
/// allowed-extension allowlist, per-entry size, and the aggregate
/// decompressed-size cap (recommended 10x the archive's compressed size,
/// §4.3). Intended to run inside `spawn_blocking` — the `zip` crate's
/// reader is synchronous.
pub fn enumerate_archive(
    archive_bytes: Vec<u8>,
    archive_compressed_size: u64,
    max_entry_bytes: u64,
    is_allowed_ext: impl Fn(&str) -> bool,
) -> Result<Vec<EntryOutcome>> {
    let cursor = std::io::Cursor::new(archive_bytes);
    let mut zip = ZipArchive::new(cursor)?;

    let max_total_bytes = archive_compressed_size.saturating_mul(10).max(max_entry_bytes);
    let mut total_decompressed: u64 = 0;
    let mut outcomes = Vec::with_capacity(zip.len());

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let raw_name = entry.name().to_string();

        if is_ignored_entry(&raw_name) {
            outcomes.push(EntryOutcome::Skipped { path: raw_name });
            continue;
        }

        let path = match normalize_file_path(&raw_name) {
            Ok(p) => p,
            Err(e) => {
                outcomes.push(EntryOutcome::Failed {
                    path: raw_name,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let ext = path.rfind('.').map(|i| &path[i..]).unwrap_or("");
        if !is_allowed_ext(ext) {
            outcomes.push(EntryOutcome::Failed {
                path,
                reason: format!("unsupported extension: {ext}"),
            });
            continue;
        }

        let declared_size = entry.size();
        if declared_size > max_entry_bytes {
            outcomes.push(EntryOutcome::Failed {
                path,
                reason: "entry exceeds max file size".into(),
            });
            continue;
        }

        total_decompressed += declared_size;
        if total_decompressed > max_total_bytes {
            bail!("archive exceeds decompression cap ({max_total_bytes} bytes)");
        }

        let mut bytes = Vec::with_capacity(declared_size as usize);
        match entry.read_to_end(&mut bytes) {
            Ok(_) if bytes.len() as u64 <= max_entry_bytes => {
                outcomes.push(EntryOutcome::Stored { path, bytes });
            }
            Ok(_) => outcomes.push(EntryOutcome::Failed {
                path,
                reason: "entry exceeds max file size".into(),
            }),
            Err(e) => outcomes.push(EntryOutcome::Failed {
                path,
                reason: e.to_string(),
            }),
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_test_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            for (name, content) in entries {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn stores_allowed_entries_and_skips_ignored() {
        let zip_bytes = build_test_zip(&[
            ("src/main.py", b"print(1)"),
            ("__MACOSX/src/main.py", b"junk"),
            (".DS_Store", b"junk"),
        ]);
        let outcomes = enumerate_archive(zip_bytes, 1024, 50 * 1024 * 1024, |ext| {
            matches!(ext, ".js" | ".java" | ".py")
        })
        .unwrap();

        let stored: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                EntryOutcome::Stored { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stored, vec!["src/main.py"]);

        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, EntryOutcome::Skipped { .. }))
            .count();
        assert_eq!(skipped, 2);
    }

    #[test]
    fn rejects_disallowed_extension() {
        let zip_bytes = build_test_zip(&[("readme.md", b"hello")]);
        let outcomes =
            enumerate_archive(zip_bytes, 1024, 50 * 1024 * 1024, |ext| ext == ".py").unwrap();
        assert!(matches!(outcomes[0], EntryOutcome::Failed { .. }));
    }
}
