//! Store directory diagnostics
//!
//! A debugging view of the store directory: every entry with its size,
//! modification time and store role, plus the last fallback sync time.
//! Unlike the sync engine this listing includes hidden entries.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::classify::{classify, FileRole};
use crate::config::StoreLayout;

/// One directory entry as seen by `describe_directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
    pub role: Option<FileRole>,
}

impl EntryInfo {
    pub fn size_kib(&self) -> Option<f64> {
        self.size_bytes.map(|b| b as f64 / 1024.0)
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryReport {
    pub directory: PathBuf,
    pub exists: bool,
    /// Entries sorted by name; empty when the directory is missing or unreadable
    pub entries: Vec<EntryInfo>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl DirectoryReport {
    /// Entries the store owns.
    pub fn store_files(&self) -> impl Iterator<Item = &EntryInfo> {
        self.entries.iter().filter(|e| e.role.is_some() && !e.is_dir)
    }
}

/// List `dir` for debugging and emit it to the log at debug level.
pub fn describe_directory(dir: &Path, layout: &StoreLayout, last_sync: Option<DateTime<Utc>>) -> DirectoryReport {
    let mut report = DirectoryReport {
        directory: dir.to_path_buf(),
        exists: dir.exists(),
        entries: Vec::new(),
        last_sync,
    };

    debug!(dir = %dir.display(), exists = report.exists, "store directory");

    if report.exists {
        match fs::read_dir(dir) {
            Ok(read_dir) => {
                for entry in read_dir.flatten() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let metadata = entry.metadata().ok();
                    let is_dir = metadata.as_ref().map_or(false, |m| m.is_dir());
                    report.entries.push(EntryInfo {
                        role: if is_dir { None } else { classify(&name, layout) },
                        size_bytes: metadata.as_ref().map(|m| m.len()),
                        modified: metadata
                            .as_ref()
                            .and_then(|m| m.modified().ok())
                            .map(DateTime::<Utc>::from),
                        is_dir,
                        name,
                    });
                }
            }
            Err(e) => debug!(dir = %dir.display(), error = %e, "failed to list store directory"),
        }
    }

    report.entries.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(count = report.entries.len(), "store directory entries");
    for entry in &report.entries {
        debug!(
            name = %entry.name,
            size_kib = entry.size_kib().map(|k| format!("{:.2}", k)).unwrap_or_default(),
            modified = entry.modified.map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string()).unwrap_or_default(),
            role = entry.role.map(|r| r.to_string()).unwrap_or_default(),
            "entry"
        );
    }
    match report.last_sync {
        Some(at) => debug!(at = %at.format("%Y-%m-%d %H:%M:%S"), "last fallback sync"),
        None => debug!("no fallback sync recorded yet"),
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lists_everything_including_hidden() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("recipes.hive"), vec![0u8; 2048]).unwrap();
        fs::write(tmp.path().join(".DS_Store"), b"x").unwrap();
        fs::write(tmp.path().join("photo.png"), b"png").unwrap();
        fs::create_dir(tmp.path().join("cache")).unwrap();

        let report = describe_directory(tmp.path(), &StoreLayout::hive(), None);

        assert!(report.exists);
        let names: Vec<&str> = report.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".DS_Store", "cache", "photo.png", "recipes.hive"]);

        let hive = &report.entries[3];
        assert_eq!(hive.role, Some(FileRole::Data));
        assert_eq!(hive.size_bytes, Some(2048));
        assert_eq!(hive.size_kib(), Some(2.0));
        assert!(hive.modified.is_some());

        assert!(report.entries[1].is_dir);
        assert_eq!(report.store_files().count(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let last = Utc::now();
        let report = describe_directory(&tmp.path().join("nope"), &StoreLayout::hive(), Some(last));

        assert!(!report.exists);
        assert!(report.entries.is_empty());
        assert_eq!(report.last_sync, Some(last));
    }
}
