//! Store file classification
//!
//! Decides from a file name alone whether a directory entry belongs to the
//! store. Rules are a closed set, checked in order:
//!
//! 1. extension equals the data extension        -> `Data`
//! 2. extension equals the lock extension        -> `Lock`
//! 3. name contains the compacted marker         -> `CompactedData`
//!
//! Hidden names never match.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::StoreLayout;

/// Role a store-owned file plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileRole {
    /// Live box data
    Data,
    /// Box lock file
    Lock,
    /// Output of the store's own compaction (`box.hive.compact`)
    CompactedData,
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileRole::Data => "data",
            FileRole::Lock => "lock",
            FileRole::CompactedData => "compacted-data",
        };
        f.write_str(name)
    }
}

/// A classified file in the store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFile {
    pub path: PathBuf,
    /// Extension as found on disk (may be empty for compacted names like `a.hive.`)
    pub extension: String,
    pub role: FileRole,
}

impl StorageFile {
    /// Classify `path` by its final component. `None` if the store does not own it.
    pub fn from_path(path: &Path, layout: &StoreLayout) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let role = classify(name, layout)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        Some(Self { path: path.to_path_buf(), extension, role })
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Map a file name to the role it plays in the store, if any.
pub fn classify(file_name: &str, layout: &StoreLayout) -> Option<FileRole> {
    if file_name.is_empty() || is_hidden(file_name) {
        return None;
    }

    // Same notion of extension as Path::extension: text after the last dot,
    // and a leading dot alone does not start an extension.
    let extension = Path::new(file_name).extension().and_then(|e| e.to_str());

    if extension == Some(layout.data_extension.as_str()) {
        return Some(FileRole::Data);
    }
    if extension == Some(layout.lock_extension.as_str()) {
        return Some(FileRole::Lock);
    }
    if file_name.contains(layout.compacted_marker.as_str()) {
        return Some(FileRole::CompactedData);
    }
    None
}

/// Dot-files are skipped by enumeration and never classified.
pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}
