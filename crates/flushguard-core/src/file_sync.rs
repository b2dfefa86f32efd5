//! File Sync Engine: the fallback tier
//!
//! Walks the immediate entries of the store directory, keeps the files the
//! store owns, and pushes each one through a durability barrier:
//!
//! 1. open read-only
//! 2. durable_sync()
//! 3. close
//!
//! A failing file is recorded and the batch continues. A missing or
//! unreadable directory is a soft outcome, not an error: the store has not
//! created anything yet on first launch.
//!
//! Nothing here waits on the managed runtime or the network; the worst case
//! is local disk latency times the number of store files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::classify::{is_hidden, StorageFile};
use crate::config::StoreLayout;
use crate::platform_durability::{durable_sync, open_for_barrier};

/// Step of the per-file barrier that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Open,
    Sync,
}

/// Why a single file could not be synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSyncError {
    pub stage: SyncStage,
    /// Raw OS error number, when the OS supplied one
    pub errno: Option<i32>,
    pub kind: io::ErrorKind,
    pub message: String,
}

impl FileSyncError {
    fn new(stage: SyncStage, err: &io::Error) -> Self {
        Self {
            stage,
            errno: err.raw_os_error(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome for one store file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: StorageFile,
    pub result: Result<(), FileSyncError>,
    pub elapsed: Duration,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// What happened when the engine tried to list the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryStatus {
    /// Directory was listed; per-file results are meaningful
    Scanned,
    /// Directory does not exist (first launch)
    Missing,
    /// Directory exists but could not be listed
    Unreadable { kind: io::ErrorKind, message: String },
}

/// Aggregate result of one `sync_all` run.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub directory: PathBuf,
    pub status: DirectoryStatus,
    pub synced: usize,
    pub failed: usize,
    /// Per-file outcomes in file-name order
    pub files: Vec<FileOutcome>,
    pub duration: Duration,
}

impl SyncSummary {
    fn empty(directory: &Path, status: DirectoryStatus, duration: Duration) -> Self {
        Self {
            directory: directory.to_path_buf(),
            status,
            synced: 0,
            failed: 0,
            files: Vec::new(),
            duration,
        }
    }

    /// `(synced, failed)`
    pub fn counts(&self) -> (usize, usize) {
        (self.synced, self.failed)
    }

    /// True when the directory was listed.
    pub fn scanned(&self) -> bool {
        self.status == DirectoryStatus::Scanned
    }

    /// True when the directory was listed and no file failed.
    pub fn all_synced(&self) -> bool {
        self.scanned() && self.failed == 0
    }

    /// Names of files whose barrier failed.
    pub fn failed_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.file.file_name())
            .collect()
    }
}

/// Durability barrier over every store-owned file in a directory.
#[derive(Debug, Clone)]
pub struct FileSyncEngine {
    layout: StoreLayout,
}

impl FileSyncEngine {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// List the store files in `dir`, sorted by name.
    ///
    /// Skips hidden entries, anything that is not a regular file once symlinks
    /// are followed, and anything `classify` rejects.
    /// Entries that fail mid-listing are skipped rather than aborting the scan.
    pub fn candidates(&self, dir: &Path) -> io::Result<Vec<StorageFile>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_hidden(name) {
                continue;
            }

            // Regular files only, judged through symlinks. A dangling link has
            // no target metadata; it stays and fails at the open stage.
            let path = entry.path();
            match fs::metadata(&path) {
                Ok(meta) if !meta.is_file() => {
                    debug!(path = %path.display(), "skipping non-regular entry");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "keeping entry with unreadable target");
                }
            }

            if let Some(file) = StorageFile::from_path(&path, &self.layout) {
                files.push(file);
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Sync every store file in `dir`. Never fails; see `SyncSummary::status`.
    pub fn sync_all(&self, dir: &Path) -> SyncSummary {
        let start = Instant::now();
        debug!(dir = %dir.display(), "searching for store files");

        let candidates = match self.candidates(dir) {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(dir = %dir.display(), "store directory does not exist yet, nothing to sync");
                return SyncSummary::empty(dir, DirectoryStatus::Missing, start.elapsed());
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list store directory");
                let status = DirectoryStatus::Unreadable {
                    kind: e.kind(),
                    message: e.to_string(),
                };
                return SyncSummary::empty(dir, status, start.elapsed());
            }
        };

        let mut summary = SyncSummary::empty(dir, DirectoryStatus::Scanned, Duration::ZERO);

        for file in candidates {
            let file_start = Instant::now();
            let result = Self::sync_file(&file);
            let elapsed = file_start.elapsed();

            match &result {
                Ok(()) => {
                    summary.synced += 1;
                    debug!(
                        file = file.file_name(),
                        role = %file.role,
                        elapsed_us = elapsed.as_micros() as u64,
                        "synced store file"
                    );
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        file = file.file_name(),
                        role = %file.role,
                        stage = ?err.stage,
                        errno = err.errno,
                        error = %err.message,
                        "failed to sync store file"
                    );
                }
            }

            summary.files.push(FileOutcome { file, result, elapsed });
        }

        summary.duration = start.elapsed();

        if summary.synced == 0 && summary.failed == 0 {
            info!(dir = %dir.display(), "no store files found to sync");
        } else {
            info!(
                dir = %dir.display(),
                synced = summary.synced,
                failed = summary.failed,
                duration_ms = summary.duration.as_millis() as u64,
                "store file sync finished"
            );
        }

        summary
    }

    /// Push one file through the barrier. The handle is closed on return.
    pub fn sync_file(file: &StorageFile) -> Result<(), FileSyncError> {
        let handle = open_for_barrier(&file.path)
            .map_err(|e| FileSyncError::new(SyncStage::Open, &e))?;
        durable_sync(&handle).map_err(|e| FileSyncError::new(SyncStage::Sync, &e))
    }
}

impl Default for FileSyncEngine {
    fn default() -> Self { Self::new(StoreLayout::default()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FileRole;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, contents: &[u8]) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_scenario_data_lock_and_unrelated() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.data", b"box");
        touch(tmp.path(), "a.lock", b"");
        touch(tmp.path(), "notes.txt", b"hello");

        let engine = FileSyncEngine::new(StoreLayout::with_extensions("data", "lock"));
        let summary = engine.sync_all(tmp.path());

        assert_eq!(summary.counts(), (2, 0));
        assert!(summary.all_synced());
        let roles: Vec<FileRole> = summary.files.iter().map(|o| o.file.role).collect();
        assert_eq!(roles, vec![FileRole::Data, FileRole::Lock]);
    }

    #[test]
    fn test_unrelated_extensions_do_not_change_counts() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "recipes.hive", b"box");
        touch(tmp.path(), "recipes.lock", b"");
        let engine = FileSyncEngine::default();
        let before = engine.sync_all(tmp.path()).counts();

        touch(tmp.path(), "photo.png", b"\x89PNG");
        touch(tmp.path(), "config.json", b"{}");
        let after = engine.sync_all(tmp.path()).counts();

        assert_eq!(before, after);
        assert_eq!(after, (2, 0));
    }

    #[test]
    fn test_idempotent_classification() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "recipes.hive", b"box");
        touch(tmp.path(), "recipes.hive.compact", b"box");
        touch(tmp.path(), "tags.hive", b"box");
        touch(tmp.path(), "tags.lock", b"");

        let engine = FileSyncEngine::default();
        let first = engine.sync_all(tmp.path());
        let second = engine.sync_all(tmp.path());

        let shape = |s: &SyncSummary| -> Vec<(String, FileRole, bool)> {
            s.files
                .iter()
                .map(|o| (o.file.file_name().to_string(), o.file.role, o.succeeded()))
                .collect()
        };
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(first.counts(), (4, 0));
    }

    #[test]
    fn test_missing_directory_is_soft() {
        let tmp = TempDir::new().unwrap();
        let engine = FileSyncEngine::default();
        let summary = engine.sync_all(&tmp.path().join("not-created-yet"));

        assert_eq!(summary.counts(), (0, 0));
        assert_eq!(summary.status, DirectoryStatus::Missing);
        assert!(!summary.scanned());
    }

    #[test]
    fn test_directory_path_is_a_file() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "plain.hive", b"box");
        let engine = FileSyncEngine::default();
        let summary = engine.sync_all(&tmp.path().join("plain.hive"));

        assert_eq!(summary.counts(), (0, 0));
        assert!(matches!(summary.status, DirectoryStatus::Unreadable { .. }));
    }

    #[test]
    fn test_skips_hidden_and_nested() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), ".hidden.hive", b"box");
        fs::create_dir(tmp.path().join("nested.hive")).unwrap();
        touch(&tmp.path().join("nested.hive"), "inner.hive", b"box");
        touch(tmp.path(), "visible.hive", b"box");

        let engine = FileSyncEngine::default();
        let summary = engine.sync_all(tmp.path());
        assert_eq!(summary.counts(), (1, 0));
        assert_eq!(summary.files[0].file.file_name(), "visible.hive");
    }

    #[cfg(unix)]
    #[test]
    fn test_skips_symlink_to_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("box.hive")).unwrap();
        touch(tmp.path(), "a.hive", b"box");

        let engine = FileSyncEngine::default();
        let summary = engine.sync_all(tmp.path());
        assert_eq!(summary.counts(), (1, 0));
        assert_eq!(summary.files[0].file.file_name(), "a.hive");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_store_file_is_synced() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        touch(&tmp.path().join("real"), "target.bin", b"box");
        std::os::unix::fs::symlink(tmp.path().join("real").join("target.bin"), tmp.path().join("box.hive")).unwrap();

        let summary = FileSyncEngine::default().sync_all(tmp.path());
        assert_eq!(summary.counts(), (1, 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_fifo_named_like_lock_file_does_not_block() {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.hive", b"box");
        let fifo = CString::new(tmp.path().join("b.lock").as_os_str().as_bytes()).unwrap();
        // SAFETY: `fifo` is a valid NUL-terminated path.
        assert_eq!(unsafe { libc::mkfifo(fifo.as_ptr(), 0o600) }, 0);

        let dir = tmp.path().to_path_buf();
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(FileSyncEngine::default().sync_all(&dir).counts());
        });

        let counts = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("sync_all blocked on a FIFO");
        assert_eq!(counts, (1, 0));
    }

    #[cfg(unix)]
    #[test]
    fn test_bad_file_does_not_abort_batch() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.hive", b"box");
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("b.hive")).unwrap();
        touch(tmp.path(), "c.hive", b"box");

        let engine = FileSyncEngine::default();
        let summary = engine.sync_all(tmp.path());

        assert_eq!(summary.counts(), (2, 1));
        assert_eq!(summary.failed_files(), vec!["b.hive"]);
        let failure = summary.files[1].result.as_ref().unwrap_err();
        assert_eq!(failure.stage, SyncStage::Open);
        assert_eq!(failure.errno, Some(libc::ENOENT));
    }

    #[test]
    fn test_sync_does_not_modify_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "recipes.hive", b"unchanged");
        let before = fs::metadata(tmp.path().join("recipes.hive")).unwrap().modified().unwrap();

        FileSyncEngine::default().sync_all(tmp.path());

        let path = tmp.path().join("recipes.hive");
        assert_eq!(fs::read(&path).unwrap(), b"unchanged");
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }
}
