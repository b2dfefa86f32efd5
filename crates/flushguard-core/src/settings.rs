//! Settings port: small process-wide key-value settings
//!
//! The recorder writes one slot here after each fallback run. The port is a
//! trait so hosts inject their own store and tests substitute `MemorySettings`.
//!
//! `FileSettings` is the durable implementation. File layout:
//!
//! ```text
//!   [0..4]   magic:    "FGST"
//!   [4..6]   version:  u16 LE (1)
//!   [6..8]   reserved: u16, zero
//!   [8..12]  length:   u32 LE, payload bytes
//!   [12..16] checksum: u32 LE, CRC32C of payload
//!   [16..]   payload:  JSON object, key -> tagged value
//! ```
//!
//! `synchronize` replaces the file atomically: temp file in the same
//! directory, durable_sync, rename, then sync the directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FlushError, FlushResult};
use crate::platform_durability::{durable_sync, sync_directory};

/// Magic bytes identifying a FlushGuard settings file
pub const SETTINGS_MAGIC: [u8; 4] = *b"FGST";

/// Current on-disk format version
pub const SETTINGS_VERSION: u16 = 1;

/// Header size in bytes
pub const SETTINGS_HEADER_SIZE: usize = 16;

/// Settings files are tiny; anything larger is treated as corruption
pub const MAX_SETTINGS_PAYLOAD: u32 = 1024 * 1024;

/// A typed settings value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    Timestamp(DateTime<Utc>),
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl SettingValue {
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SettingValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Process-wide settings with explicit synchronization.
///
/// `set` and `remove` only change the in-memory view; `synchronize` makes
/// the current view durable.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<SettingValue>;
    fn set(&self, key: &str, value: SettingValue);
    fn remove(&self, key: &str) -> Option<SettingValue>;
    fn synchronize(&self) -> FlushResult<()>;
}

/// In-memory settings with call counters. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, SettingValue>>,
    writes: AtomicU64,
    syncs: AtomicU64,
    fail_sync: AtomicBool,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of `synchronize` calls so far, failed ones included.
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    /// Make subsequent `synchronize` calls fail.
    pub fn fail_synchronize(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::Relaxed);
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: SettingValue) {
        self.values.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn remove(&self, key: &str) -> Option<SettingValue> {
        self.values.lock().remove(key)
    }

    fn synchronize(&self) -> FlushResult<()> {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        if self.fail_sync.load(Ordering::Relaxed) {
            return Err(FlushError::Io {
                path: None,
                kind: io::ErrorKind::Other,
                message: "settings synchronize disabled".into(),
            });
        }
        Ok(())
    }
}

/// Durable settings backed by a single checksummed file.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    values: Mutex<HashMap<String, SettingValue>>,
    dirty: AtomicBool,
}

impl FileSettings {
    /// Open the settings file at `path`.
    ///
    /// A missing file starts empty. A corrupted file also starts empty, with
    /// a warning: the slots are diagnostic and must never block startup.
    /// Other read failures (permissions, I/O) are returned.
    pub fn open<P: AsRef<Path>>(path: P) -> FlushResult<Self> {
        let path = path.as_ref().to_path_buf();

        let values = match Self::read_strict(&path) {
            Ok(values) => values,
            Err(FlushError::Io { kind: io::ErrorKind::NotFound, .. }) => {
                debug!(path = %path.display(), "settings file not found, starting empty");
                HashMap::new()
            }
            Err(err @ FlushError::SettingsCorrupted { .. }) => {
                warn!(error = %err, "discarding corrupted settings file");
                HashMap::new()
            }
            Err(err) => return Err(err),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and verify the file without any recovery.
    pub fn read_strict(path: &Path) -> FlushResult<HashMap<String, SettingValue>> {
        let bytes = fs::read(path).map_err(|e| FlushError::io_at(path, &e, "Failed to read settings file"))?;
        decode(&bytes).map_err(|reason| FlushError::SettingsCorrupted {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn write_atomic(&self, bytes: &[u8]) -> FlushResult<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        fs::create_dir_all(parent)
            .map_err(|e| FlushError::io_at(parent, &e, "Failed to create settings directory"))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| FlushError::io_at(parent, &e, "Failed to create temp settings file"))?;
        tmp.write_all(bytes)
            .map_err(|e| FlushError::io_at(tmp.path(), &e, "Failed to write settings"))?;
        durable_sync(tmp.as_file())
            .map_err(|e| FlushError::io_at(tmp.path(), &e, "Failed to sync settings"))?;

        tmp.persist(&self.path)
            .map_err(|e| FlushError::io_at(&self.path, &e.error, "Failed to replace settings file"))?;

        sync_directory(parent)
            .map_err(|e| FlushError::io_at(parent, &e, "Failed to sync settings directory"))
    }
}

impl SettingsStore for FileSettings {
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: SettingValue) {
        self.values.lock().insert(key.to_string(), value);
        self.dirty.store(true, Ordering::Release);
    }

    fn remove(&self, key: &str) -> Option<SettingValue> {
        let removed = self.values.lock().remove(key);
        if removed.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    fn synchronize(&self) -> FlushResult<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // Encode under the lock, write without it.
        let encoded = {
            let values = self.values.lock();
            encode(&values)
        };

        let result = encoded.and_then(|bytes| self.write_atomic(&bytes));
        if result.is_err() {
            // Keep the view dirty so the next call retries.
            self.dirty.store(true, Ordering::Release);
        }
        result
    }
}

/// Serialize settings into the on-disk format. Keys are written sorted.
pub fn encode(values: &HashMap<String, SettingValue>) -> FlushResult<Vec<u8>> {
    let ordered: BTreeMap<&String, &SettingValue> = values.iter().collect();
    let payload = serde_json::to_vec(&ordered)?;

    let mut buf = Vec::with_capacity(SETTINGS_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&SETTINGS_MAGIC);
    buf.extend_from_slice(&SETTINGS_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32c::crc32c(&payload).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Parse and verify the on-disk format. The error is a corruption reason.
pub fn decode(bytes: &[u8]) -> Result<HashMap<String, SettingValue>, String> {
    if bytes.len() < SETTINGS_HEADER_SIZE {
        return Err(format!("file is {} bytes, header needs {}", bytes.len(), SETTINGS_HEADER_SIZE));
    }
    if bytes[0..4] != SETTINGS_MAGIC {
        return Err(format!(
            "bad magic {:02x}{:02x}{:02x}{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3]
        ));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != SETTINGS_VERSION {
        return Err(format!("unsupported version {}", version));
    }

    let length = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let expected = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    if length > MAX_SETTINGS_PAYLOAD {
        return Err(format!("payload length {} exceeds limit", length));
    }

    let payload = &bytes[SETTINGS_HEADER_SIZE..];
    if payload.len() != length as usize {
        return Err(format!("payload is {} bytes, header says {}", payload.len(), length));
    }

    let actual = crc32c::crc32c(payload);
    if actual != expected {
        return Err(format!("checksum mismatch: expected 0x{:08x}, got 0x{:08x}", expected, actual));
    }

    let ordered: BTreeMap<String, SettingValue> =
        serde_json::from_slice(payload).map_err(|e| format!("invalid payload: {}", e))?;
    Ok(ordered.into_iter().collect())
}
