//! Sync State Recorder
//!
//! Remembers when the fallback tier last ran. The value is for diagnostics
//! only; nothing in the flush protocol reads it to make a decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::settings::{SettingValue, SettingsStore};

/// Writes and reads the last-sync slot in a settings store.
#[derive(Clone)]
pub struct SyncStateRecorder {
    settings: Arc<dyn SettingsStore>,
    key: String,
}

impl SyncStateRecorder {
    pub fn new(settings: Arc<dyn SettingsStore>, key: impl Into<String>) -> Self {
        Self { settings, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store the current wall-clock time and synchronize the settings store.
    ///
    /// Returns the recorded time. A failed synchronize is logged; the
    /// in-memory slot still holds the new value.
    pub fn record_sync_now(&self) -> DateTime<Utc> {
        let now = Utc::now();
        self.settings.set(&self.key, SettingValue::Timestamp(now));

        match self.settings.synchronize() {
            Ok(()) => debug!(key = %self.key, at = %now, "recorded last sync time"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to persist last sync time"),
        }
        now
    }

    /// Last recorded sync time, if any. A slot holding another value type
    /// reads as `None`.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.settings.get(&self.key).and_then(|v| v.as_timestamp())
    }
}

impl std::fmt::Debug for SyncStateRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateRecorder").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    #[test]
    fn test_record_and_read_back() {
        let settings = Arc::new(MemorySettings::new());
        let recorder = SyncStateRecorder::new(settings.clone(), "lastNativeHiveSync");
        assert!(recorder.last_sync_time().is_none());

        let before = Utc::now();
        let recorded = recorder.record_sync_now();
        let after = Utc::now();

        assert!(recorded >= before && recorded <= after);
        assert_eq!(recorder.last_sync_time(), Some(recorded));
        assert_eq!(settings.write_count(), 1);
        assert_eq!(settings.sync_count(), 1);
    }

    #[test]
    fn test_overwrites_previous_value() {
        let settings = Arc::new(MemorySettings::new());
        let recorder = SyncStateRecorder::new(settings.clone(), "lastNativeHiveSync");

        let first = recorder.record_sync_now();
        let second = recorder.record_sync_now();

        assert!(second >= first);
        assert_eq!(recorder.last_sync_time(), Some(second));
        assert_eq!(settings.write_count(), 2);
    }

    #[test]
    fn test_synchronize_failure_is_swallowed() {
        let settings = Arc::new(MemorySettings::new());
        settings.fail_synchronize(true);
        let recorder = SyncStateRecorder::new(settings.clone(), "lastNativeHiveSync");

        let recorded = recorder.record_sync_now();
        assert_eq!(recorder.last_sync_time(), Some(recorded));
    }

    #[test]
    fn test_foreign_value_reads_as_none() {
        let settings = Arc::new(MemorySettings::new());
        settings.set("lastNativeHiveSync", SettingValue::Text("yesterday".into()));
        let recorder = SyncStateRecorder::new(settings, "lastNativeHiveSync");
        assert!(recorder.last_sync_time().is_none());
    }
}
