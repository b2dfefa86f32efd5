//! Configuration management for FlushGuard
//!
//! Provides host presets (scene-based and legacy lifecycles) and
//! builder-style setters for custom configurations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FlushError, FlushResult};
use crate::lifecycle::{FlushPolicy, HostLifecycle};

/// Default method channel the managed runtime listens on
pub const DEFAULT_CHANNEL: &str = "com.recipesoup.app/lifecycle";

/// Command asking the managed runtime to flush its open boxes
pub const DEFAULT_FLUSH_METHOD: &str = "forceFlushHiveBoxes";

/// Reply that marks a successful managed-runtime flush
pub const DEFAULT_SUCCESS_REPLY: &str = "success";

/// Settings slot holding the last fallback sync time
pub const DEFAULT_SETTINGS_KEY: &str = "lastNativeHiveSync";

/// Upper bound the host tolerates on its main thread before killing the process
pub const MAX_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Filename rules identifying files owned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    /// Extension of live data files, without the dot
    pub data_extension: String,
    /// Extension of lock files, without the dot
    pub lock_extension: String,
    /// Substring found in compacted file names (e.g. `box.hive.compact`)
    pub compacted_marker: String,
}

impl StoreLayout {
    /// Layout of a Hive store: `*.hive`, `*.lock`, `*.hive.*`.
    pub fn hive() -> Self {
        Self::with_extensions("hive", "lock")
    }

    /// Layout for arbitrary data/lock extensions. The compacted marker is
    /// derived from the data extension.
    pub fn with_extensions(data: &str, lock: &str) -> Self {
        Self {
            data_extension: data.to_string(),
            lock_extension: lock.to_string(),
            compacted_marker: format!(".{}.", data),
        }
    }

    fn validate(&self) -> Result<(), String> {
        for (name, ext) in [("data_extension", &self.data_extension), ("lock_extension", &self.lock_extension)] {
            if ext.is_empty() {
                return Err(format!("{} must not be empty", name));
            }
            if ext.contains('.') || ext.contains(std::path::MAIN_SEPARATOR) {
                return Err(format!("{} must be a bare extension, got {:?}", name, ext));
            }
        }
        if self.data_extension == self.lock_extension {
            return Err("data_extension and lock_extension must differ".into());
        }
        if self.compacted_marker.is_empty() {
            return Err("compacted_marker must not be empty".into());
        }
        Ok(())
    }
}

impl Default for StoreLayout {
    fn default() -> Self { Self::hive() }
}

/// FlushGuard configuration with host lifecycle presets
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the store's files (non-recursive)
    pub store_dir: PathBuf,
    /// Filename rules for store-owned files
    pub layout: StoreLayout,
    /// Cross-runtime channel name
    pub channel_name: String,
    /// Command sent over the channel
    pub flush_method: String,
    /// Exact reply string counted as success
    pub success_reply: String,
    /// Bounded wait for the managed runtime's acknowledgement
    pub flush_timeout: Duration,
    /// Settings slot for the last fallback sync time
    pub settings_key: String,
    /// Lifecycle API driving the host
    pub host: HostLifecycle,
    /// Per-event flush actions
    pub policy: FlushPolicy,
}

impl Config {
    /// Scene-based host (iOS 13+): trusts the store's per-write durability.
    pub fn ios_scene<P: AsRef<Path>>(store_dir: P) -> Self {
        Self {
            store_dir: store_dir.as_ref().to_path_buf(),
            layout: StoreLayout::hive(),
            channel_name: DEFAULT_CHANNEL.to_string(),
            flush_method: DEFAULT_FLUSH_METHOD.to_string(),
            success_reply: DEFAULT_SUCCESS_REPLY.to_string(),
            flush_timeout: Duration::from_secs(5),
            settings_key: DEFAULT_SETTINGS_KEY.to_string(),
            host: HostLifecycle::Scene,
            policy: FlushPolicy::trusting_store(),
        }
    }

    /// Legacy host (iOS 12 and below): background and terminate sync directly.
    pub fn ios_legacy<P: AsRef<Path>>(store_dir: P) -> Self {
        Self {
            host: HostLifecycle::Legacy,
            ..Self::ios_scene(store_dir)
        }
    }

    /// Preset rooted at the per-user documents directory, where the store
    /// keeps its boxes.
    pub fn for_documents_dir(host: HostLifecycle) -> FlushResult<Self> {
        let documents = dirs::document_dir().ok_or(FlushError::DocumentsDirUnavailable)?;
        let config = match host {
            HostLifecycle::Scene => Self::ios_scene(documents),
            HostLifecycle::Legacy => Self::ios_legacy(documents),
        };
        Ok(config)
    }

    pub fn with_layout(mut self, layout: StoreLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: FlushPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_settings_key(mut self, key: impl Into<String>) -> Self {
        self.settings_key = key.into();
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.store_dir.as_os_str().is_empty() {
            return Err("store_dir must not be empty".into());
        }
        self.layout.validate()?;
        if self.channel_name.is_empty() {
            return Err("channel_name must not be empty".into());
        }
        if self.flush_method.is_empty() {
            return Err("flush_method must not be empty".into());
        }
        if self.success_reply.is_empty() {
            return Err("success_reply must not be empty".into());
        }
        if self.flush_timeout.is_zero() {
            return Err("flush_timeout must be > 0".into());
        }
        if self.flush_timeout > MAX_FLUSH_TIMEOUT {
            return Err(format!(
                "flush_timeout must be <= {}s, the host kills unresponsive processes",
                MAX_FLUSH_TIMEOUT.as_secs()
            ));
        }
        if self.settings_key.is_empty() {
            return Err("settings_key must not be empty".into());
        }
        Ok(())
    }

    /// `validate`, lifted into the crate error type.
    pub fn checked(self) -> FlushResult<Self> {
        self.validate().map_err(FlushError::InvalidConfig)?;
        Ok(self)
    }
}
