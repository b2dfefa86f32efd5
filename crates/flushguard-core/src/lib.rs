//! FlushGuard Core: Lifecycle-Driven Durability Flush
//!
//! Makes sure an embedded key-value store's pending writes reach stable
//! storage before the host operating system suspends or kills the process.
//!
//! # Architecture
//!
//! - **Dispatcher**: maps each host lifecycle transition to a flush action
//! - **Cross-runtime tier**: asks the managed runtime to flush, bounded wait
//! - **Fallback tier**: fsync every store-owned file directly
//! - **Recorder**: remembers when the fallback last ran (diagnostics only)
//!
//! Nothing in the flush path is fatal. Failures degrade to the next tier or
//! to a log line; the host's main thread is never held longer than the
//! configured timeout plus local disk latency.
//!
//! The store's file format is opaque here: a store is a directory of files
//! matching a `StoreLayout`.

pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod file_sync;
pub mod lifecycle;
pub mod platform_durability;
pub mod recorder;
pub mod requester;
pub mod settings;

// Re-export key types for convenience
pub use classify::{classify, FileRole, StorageFile};
pub use config::{Config, StoreLayout};
pub use diagnostics::{describe_directory, DirectoryReport, EntryInfo};
pub use dispatcher::{AttemptOutcome, FlushAttempt, FlushMethod, FlushReport, LifecycleDispatcher};
pub use error::{FlushError, FlushResult};
pub use file_sync::{DirectoryStatus, FileOutcome, FileSyncEngine, FileSyncError, SyncStage, SyncSummary};
pub use lifecycle::{FlushAction, FlushPolicy, HostLifecycle, LifecycleEvent};
pub use recorder::SyncStateRecorder;
pub use requester::{
    ChannelReply, CrossRuntimeFlusher, EngineSlot, FlushFailure, FlushResponse, MethodChannel, ReplyCallback,
};
pub use settings::{FileSettings, MemorySettings, SettingValue, SettingsStore};
