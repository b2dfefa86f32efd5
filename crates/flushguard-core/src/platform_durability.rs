//! Platform-specific durability barriers
//!
//! Each platform has different guarantees for when data is actually written to persistent storage.
//! This module maps a single "push this file to stable media" request onto the strongest
//! primitive available, and opens files in the least-privileged mode that primitive accepts.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Forces buffered writes for `file` to persistent storage before returning.
///
/// Platform behaviors:
/// - macOS/iOS: fcntl(F_FULLFSYNC), falling back to fsync() where the filesystem rejects it
/// - Other Unix: fsync() - data and metadata
/// - Windows: FlushFileBuffers() - flushes internal buffers and requests device flush
/// - Other: file.sync_all() - Rust stdlib fallback
///
/// # Safety
/// This function makes system calls that may block for extended periods during heavy I/O.
/// The caller must not hold locks that could cause deadlocks during the sync operation.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        // Plain fsync() on Apple platforms stops at the drive's volatile cache.
        // F_FULLFSYNC is the only call that reaches physical media; some filesystems
        // (network mounts, FAT) answer ENOTSUP and get the weaker fsync instead.
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fcntl with F_FULLFSYNC operates on a valid fd borrowed from `file`.
        let result = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
        if result == 0 {
            return Ok(());
        }
        // SAFETY: same fd, still open for the duration of the borrow.
        let result = unsafe { libc::fsync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(all(unix, not(any(target_os = "macos", target_os = "ios"))))]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fsync is a POSIX system call on a valid fd borrowed from `file`.
        let result = unsafe { libc::fsync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        let handle = file.as_raw_handle();
        // SAFETY: FlushFileBuffers is a Windows API call on a valid file handle.
        let result = unsafe { FlushFileBuffers(handle as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(unix, target_os = "windows")))]
    {
        file.sync_all()
    }
}

/// Open `path` for a durability barrier without granting write access where
/// the platform allows it.
///
/// FlushFileBuffers requires GENERIC_WRITE, so Windows gets a write handle;
/// nothing is ever written through it. On Unix the open is non-blocking, so a
/// FIFO or device swapped in under a store file name cannot stall the caller.
pub fn open_for_barrier(path: &Path) -> io::Result<File> {
    #[cfg(target_os = "windows")]
    {
        OpenOptions::new().read(true).write(true).open(path)
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
    }

    #[cfg(not(any(unix, target_os = "windows")))]
    {
        OpenOptions::new().read(true).open(path)
    }
}

/// Persist a directory entry change (create/rename) inside `dir`.
///
/// Windows has no directory handle flush; renames there are durable once
/// the file itself has been flushed.
pub fn sync_directory(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        let handle = File::open(dir)?;
        durable_sync(&handle)
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}
