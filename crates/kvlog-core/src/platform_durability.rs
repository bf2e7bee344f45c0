//! Durable sync for the transaction log file
//!
//! Used by the log writer under [`SyncPolicy::EveryRecord`](crate::config::SyncPolicy).
//! Each platform gets the strongest primitive it offers for pushing file
//! data past volatile caches.

use std::fs::File;
use std::io;

/// Block until the data already written to `file` is on persistent media.
///
/// - Linux: `fdatasync()`
/// - macOS/iOS: `fcntl(F_FULLFSYNC)`, since plain `fsync` stops at the drive cache
/// - Windows: `FlushFileBuffers()`
/// - elsewhere: `File::sync_data()`
///
/// Only the writer thread calls this, and it holds no locks while doing so.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor comes from a live `File` borrowed for the
        // duration of the call.
        let rc = unsafe { libc::fdatasync(file.as_raw_fd()) };
        cvt(rc == 0)
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor comes from a live `File` borrowed for the
        // duration of the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        cvt(rc == 0)
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        // SAFETY: the handle comes from a live `File` borrowed for the
        // duration of the call.
        let ok = unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) };
        cvt(ok != 0)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
    {
        file.sync_data()
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows"))]
fn cvt(succeeded: bool) -> io::Result<()> {
    if succeeded {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
