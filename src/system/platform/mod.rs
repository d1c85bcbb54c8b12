//! Platform abstraction layer
//!
//! Unified interface for the process-level operations that differ between
//! Unix/Linux and Windows:
//! - PID file management for the supervisor
//! - Advisory file locks guarding the blacklist download
//! - Listener binding (port sharing between worker processes)
//! - Process signals (reload / terminate)
//!
//! The implementation is selected with conditional compilation:
//! - `unix.rs`: Unix/Linux implementation
//! - `windows.rs`: Windows implementation

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::*;
#[cfg(windows)]
pub use windows::*;

/// PID file written by the supervisor, relative to the working directory
pub const PID_FILE: &str = "ip-analyzer.pid";

/// Signals a process reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// SIGHUP: rebuild configuration
    Reload,
    /// SIGTERM / Ctrl-C: drain and exit
    Terminate,
}

/// Lock file guarding `path` (`<path>.lock`)
pub fn lock_path_for(path: &str) -> String {
    format!("{}.lock", path)
}

/// Get the platform name for logging/debugging
pub fn platform_name() -> &'static str {
    #[cfg(unix)]
    return "Unix/Linux";
    #[cfg(windows)]
    return "Windows";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path() {
        assert_eq!(lock_path_for("blacklist/ipsum.txt"), "blacklist/ipsum.txt.lock");
    }

    #[test]
    fn test_exclusive_lock_is_visible() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("feed.txt.lock");
        let lock = lock.to_string_lossy().to_string();

        assert!(!is_locked(&lock));
        let guard = lock_exclusive(&lock).expect("lock should succeed");
        assert!(is_locked(&lock));
        drop(guard);
        assert!(!is_locked(&lock));
    }
}
