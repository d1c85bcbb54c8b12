//! Windows platform implementation
//!
//! Simplified compared to Unix:
//! - Marker-file locks instead of flock(2)
//! - No port sharing, so the supervisor runs a single worker
//! - Ctrl-C is the only signal; reload is not available

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use super::{PID_FILE, ProcessSignal};
use crate::errors::{AnalyzerError, Result};

/// Held marker-file lock; the file is removed on drop
pub struct FileLock {
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Create the marker file, waiting while another holder has it
pub fn lock_exclusive(path: &str) -> io::Result<FileLock> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    loop {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                return Ok(FileLock {
                    path: PathBuf::from(path),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Whether the marker file exists
pub fn is_locked(path: &str) -> bool {
    Path::new(path).exists()
}

/// Bind a plain listener
pub fn bind_shared_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}

/// Write the supervisor PID file
pub fn init_pidfile() -> io::Result<()> {
    if Path::new(PID_FILE).exists() {
        warn!("PID file exists, assuming stale");
        let _ = fs::remove_file(PID_FILE);
    }
    fs::write(PID_FILE, std::process::id().to_string())
}

/// Remove the PID file
pub fn cleanup_pidfile() {
    match fs::remove_file(PID_FILE) {
        Ok(()) => info!("PID file cleaned: {}", PID_FILE),
        Err(e) => warn!("Failed to delete PID file: {}", e),
    }
}

/// Signals cannot be delivered to another process on Windows
pub fn notify_supervisor(_sig: ProcessSignal) -> Result<()> {
    Err(AnalyzerError::notify_server(
        "Signals are not supported on Windows; restart the process instead",
    ))
}

pub fn send_signal(pid: u32, _sig: ProcessSignal) -> Result<()> {
    Err(AnalyzerError::signal_operation(format!(
        "Cannot signal PID {} on Windows",
        pid
    )))
}

/// Listens for Ctrl-C
pub struct SignalListener;

impl SignalListener {
    pub fn new() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> ProcessSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        ProcessSignal::Terminate
    }
}
