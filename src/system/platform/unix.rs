//! Unix/Linux platform implementation
//!
//! - PID file management with process checking
//! - flock(2) based advisory locks
//! - SO_REUSEPORT listeners so every worker process accepts on the same port
//! - SIGHUP / SIGTERM / SIGINT handling

use std::fs::{self, File, OpenOptions};
use std::io;
use std::net::SocketAddr;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use super::{PID_FILE, ProcessSignal};
use crate::errors::{AnalyzerError, Result};

/// Held exclusive lock; released on drop
pub struct FileLock {
    _lock: Flock<File>,
}

/// Take an exclusive lock on `path`, creating the file when missing
///
/// Blocks until the lock is available.
pub fn lock_exclusive(path: &str) -> io::Result<FileLock> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;

    let lock = Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| io::Error::from(errno))?;
    Ok(FileLock { _lock: lock })
}

/// Whether another holder currently has an exclusive lock on `path`
pub fn is_locked(path: &str) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };

    match Flock::lock(file, FlockArg::LockSharedNonblock) {
        Ok(_shared) => false,
        Err((_, Errno::EWOULDBLOCK)) => true,
        Err((_, errno)) => {
            debug!("flock probe on {} failed: {}", path, errno);
            false
        }
    }
}

/// Bind a listener that other worker processes may bind as well
pub fn bind_shared_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

/// Write the supervisor PID file, refusing to start over a live process
pub fn init_pidfile() -> io::Result<()> {
    if Path::new(PID_FILE).exists() {
        match read_pid() {
            Ok(old_pid) if old_pid == std::process::id() => {}
            Ok(old_pid) if signal::kill(Pid::from_raw(old_pid as i32), None).is_ok() => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("ip-analyzer is already running (PID {})", old_pid),
                ));
            }
            _ => {
                info!("Stale PID file detected, cleaning up...");
                let _ = fs::remove_file(PID_FILE);
            }
        }
    }

    let pid = std::process::id();
    fs::write(PID_FILE, pid.to_string())?;
    debug!("Supervisor PID: {}", pid);
    Ok(())
}

/// Remove the PID file
pub fn cleanup_pidfile() {
    match fs::remove_file(PID_FILE) {
        Ok(()) => info!("PID file cleaned: {}", PID_FILE),
        Err(e) => warn!("Failed to delete PID file: {}", e),
    }
}

fn read_pid() -> io::Result<u32> {
    let content = fs::read_to_string(PID_FILE)?;
    content
        .trim()
        .parse::<u32>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn to_signal(sig: ProcessSignal) -> Signal {
    match sig {
        ProcessSignal::Reload => Signal::SIGHUP,
        ProcessSignal::Terminate => Signal::SIGTERM,
    }
}

/// Send a signal to the running supervisor found in the PID file
pub fn notify_supervisor(sig: ProcessSignal) -> Result<()> {
    let pid = read_pid().map_err(|e| {
        AnalyzerError::notify_server(format!("Failed to read {}: {}", PID_FILE, e))
    })?;
    send_signal(pid, sig)
}

/// Send a signal to a process
pub fn send_signal(pid: u32, sig: ProcessSignal) -> Result<()> {
    signal::kill(Pid::from_raw(pid as i32), to_signal(sig)).map_err(|e| {
        AnalyzerError::signal_operation(format!("Failed to signal PID {}: {}", pid, e))
    })
}

/// Listens for reload and termination signals
pub struct SignalListener {
    hangup: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

impl SignalListener {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next signal
    pub async fn recv(&mut self) -> ProcessSignal {
        tokio::select! {
            _ = self.hangup.recv() => ProcessSignal::Reload,
            _ = self.terminate.recv() => ProcessSignal::Terminate,
            _ = self.interrupt.recv() => ProcessSignal::Terminate,
        }
    }
}
