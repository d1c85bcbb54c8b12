//! System-level modules
//!
//! - Logging setup
//! - Platform abstraction (signals, locks, listeners, PID file)

pub mod logging;
pub mod platform;

pub use logging::{init_logging, worker_span};
