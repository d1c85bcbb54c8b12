//! Worker runtime
//!
//! - `context`: per-worker shared state and the recycle signal
//! - `lifetime`: resource initialization and connection drain
//! - `modes`: supervisor and worker process entry points

mod context;
pub mod lifetime;
pub mod modes;

pub use context::{ConnectionGuard, RecycleSignal, WorkerContext};
pub use lifetime::WorkerResourcePool;
pub use modes::{Supervisor, WorkerServer, run_supervisor, run_worker};
