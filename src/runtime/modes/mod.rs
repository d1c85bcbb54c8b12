//! Process modes
//!
//! - `supervisor`: master process managing worker pools
//! - `worker`: one accept loop serving analysis requests

pub mod supervisor;
pub mod worker;

pub use supervisor::{ANALYZER_POOL, Supervisor, WorkerCommand, effective_workers, run_supervisor};
pub use worker::{MAX_REQUEST_BYTES, WorkerServer, read_request, run_worker};
