pub mod shutdown;
pub mod startup;

pub use shutdown::drain_connections;
pub use startup::{WorkerResourcePool, exceeds_memory_limit, resident_memory};
