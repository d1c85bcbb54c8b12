//! Result cache
//!
//! - `traits`: primitive cache/counter operations ([`CacheBackend`])
//! - `backend`: Redis (shared across worker processes) and in-memory backends
//! - `handle`: backend slot filled when the connection succeeds
//! - `policy`: TTL and bounded eviction
//! - `result_cache`: typed get/put of analysis results

pub mod backend;
mod handle;
mod policy;
mod result_cache;
mod traits;

pub use backend::{MemoryBackend, RedisBackend};
pub use handle::BackendHandle;
pub use policy::EvictionPolicy;
pub use result_cache::ResultCache;
pub use traits::{CacheBackend, keys};
