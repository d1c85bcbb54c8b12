mod memory;
mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;
