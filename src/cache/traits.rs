use async_trait::async_trait;

use crate::errors::Result;

/// Key layout below the backend's prefix
pub mod keys {
    /// Cached result of one address: `result:<ip>`
    pub const RESULT_PREFIX: &str = "result:";
    /// Insertion-ordered list of cached addresses (bounded policy)
    pub const INDEX: &str = "index";
    pub const ANALYZE_SUCCESS: &str = "analyze:success";
    pub const ANALYZE_FAILED: &str = "analyze:failed";

    pub fn result(ip: &str) -> String {
        format!("{}{}", RESULT_PREFIX, ip)
    }
}

/// Primitive cache and counter operations
///
/// Keys are relative; each backend applies its own prefix.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store without expiry
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Store with a time-to-live in seconds
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Reset the time-to-live of an existing key
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()>;

    /// Move `member` to the head of list `index` and return the new length,
    /// as one atomic step
    ///
    /// Earlier copies of `member` are removed, so the index never holds a
    /// key twice.
    async fn push_index(&self, index: &str, member: &str) -> Result<usize>;

    /// Keep the first `keep` members of `index` and delete the entry
    /// `<entry_prefix><member>` of every member cut off, as one atomic step
    ///
    /// Returns the members that were cut off.
    async fn evict(&self, index: &str, keep: usize, entry_prefix: &str) -> Result<Vec<String>>;

    /// Increment a counter, returning the new value
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Read a counter; missing counts as 0
    async fn get_counter(&self, key: &str) -> Result<u64>;

    /// Force a counter to `value`
    async fn set_counter(&self, key: &str, value: u64) -> Result<()>;

    /// Set a counter to 0 only when it does not exist yet
    ///
    /// Returns whether the counter was created.
    async fn init_counter(&self, key: &str) -> Result<bool>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
