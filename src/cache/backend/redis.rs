use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

use crate::cache::CacheBackend;
use crate::config::RedisConfig;
use crate::errors::{AnalyzerError, Result};

/// Bounded eviction as one server-side unit: read the tail, trim, delete
///
/// KEYS[1] = index, ARGV[1] = keep, ARGV[2] = entry key prefix
static EVICT_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local tail = redis.call('LRANGE', KEYS[1], ARGV[1], -1)
redis.call('LTRIM', KEYS[1], 0, tonumber(ARGV[1]) - 1)
for _, member in ipairs(tail) do
    redis.call('DEL', ARGV[2] .. member)
end
return tail
"#,
    )
});

/// Redis backend shared by all worker processes
pub struct RedisBackend {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    key_prefix: String,
}

impl RedisBackend {
    /// Open the client and verify the server answers PING
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            AnalyzerError::cache_connection(format!("Invalid Redis URL {}: {}", config.url, e))
        })?;

        let backend = Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            key_prefix: config.key_prefix.clone(),
        };

        let mut conn = backend.get_connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AnalyzerError::cache_connection(format!("Redis ping failed: {}", e)))?;
        debug!("Redis connection test successful: {}", pong);
        info!(
            "Redis backend connected with prefix '{}'",
            backend.key_prefix
        );

        Ok(backend)
    }

    /// 获取或建立持久连接
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;

        // 双重检查，避免竞态条件
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let new_conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AnalyzerError::cache_connection(e.to_string()))?;
        *conn_guard = Some(new_conn.clone());
        debug!("Redis connection established and cached");

        Ok(new_conn)
    }

    /// 重置连接（在连接错误时调用）
    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Redis connection reset due to error");
    }

    /// Drop the cached connection when the error looks like a broken link
    async fn check<T>(&self, result: redis::RedisResult<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    self.reset_connection().await;
                }
                Err(e.into())
            }
        }
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<Option<String>> = conn.get(self.make_key(key)).await;
        self.check(result).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<()> = conn.set(self.make_key(key), value).await;
        self.check(result).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<()> = conn.set_ex(self.make_key(key), value, ttl_secs).await;
        self.check(result).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let result: redis::RedisResult<bool> = conn.expire(self.make_key(key), ttl).await;
        self.check(result).await.map(|_| ())
    }

    async fn push_index(&self, index: &str, member: &str) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let index = self.make_key(index);
        let result: redis::RedisResult<(usize,)> = redis::pipe()
            .atomic()
            .lrem(&index, 0, member)
            .ignore()
            .lpush(&index, member)
            .ignore()
            .llen(&index)
            .query_async(&mut conn)
            .await;
        self.check(result).await.map(|(len,)| len)
    }

    async fn evict(&self, index: &str, keep: usize, entry_prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<redis::Value> = EVICT_SCRIPT
            .key(self.make_key(index))
            .arg(keep)
            .arg(self.make_key(entry_prefix))
            .invoke_async(&mut conn)
            .await;
        let reply = self.check(result).await?;

        let Some(evicted) = evicted_members(reply) else {
            trace!("Unexpected eviction reply shape, skipping");
            return Ok(Vec::new());
        };
        trace!("Redis evicted {} cached results", evicted.len());
        Ok(evicted)
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<u64> = conn.incr(self.make_key(key), 1u64).await;
        self.check(result).await
    }

    async fn get_counter(&self, key: &str) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<Option<u64>> = conn.get(self.make_key(key)).await;
        self.check(result).await.map(|v| v.unwrap_or(0))
    }

    async fn set_counter(&self, key: &str, value: u64) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<()> = conn.set(self.make_key(key), value).await;
        self.check(result).await
    }

    async fn init_counter(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<bool> = conn.set_nx(self.make_key(key), 0u64).await;
        self.check(result).await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Members named by the eviction script reply; `None` when the reply is not a list of strings
fn evicted_members(reply: redis::Value) -> Option<Vec<String>> {
    let redis::Value::Array(items) = reply else {
        return None;
    };
    items
        .into_iter()
        .map(|item| match item {
            redis::Value::BulkString(bytes) => String::from_utf8(bytes).ok(),
            redis::Value::SimpleString(s) => Some(s),
            _ => None,
        })
        .collect()
}
