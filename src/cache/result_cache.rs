use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::policy::EvictionPolicy;
use super::traits::{CacheBackend, keys};
use crate::config::CacheConfig;
use crate::model::AnalysisResult;

/// 分析结果缓存
///
/// 写入失败只记录日志，不会影响请求本身。
/// 未启用缓存或没有后端时，读写都直接跳过。
#[derive(Clone)]
pub struct ResultCache {
    backend: Option<Arc<dyn CacheBackend>>,
    policy: EvictionPolicy,
    enabled: bool,
}

impl ResultCache {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, config: &CacheConfig) -> Self {
        Self {
            backend,
            policy: EvictionPolicy::from_config(config),
            enabled: config.enabled,
        }
    }

    /// 不缓存任何结果
    pub fn disabled() -> Self {
        Self {
            backend: None,
            policy: EvictionPolicy::from_config(&CacheConfig::default()),
            enabled: false,
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn active_backend(&self) -> Option<&Arc<dyn CacheBackend>> {
        if self.enabled {
            self.backend.as_ref()
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active_backend().is_some()
    }

    /// 读取缓存；命中且配置了续期时重置 TTL
    pub async fn get(&self, ip: &str) -> Option<AnalysisResult> {
        let backend = self.active_backend()?;
        let key = keys::result(ip);

        let raw = match backend.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                trace!("Cache miss: {}", ip);
                return None;
            }
            Err(e) => {
                debug!("Cache read for {} failed: {}", ip, e);
                return None;
            }
        };

        let result = match serde_json::from_str::<AnalysisResult>(&raw) {
            Ok(result) => result,
            Err(e) => {
                debug!("Cached value for {} is not a valid result: {}", ip, e);
                return None;
            }
        };

        if let EvictionPolicy::Ttl {
            ttl_secs,
            reset_on_get: true,
        } = self.policy
            && let Err(e) = backend.expire(&key, ttl_secs).await
        {
            debug!("Failed to refresh TTL of {}: {}", key, e);
        }

        trace!("Cache hit: {}", ip);
        Some(result)
    }

    /// 按策略写入缓存
    pub async fn put(&self, ip: &str, result: &AnalysisResult) {
        let Some(backend) = self.active_backend() else {
            return;
        };

        let value = match serde_json::to_string(result) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize result for {}: {}", ip, e);
                return;
            }
        };
        let key = keys::result(ip);

        match self.policy {
            EvictionPolicy::Ttl { ttl_secs, .. } => {
                if let Err(e) = backend.set_ex(&key, &value, ttl_secs).await {
                    warn!("Unable to cache result for {}: {}", ip, e);
                }
            }
            EvictionPolicy::Bounded { max_items } => {
                if let Err(e) = backend.set(&key, &value).await {
                    warn!("Unable to cache result for {}: {}", ip, e);
                    return;
                }

                let len = match backend.push_index(keys::INDEX, ip).await {
                    Ok(len) => len,
                    Err(e) => {
                        warn!("Unable to update cache index for {}: {}", ip, e);
                        return;
                    }
                };

                if len > max_items {
                    match backend.evict(keys::INDEX, max_items, keys::RESULT_PREFIX).await {
                        Ok(evicted) => {
                            trace!("Evicted {} cached results", evicted.len());
                        }
                        Err(e) => warn!("Cache eviction failed: {}", e),
                    }
                }
            }
        }
    }
}
