use crate::config::{CacheConfig, ExpireMode};

/// 结果缓存淘汰策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// 每个结果带过期时间，可选命中时续期
    Ttl { ttl_secs: u64, reset_on_get: bool },
    /// 最多保留 `max_items` 条，按插入顺序淘汰最旧的
    Bounded { max_items: usize },
}

impl EvictionPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.expire_mode {
            ExpireMode::Ttl => Self::Ttl {
                ttl_secs: config.ttl_secs,
                reset_on_get: config.reset_ttl_on_get,
            },
            ExpireMode::Bounded => Self::Bounded {
                max_items: config.max_items,
            },
        }
    }
}
