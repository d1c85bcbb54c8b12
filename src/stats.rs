//! 分析计数器
//!
//! 三种模式：
//! - Local: 单 worker 且无后端，进程内原子计数
//! - Distributed: 有后端时使用 `INCR <prefix>analyze:*`
//! - Unavailable: 多 worker 且无后端，计数无意义，`status` 返回配置错误

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, info};

use crate::cache::{BackendHandle, keys};
use crate::errors::{AnalyzerError, Result};
use crate::model::StatsSnapshot;

/// 多 worker 且无共享后端时 `status` 返回的错误文本
pub const COUNTER_UNAVAILABLE: &str = "Redis store or running in single worker is required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMode {
    Local,
    Distributed,
    Unavailable,
}

impl CounterMode {
    pub fn resolve(has_backend: bool, single_worker: bool) -> Self {
        if has_backend {
            Self::Distributed
        } else if single_worker {
            Self::Local
        } else {
            Self::Unavailable
        }
    }
}

pub struct StatsCounter {
    backend: BackendHandle,
    single_worker: AtomicBool,
    analyzed: AtomicU64,
    failed: AtomicU64,
}

impl StatsCounter {
    pub fn new(backend: BackendHandle, single_worker: bool) -> Self {
        Self {
            backend,
            single_worker: AtomicBool::new(single_worker),
            analyzed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// 模式随后端连接状态和 worker 数量变化
    pub fn mode(&self) -> CounterMode {
        CounterMode::resolve(
            self.backend.is_connected(),
            self.single_worker.load(Ordering::Relaxed),
        )
    }

    /// 配置重载后更新 worker 数量
    pub fn set_single_worker(&self, single_worker: bool) {
        self.single_worker.store(single_worker, Ordering::Relaxed);
    }

    pub async fn record_success(&self) {
        self.record(keys::ANALYZE_SUCCESS, &self.analyzed).await;
    }

    pub async fn record_failure(&self) {
        self.record(keys::ANALYZE_FAILED, &self.failed).await;
    }

    async fn record(&self, key: &str, local: &AtomicU64) {
        match (self.mode(), self.backend.get()) {
            (CounterMode::Distributed, Some(backend)) => {
                if let Err(e) = backend.incr(key).await {
                    debug!("Failed to increment {}: {}", key, e);
                }
            }
            (CounterMode::Local, _) => {
                local.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// 当前计数
    pub async fn snapshot(&self) -> Result<StatsSnapshot> {
        match (self.mode(), self.backend.get()) {
            (CounterMode::Distributed, Some(backend)) => Ok(StatsSnapshot {
                analyzed: backend.get_counter(keys::ANALYZE_SUCCESS).await?,
                failed: backend.get_counter(keys::ANALYZE_FAILED).await?,
            }),
            (CounterMode::Local, _) => Ok(StatsSnapshot {
                analyzed: self.analyzed.load(Ordering::Relaxed),
                failed: self.failed.load(Ordering::Relaxed),
            }),
            _ => Err(AnalyzerError::config(COUNTER_UNAVAILABLE)),
        }
    }

    /// 初始化共享计数器（仅 worker 0 调用）
    ///
    /// `reset` 为 true 时强制清零，否则只在不存在时创建
    pub async fn initialize(&self, reset: bool) -> Result<()> {
        let Some(backend) = self.backend.get() else {
            return Ok(());
        };

        for key in [keys::ANALYZE_SUCCESS, keys::ANALYZE_FAILED] {
            if reset {
                backend.set_counter(key, 0).await?;
            } else {
                backend.init_counter(key).await?;
            }
        }
        info!(
            "Counters initialized on {} backend (reset: {})",
            backend.name(),
            reset
        );
        Ok(())
    }
}
