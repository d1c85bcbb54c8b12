//! Per-worker shared state

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::info;

use crate::analyzer::{Analyzer, BlacklistSlot};
use crate::cache::BackendHandle;
use crate::config::AppConfig;
use crate::scheduler::{JobId, Scheduler};
use crate::services::{BlacklistSnapshot, ReaderSlot};
use crate::stats::StatsCounter;

/// One-way switch asking the worker to drain and exit
#[derive(Default)]
pub struct RecycleSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl RecycleSignal {
    /// Fire the signal; only the first reason is logged
    pub fn trigger(&self, reason: &str) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            info!("Worker recycle requested: {}", reason);
        }
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once the signal has fired
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything one worker process shares between its connections and jobs
pub struct WorkerContext {
    pub worker_id: usize,
    config: ArcSwap<AppConfig>,
    pub readers: Arc<ReaderSlot>,
    pub blacklist: Arc<BlacklistSlot>,
    pub backend: BackendHandle,
    pub stats: Arc<StatsCounter>,
    pub analyzer: Arc<Analyzer>,
    pub scheduler: Scheduler,
    pub recycle: RecycleSignal,
    active_connections: AtomicUsize,
    requests: AtomicU64,
    /// 非 0 号 worker 等待黑名单更新完成的轮询任务
    pub(crate) blacklist_poll: Mutex<Option<JobId>>,
}

impl WorkerContext {
    pub fn new(worker_id: usize, config: Arc<AppConfig>) -> Arc<Self> {
        let readers = Arc::new(ReaderSlot::new());
        let blacklist = Arc::new(ArcSwap::from_pointee(BlacklistSnapshot::empty()));
        let backend = BackendHandle::none();
        let stats = Arc::new(StatsCounter::new(
            backend.clone(),
            config.is_single_worker(),
        ));
        let analyzer = Arc::new(Analyzer::new(
            readers.clone(),
            blacklist.clone(),
            backend.clone(),
            stats.clone(),
        ));

        Arc::new(Self {
            worker_id,
            config: ArcSwap::new(config),
            readers,
            blacklist,
            backend,
            stats,
            analyzer,
            scheduler: Scheduler::new(),
            recycle: RecycleSignal::default(),
            active_connections: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            blacklist_poll: Mutex::new(None),
        })
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    /// Swap in a reloaded configuration
    pub fn update_config(&self, config: Arc<AppConfig>) {
        self.stats.set_single_worker(config.is_single_worker());
        self.config.store(config);
        info!("Worker {} configuration updated", self.worker_id);
    }

    /// Count an open connection until the guard drops
    pub fn track_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard { ctx: self.clone() }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Count a served request, returns the new total
    pub fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    ctx: Arc<WorkerContext>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.ctx.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_connection_guard_counts() {
        let ctx = WorkerContext::new(0, Arc::new(AppConfig::default()));
        let first = ctx.track_connection();
        let second = ctx.track_connection();
        assert_eq!(ctx.active_connections(), 2);
        drop(first);
        assert_eq!(ctx.active_connections(), 1);
        drop(second);
        assert_eq!(ctx.active_connections(), 0);
    }

    #[test]
    fn test_request_counter() {
        let ctx = WorkerContext::new(1, Arc::new(AppConfig::default()));
        assert_eq!(ctx.record_request(), 1);
        assert_eq!(ctx.record_request(), 2);
        assert_eq!(ctx.requests(), 2);
    }

    #[tokio::test]
    async fn test_recycle_wakes_waiters() {
        let ctx = WorkerContext::new(0, Arc::new(AppConfig::default()));
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.recycle.wait().await })
        };
        tokio::task::yield_now().await;
        ctx.recycle.trigger("test");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();

        // 已触发后再等待立即返回
        ctx.recycle.wait().await;
        assert!(ctx.recycle.is_triggered());
    }

    #[test]
    fn test_update_config_switches_counter_mode() {
        let mut config = AppConfig::default();
        config.server.workers = 4;
        let ctx = WorkerContext::new(0, Arc::new(config.clone()));
        assert_eq!(ctx.stats.mode(), crate::stats::CounterMode::Unavailable);

        config.server.workers = 1;
        ctx.update_config(Arc::new(config));
        assert_eq!(ctx.stats.mode(), crate::stats::CounterMode::Local);
        assert_eq!(ctx.config().server.workers, 1);
    }
}
