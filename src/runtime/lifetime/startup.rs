//! Worker 资源初始化
//!
//! 每个步骤独立 spawn，互不阻塞：
//! 1. 内存守卫（每 60 秒）
//! 2. 定时重启（restart_cron）
//! 3. Redis 连接，0 号 worker 初始化计数器
//! 4. 黑名单加载与定时更新
//! 5. GeoIP 数据库加载与定时重载

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheBackend, RedisBackend};
use crate::config::AppConfig;
use crate::runtime::WorkerContext;
use crate::scheduler::CronSchedule;
use crate::services::{BlacklistSnapshot, BlacklistUpdater, MaxMindReader};

/// 内存检查间隔
const MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// 定时重启时每个 worker 错开的间隔
const RESTART_STAGGER: Duration = Duration::from_secs(30);

/// 非 0 号 worker 等待黑名单更新的轮询间隔
const BLACKLIST_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 轮询次数上限（10 分钟）
const BLACKLIST_POLL_BUDGET: u32 = 600;

/// 当前进程常驻内存（字节）
pub fn resident_memory() -> Option<u64> {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory())
}

/// 超过上限且没有活动连接时才回收；上限为 0 表示不检查
pub fn exceeds_memory_limit(used_bytes: u64, limit_mb: u64, active_connections: usize) -> bool {
    limit_mb > 0 && active_connections == 0 && used_bytes > limit_mb * 1024 * 1024
}

/// 解析可选的 cron 配置项，空字符串表示未启用
fn parse_cron(name: &str, expr: &str) -> Option<CronSchedule> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }
    match expr.parse::<CronSchedule>() {
        Ok(schedule) => Some(schedule),
        Err(e) => {
            error!("{}: {}", name, e);
            None
        }
    }
}

fn file_modified(path: &str) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

pub struct WorkerResourcePool {
    ctx: Arc<WorkerContext>,
}

impl WorkerResourcePool {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// 启动调度器并 spawn 所有初始化步骤
    pub fn start(&self) {
        let config = self.ctx.config();
        self.ctx.scheduler.start();

        self.start_memory_guard();
        self.start_restart_cron(&config);

        if config.redis.enabled {
            tokio::spawn(connect_backend(self.ctx.clone()));
        }
        if config.blacklist.enabled {
            tokio::spawn(init_blacklist(self.ctx.clone()));
        }
        tokio::spawn(init_geo_reader(self.ctx.clone()));

        debug!("Worker {} resource pool started", self.ctx.worker_id);
    }

    fn start_memory_guard(&self) {
        let ctx = self.ctx.clone();
        self.ctx
            .scheduler
            .every("memory-guard", MEMORY_CHECK_INTERVAL, move |_| {
                let ctx = ctx.clone();
                async move {
                    let limit_mb = ctx.config().server.max_memory_mb;
                    let Some(used) = tokio::task::spawn_blocking(resident_memory)
                        .await
                        .ok()
                        .flatten()
                    else {
                        debug!("Memory usage unavailable");
                        return;
                    };
                    if exceeds_memory_limit(used, limit_mb, ctx.active_connections()) {
                        warn!(
                            "Memory usage {} MB exceeds {} MB",
                            used / 1024 / 1024,
                            limit_mb
                        );
                        ctx.recycle.trigger("memory limit exceeded");
                    }
                }
            });
    }

    fn start_restart_cron(&self, config: &AppConfig) {
        let Some(schedule) = parse_cron("server.restart_cron", &config.server.restart_cron) else {
            return;
        };

        let ctx = self.ctx.clone();
        let delay = RESTART_STAGGER * self.ctx.worker_id as u32;
        let registered = self
            .ctx
            .scheduler
            .cron("restart", schedule, move |_| {
                let ctx = ctx.clone();
                async move {
                    debug!("Scheduled restart in {:?}", delay);
                    let inner = ctx.clone();
                    ctx.scheduler.once("restart-delayed", delay, move |_| {
                        let ctx = inner.clone();
                        async move { ctx.recycle.trigger("scheduled restart") }
                    });
                }
            });
        if registered.is_none() {
            warn!("server.restart_cron never fires, ignored");
        }
    }
}

async fn connect_backend(ctx: Arc<WorkerContext>) {
    let config = ctx.config();
    let backend = match RedisBackend::connect(&config.redis).await {
        Ok(backend) => Arc::new(backend) as Arc<dyn CacheBackend>,
        Err(e) => {
            error!("Redis unavailable, running without cache: {}", e);
            return;
        }
    };

    ctx.backend.install(backend);
    info!("Worker {} connected to Redis", ctx.worker_id);

    if ctx.worker_id == 0
        && let Err(e) = ctx.stats.initialize(config.redis.reset_stats_on_start).await
    {
        warn!("Failed to initialize counters: {}", e);
    }
}

/// 重新读取黑名单文件并替换快照
fn reload_blacklist(ctx: &WorkerContext) {
    let config = ctx.config();
    match BlacklistSnapshot::load(&config.blacklist) {
        Ok(snapshot) => {
            info!("Blacklist loaded: {} entries", snapshot.len());
            ctx.blacklist.store(Arc::new(snapshot));
        }
        Err(e) => warn!("{}", e),
    }
}

async fn init_blacklist(ctx: Arc<WorkerContext>) {
    {
        let ctx = ctx.clone();
        let _ = tokio::task::spawn_blocking(move || reload_blacklist(&ctx)).await;
    }

    let config = ctx.config();
    let Some(schedule) = parse_cron("blacklist.update_cron", &config.blacklist.update_cron) else {
        return;
    };

    let job_ctx = ctx.clone();
    ctx.scheduler.cron("blacklist-update", schedule, move |_| {
        let ctx = job_ctx.clone();
        async move {
            if ctx.worker_id == 0 {
                update_blacklist(ctx).await;
            } else {
                watch_blacklist(ctx);
            }
        }
    });
}

async fn update_blacklist(ctx: Arc<WorkerContext>) {
    let updater = BlacklistUpdater::new(&ctx.config().blacklist);
    if let Err(e) = updater.update_async().await {
        error!("Blacklist update failed: {}", e);
        return;
    }
    let _ = tokio::task::spawn_blocking(move || reload_blacklist(&ctx)).await;
}

/// 每秒检查一次，锁释放且文件已更新时重新加载
fn watch_blacklist(ctx: Arc<WorkerContext>) {
    poll_blacklist(ctx, BLACKLIST_POLL_INTERVAL, BLACKLIST_POLL_BUDGET);
}

/// 替换上一次的轮询任务；重新加载或用完次数后移除自身
fn poll_blacklist(ctx: Arc<WorkerContext>, interval: Duration, budget: u32) {
    if let Some(previous) = ctx.blacklist_poll.lock().take() {
        ctx.scheduler.remove(previous);
    }

    let updater = BlacklistUpdater::new(&ctx.config().blacklist);
    let known = ctx.blacklist.load().modified();
    let polls = Arc::new(std::sync::atomic::AtomicU32::new(0));

    let job_ctx = ctx.clone();
    let id = ctx
        .scheduler
        .every("blacklist-poll", interval, move |id| {
            let ctx = job_ctx.clone();
            let updater = updater.clone();
            let polls = polls.clone();
            async move {
                let count = polls.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
                let path = ctx.config().blacklist.path.clone();
                let changed = !updater.is_updating() && file_modified(&path) != known;

                if changed {
                    let reload_ctx = ctx.clone();
                    let _ = tokio::task::spawn_blocking(move || reload_blacklist(&reload_ctx)).await;
                } else if count < budget {
                    return;
                } else {
                    warn!("Blacklist was not updated after {} polls", count);
                }

                ctx.scheduler.remove(id);
                let mut slot = ctx.blacklist_poll.lock();
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        });
    *ctx.blacklist_poll.lock() = Some(id);
}

async fn init_geo_reader(ctx: Arc<WorkerContext>) {
    load_geo_reader(&ctx).await;

    let config = ctx.config();
    let Some(schedule) = parse_cron("mmdb.reload_cron", &config.mmdb.reload_cron) else {
        return;
    };

    let job_ctx = ctx.clone();
    ctx.scheduler.cron("mmdb-reload", schedule, move |_| {
        let ctx = job_ctx.clone();
        async move { load_geo_reader(&ctx).await }
    });
}

/// 构建新的 reader 并原子替换；失败时保留旧 reader
async fn load_geo_reader(ctx: &WorkerContext) {
    let mmdb = ctx.config().mmdb.clone();
    let loaded =
        tokio::task::spawn_blocking(move || MaxMindReader::load(&mmdb.path, &mmdb.fallback_path))
            .await;

    match loaded {
        Ok(Ok(reader)) => ctx.readers.store(reader),
        Ok(Err(e)) => error!("GeoIP database unavailable: {}", e),
        Err(e) => error!("GeoIP loader task failed: {}", e),
    }
}
