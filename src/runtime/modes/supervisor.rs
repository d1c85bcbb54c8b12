//! Supervisor mode
//!
//! The master process: owns named worker pools, restarts exited workers and
//! applies configuration reloads. Workers are copies of the current binary
//! started with `--worker-id <n>`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, config_path, reload_config};
use crate::system::platform::{
    ProcessSignal, SignalListener, cleanup_pidfile, init_pidfile, platform_name, send_signal,
};

/// 主服务 worker 池名称，配置重载时只调整这个池的大小
pub const ANALYZER_POOL: &str = "IpAnalyzer";

/// 启动后这么快就退出的 worker 延迟重启
const QUICK_EXIT: Duration = Duration::from_secs(1);
const RESPAWN_BACKOFF: Duration = Duration::from_secs(1);

/// 关闭时在 drain 超时之外额外等待的时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Number of workers the platform can run for this configuration
pub fn effective_workers(config: &AppConfig) -> usize {
    if cfg!(windows) {
        1
    } else {
        config.server.workers
    }
}

/// How to start one worker process
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The running binary with the given configuration file
    pub fn current_exe(config_path: &str) -> std::io::Result<Self> {
        Ok(Self::new(
            std::env::current_exe()?,
            vec!["--config".to_string(), config_path.to_string()],
        ))
    }

    fn build(&self, worker_id: usize) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--worker-id")
            .arg(worker_id.to_string())
            .kill_on_drop(true);
        cmd
    }
}

struct WorkerProcess {
    pid: Option<u32>,
    generation: u64,
    started: Instant,
    kill: Option<oneshot::Sender<()>>,
}

impl WorkerProcess {
    /// SIGTERM when possible so the worker drains, otherwise kill
    fn terminate(&mut self) {
        if let Some(pid) = self.pid
            && send_signal(pid, ProcessSignal::Terminate).is_ok()
        {
            return;
        }
        self.kill();
    }

    fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

struct WorkerPool {
    name: String,
    size: usize,
    command: WorkerCommand,
    workers: HashMap<usize, WorkerProcess>,
}

#[derive(Debug)]
enum PoolEvent {
    Exited {
        pool: String,
        worker_id: usize,
        generation: u64,
        status: Option<ExitStatus>,
    },
    Respawn {
        pool: String,
        worker_id: usize,
    },
}

enum Action {
    Signal(ProcessSignal),
    Event(PoolEvent),
}

pub struct Supervisor {
    pools: Vec<WorkerPool>,
    events_tx: mpsc::UnboundedSender<PoolEvent>,
    events_rx: mpsc::UnboundedReceiver<PoolEvent>,
    spawned: u64,
    shutting_down: bool,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            pools: Vec::new(),
            events_tx,
            events_rx,
            spawned: 0,
            shutting_down: false,
        }
    }

    pub fn add_pool(&mut self, name: &str, size: usize, command: WorkerCommand) {
        self.pools.push(WorkerPool {
            name: name.to_string(),
            size,
            command,
            workers: HashMap::new(),
        });
    }

    pub fn pool_size(&self, name: &str) -> Option<usize> {
        self.pool(name).map(|p| p.size)
    }

    /// Workers of the pool that have not been reaped yet
    pub fn running(&self, name: &str) -> usize {
        self.pool(name).map_or(0, |p| p.workers.len())
    }

    /// Total processes started so far
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    fn pool(&self, name: &str) -> Option<&WorkerPool> {
        self.pools.iter().find(|p| p.name == name)
    }

    fn pool_mut(&mut self, name: &str) -> Option<&mut WorkerPool> {
        self.pools.iter_mut().find(|p| p.name == name)
    }

    pub fn start_all(&mut self) {
        let targets: Vec<(String, usize)> = self
            .pools
            .iter()
            .flat_map(|p| (0..p.size).map(move |id| (p.name.clone(), id)))
            .collect();
        for (pool, worker_id) in targets {
            self.spawn_worker(&pool, worker_id);
        }
    }

    fn spawn_worker(&mut self, pool: &str, worker_id: usize) {
        let events = self.events_tx.clone();
        let generation = self.spawned + 1;
        let Some(p) = self.pool_mut(pool) else {
            return;
        };

        let mut child = match p.command.build(worker_id).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start {} worker {}: {}", pool, worker_id, e);
                schedule_respawn(events, pool.to_string(), worker_id);
                return;
            }
        };

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        p.workers.insert(
            worker_id,
            WorkerProcess {
                pid,
                generation,
                started: Instant::now(),
                kill: Some(kill_tx),
            },
        );
        self.spawned = generation;
        debug!("{} worker {} started (pid {:?})", pool, worker_id, pid);

        let pool = pool.to_string();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status.ok(),
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await.ok()
                }
            };
            let _ = events.send(PoolEvent::Exited {
                pool,
                worker_id,
                generation,
                status,
            });
        });
    }

    /// Grow or shrink a pool; surplus workers are asked to drain and exit
    pub fn resize(&mut self, name: &str, size: usize) {
        let Some(p) = self.pool_mut(name) else {
            warn!("Unknown worker pool: {}", name);
            return;
        };
        let old = p.size;
        p.size = size;

        if size < old {
            for (_, worker) in p.workers.iter_mut().filter(|(id, _)| **id >= size) {
                worker.terminate();
            }
        }

        let missing: Vec<usize> = (0..size).filter(|id| !p.workers.contains_key(id)).collect();
        for worker_id in missing {
            self.spawn_worker(name, worker_id);
        }

        if old != size {
            info!("Worker pool {} resized: {} -> {}", name, old, size);
        }
    }

    /// Send a signal to every worker of the pool
    fn forward(&self, name: &str, sig: ProcessSignal) {
        let Some(p) = self.pool(name) else {
            return;
        };
        for (id, worker) in p.workers.iter().filter(|(id, _)| **id < p.size) {
            if let Some(pid) = worker.pid
                && let Err(e) = send_signal(pid, sig)
            {
                warn!("Failed to signal {} worker {}: {}", name, id, e);
            }
        }
    }

    fn reload(&mut self) {
        match reload_config() {
            Ok(config) => {
                info!("Configuration reloaded from {}", config_path());
                self.resize(ANALYZER_POOL, effective_workers(&config));
                self.forward(ANALYZER_POOL, ProcessSignal::Reload);
            }
            Err(e) => error!("Configuration reload failed, keeping the current one: {}", e),
        }
    }

    fn handle_event(&mut self, event: PoolEvent) {
        let shutting_down = self.shutting_down;
        match event {
            PoolEvent::Exited {
                pool,
                worker_id,
                generation,
                status,
            } => {
                let Some(p) = self.pool_mut(&pool) else {
                    return;
                };
                if p.workers.get(&worker_id).map(|w| w.generation) != Some(generation) {
                    return;
                }
                let Some(worker) = p.workers.remove(&worker_id) else {
                    return;
                };
                let retired = worker_id >= p.size;
                info!("{} worker {} exited ({:?})", pool, worker_id, status);

                if shutting_down || retired {
                    return;
                }
                if worker.started.elapsed() < QUICK_EXIT {
                    warn!(
                        "{} worker {} exited right after start, restarting in {:?}",
                        pool, worker_id, RESPAWN_BACKOFF
                    );
                    schedule_respawn(self.events_tx.clone(), pool, worker_id);
                } else {
                    self.spawn_worker(&pool, worker_id);
                }
            }
            PoolEvent::Respawn { pool, worker_id } => {
                let wanted = self
                    .pool(&pool)
                    .is_some_and(|p| worker_id < p.size && !p.workers.contains_key(&worker_id));
                if wanted && !shutting_down {
                    self.spawn_worker(&pool, worker_id);
                }
            }
        }
    }

    /// Wait for and apply the next pool event
    pub async fn process_next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Terminate every worker and wait for them, killing stragglers at `grace`
    pub async fn shutdown(&mut self, grace: Duration) {
        self.shutting_down = true;
        for p in &mut self.pools {
            for worker in p.workers.values_mut() {
                worker.terminate();
            }
        }

        let deadline = Instant::now() + grace;
        while self.pools.iter().any(|p| !p.workers.is_empty()) {
            match timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => break,
                Err(_) => {
                    warn!("Workers did not exit within {:?}, killing", grace);
                    for p in &mut self.pools {
                        for worker in p.workers.values_mut() {
                            worker.kill();
                        }
                    }
                    break;
                }
            }
        }
        info!("All workers stopped");
    }

    pub async fn run(mut self, mut signals: SignalListener, grace: Duration) {
        self.start_all();

        loop {
            let action = tokio::select! {
                sig = signals.recv() => Action::Signal(sig),
                Some(event) = self.events_rx.recv() => Action::Event(event),
            };
            match action {
                Action::Signal(ProcessSignal::Reload) => self.reload(),
                Action::Signal(ProcessSignal::Terminate) => {
                    info!("Termination requested, stopping workers");
                    break;
                }
                Action::Event(event) => self.handle_event(event),
            }
        }

        self.shutdown(grace).await;
    }
}

fn schedule_respawn(events: mpsc::UnboundedSender<PoolEvent>, pool: String, worker_id: usize) {
    tokio::spawn(async move {
        sleep(RESPAWN_BACKOFF).await;
        let _ = events.send(PoolEvent::Respawn { pool, worker_id });
    });
}

/// Supervisor process entry point
pub async fn run_supervisor(config: std::sync::Arc<AppConfig>) -> Result<()> {
    init_pidfile().context("Failed to write the PID file")?;
    let signals = SignalListener::new().context("Failed to install signal handlers")?;
    let command =
        WorkerCommand::current_exe(config_path()).context("Failed to locate the executable")?;

    let workers = effective_workers(&config);
    let mut supervisor = Supervisor::new();
    supervisor.add_pool(ANALYZER_POOL, workers, command);
    info!(
        "ip-analyzer supervisor on {} ({}), {} worker(s)",
        config.listen_address(),
        platform_name(),
        workers
    );

    let grace = Duration::from_secs(config.server.drain_timeout_secs) + SHUTDOWN_GRACE;
    supervisor.run(signals, grace).await;
    cleanup_pidfile();
    Ok(())
}
