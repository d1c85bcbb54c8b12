//! Worker mode
//!
//! One worker process: accept loop on the shared port, one JSON request per
//! connection, graceful drain on recycle.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::{reload_config, try_get_config};
use crate::runtime::lifetime::{WorkerResourcePool, drain_connections};
use crate::runtime::{ConnectionGuard, WorkerContext};
use crate::system::platform::{ProcessSignal, SignalListener, bind_shared_listener};

/// 单个请求的大小上限
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Read until a complete JSON value, EOF, the size cap or the deadline
pub async fn read_request<R>(reader: &mut R, read_timeout: Duration) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + read_timeout;
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    while buf.len() < MAX_REQUEST_BYTES {
        let n = match timeout_at(deadline, reader.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_) => {
                debug!("Read timed out with {} byte(s) buffered", buf.len());
                break;
            }
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if is_complete_json(&buf) {
            break;
        }
    }

    buf.truncate(MAX_REQUEST_BYTES);
    Ok(buf)
}

fn is_complete_json(buf: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(buf).is_ok()
}

pub struct WorkerServer {
    ctx: Arc<WorkerContext>,
    listener: TcpListener,
}

impl WorkerServer {
    /// Bind the shared port
    pub fn bind(ctx: Arc<WorkerContext>, addr: SocketAddr) -> io::Result<Self> {
        let listener = bind_shared_listener(addr)?;
        Ok(Self { ctx, listener })
    }

    pub fn from_listener(ctx: Arc<WorkerContext>, listener: TcpListener) -> Self {
        Self { ctx, listener }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until recycled, then drain open connections
    pub async fn run(self) {
        let Self { ctx, listener } = self;
        info!(
            "Worker {} listening on {}",
            ctx.worker_id,
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );

        loop {
            tokio::select! {
                _ = ctx.recycle.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let guard = ctx.track_connection();
                        tokio::spawn(handle_connection(ctx.clone(), stream, peer, guard));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        drop(listener);
        let drain_timeout = Duration::from_secs(ctx.config().server.drain_timeout_secs);
        drain_connections(&ctx, drain_timeout).await;
    }
}

async fn handle_connection(
    ctx: Arc<WorkerContext>,
    mut stream: TcpStream,
    peer: SocketAddr,
    _guard: ConnectionGuard,
) {
    let config = ctx.config();
    let read_timeout = Duration::from_secs(config.server.read_timeout_secs);

    let bytes = match read_request(&mut stream, read_timeout).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read from {}: {}", peer, e);
            return;
        }
    };

    let response = ctx.analyzer.handle_bytes(&config, &bytes).await;
    if let Err(e) = stream.write_all(&response.to_bytes()).await {
        error!("Failed to reply to {}: {}", peer, e);
    }
    let _ = stream.shutdown().await;

    let served = ctx.record_request();
    let max_requests = config.server.max_requests;
    if max_requests > 0 && served >= max_requests {
        ctx.recycle.trigger("max requests reached");
    }
}

/// 处理发给 worker 的信号：SIGHUP 重载配置，SIGTERM 回收
fn spawn_signal_handler(ctx: Arc<WorkerContext>) {
    let mut listener = match SignalListener::new() {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Signal handling unavailable: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            match listener.recv().await {
                ProcessSignal::Reload => match reload_config() {
                    Ok(config) => ctx.update_config(config),
                    Err(e) => error!("Configuration reload failed: {}", e),
                },
                ProcessSignal::Terminate => {
                    ctx.recycle.trigger("terminate signal");
                    break;
                }
            }
        }
    });
}

/// Worker process entry point
pub async fn run_worker(worker_id: usize) -> Result<()> {
    let config = try_get_config().context("Configuration is not loaded")?;
    let addr = tokio::net::lookup_host(config.listen_address())
        .await
        .with_context(|| format!("Failed to resolve {}", config.listen_address()))?
        .next()
        .with_context(|| format!("No address for {}", config.listen_address()))?;

    let ctx = WorkerContext::new(worker_id, config);
    let server = WorkerServer::bind(ctx.clone(), addr)
        .with_context(|| format!("Failed to bind {}", addr))?;

    WorkerResourcePool::new(ctx.clone()).start();
    spawn_signal_handler(ctx.clone());

    server.run().await;
    ctx.scheduler.shutdown();
    info!(
        "Worker {} exiting after {} request(s)",
        worker_id,
        ctx.requests()
    );
    Ok(())
}
