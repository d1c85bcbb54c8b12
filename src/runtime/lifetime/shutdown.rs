use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::runtime::WorkerContext;

/// 排空检查间隔
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 等待所有连接结束，最多等待 `timeout`
///
/// 返回是否在超时前排空
pub async fn drain_connections(ctx: &WorkerContext, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    loop {
        let active = ctx.active_connections();
        if active == 0 {
            info!("Worker {} drained all connections", ctx.worker_id);
            return true;
        }
        if Instant::now() >= deadline {
            warn!(
                "Drain timed out after {:?} with {} connection(s) still open",
                timeout, active
            );
            return false;
        }
        sleep(DRAIN_POLL_INTERVAL).await;
    }
}
