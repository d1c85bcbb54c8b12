//! IPsum 黑名单
//!
//! - `snapshot`: 解析后的只读 IP → 威胁等级映射
//! - `updater`: 在独占文件锁下下载最新列表

mod snapshot;
mod updater;

pub use snapshot::BlacklistSnapshot;
pub use updater::BlacklistUpdater;
