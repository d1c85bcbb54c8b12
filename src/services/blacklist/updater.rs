use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use tracing::{debug, info, warn};
use ureq::Agent;

use crate::config::BlacklistConfig;
use crate::errors::{AnalyzerError, Result};
use crate::system::platform::{is_locked, lock_exclusive, lock_path_for};

/// 下载超时时间
const HTTP_TIMEOUT_SECS: u64 = 60;

/// 全局 HTTP Agent（ureq 的 Agent 是 Send + Sync）
static HTTP_AGENT: OnceLock<Agent> = OnceLock::new();

fn get_agent() -> &'static Agent {
    HTTP_AGENT.get_or_init(|| {
        Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(HTTP_TIMEOUT_SECS)))
            .build()
            .into()
    })
}

/// 黑名单下载器
///
/// 下载期间持有 `<path>.lock` 的独占锁，其他 worker 通过
/// [`BlacklistUpdater::is_updating`] 判断是否需要等待。
/// 内容先写入临时文件再改名，读取方不会看到半截文件。
#[derive(Debug, Clone)]
pub struct BlacklistUpdater {
    url: String,
    path: String,
    lock_path: String,
}

impl BlacklistUpdater {
    pub fn new(config: &BlacklistConfig) -> Self {
        Self {
            url: config.url.clone(),
            path: config.path.clone(),
            lock_path: lock_path_for(&config.path),
        }
    }

    /// 是否有进程正在更新文件
    pub fn is_updating(&self) -> bool {
        is_locked(&self.lock_path)
    }

    /// 下载最新列表（阻塞）
    pub fn update(&self) -> Result<()> {
        if self.url.is_empty() || self.path.is_empty() {
            return Err(AnalyzerError::blacklist("blacklist url or path is empty"));
        }

        let _lock = lock_exclusive(&self.lock_path).map_err(|e| {
            AnalyzerError::blacklist(format!(
                "Failed to acquire an exclusive lock on {}: {}",
                self.lock_path, e
            ))
        })?;
        debug!("Blacklist lock acquired: {}", self.lock_path);

        let tmp_path = format!("{}.tmp", self.path);
        let result = self.download_to(&tmp_path).and_then(|bytes| {
            fs::rename(&tmp_path, &self.path)?;
            Ok(bytes)
        });

        match result {
            Ok(bytes) => {
                info!("Blacklist updated from {} ({} bytes)", self.url, bytes);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    /// 在阻塞线程池中下载
    pub async fn update_async(&self) -> Result<()> {
        let updater = self.clone();
        tokio::task::spawn_blocking(move || updater.update())
            .await
            .unwrap_or_else(|e| {
                warn!("Blacklist download task failed: {}", e);
                Err(AnalyzerError::blacklist(e.to_string()))
            })
    }

    fn download_to(&self, tmp_path: &str) -> Result<u64> {
        if let Some(parent) = Path::new(tmp_path).parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let response = get_agent().get(&self.url).call().map_err(|e| {
            AnalyzerError::blacklist(format!("Request to \"{}\" failed: {}", self.url, e))
        })?;

        let mut reader = response.into_body().into_reader();
        let mut file = File::create(tmp_path)?;
        let bytes = io::copy(&mut reader, &mut file)?;
        file.sync_all()?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_requires_url() {
        let config = BlacklistConfig {
            url: String::new(),
            ..Default::default()
        };
        let err = BlacklistUpdater::new(&config).update().unwrap_err();
        assert!(matches!(err, AnalyzerError::Blacklist(_)));
    }

    #[test]
    fn test_failed_download_leaves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipsum.txt");
        fs::write(&path, "1.2.3.4\t5\n").unwrap();

        let config = BlacklistConfig {
            url: "http://127.0.0.1:9/ipsum.txt".to_string(),
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let updater = BlacklistUpdater::new(&config);
        assert!(updater.update().is_err());
        assert!(!updater.is_updating());
        assert_eq!(fs::read_to_string(&path).unwrap(), "1.2.3.4\t5\n");
        assert!(!dir.path().join("ipsum.txt.tmp").exists());
    }

    #[test]
    fn test_not_updating_without_lock_file() {
        let config = BlacklistConfig {
            path: "/nonexistent/ipsum.txt".to_string(),
            ..Default::default()
        };
        assert!(!BlacklistUpdater::new(&config).is_updating());
    }
}
