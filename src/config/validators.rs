//! 配置校验
//!
//! 启动和重载时对整份配置做一次检查，失败则拒绝使用新配置。

use super::{AppConfig, ExpireMode};
use crate::errors::{AnalyzerError, Result};
use crate::scheduler::CronSchedule;

/// 校验完整配置
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.server.host.trim().is_empty() {
        return Err(AnalyzerError::config("server.host cannot be empty"));
    }

    if config.server.workers == 0 {
        return Err(AnalyzerError::config("server.workers must be at least 1"));
    }

    if config.auth.enabled && !config.auth.has_credential() {
        return Err(AnalyzerError::config(
            "auth.hash cannot be empty when auth is enabled",
        ));
    }

    match config.cache.expire_mode {
        ExpireMode::Ttl if config.cache.ttl_secs == 0 => {
            return Err(AnalyzerError::config(
                "cache.ttl_secs must be greater than 0 in ttl mode",
            ));
        }
        ExpireMode::Bounded if config.cache.max_items == 0 => {
            return Err(AnalyzerError::config(
                "cache.max_items must be greater than 0 in bounded mode",
            ));
        }
        _ => {}
    }

    if config.blacklist.enabled && config.blacklist.path.trim().is_empty() {
        return Err(AnalyzerError::config(
            "blacklist.path cannot be empty when blacklist is enabled",
        ));
    }

    validate_cron("server.restart_cron", &config.server.restart_cron)?;
    validate_cron("mmdb.reload_cron", &config.mmdb.reload_cron)?;
    if config.blacklist.enabled {
        validate_cron("blacklist.update_cron", &config.blacklist.update_cron)?;
    }

    Ok(())
}

/// 空字符串表示不启用；否则必须能解析
fn validate_cron(key: &str, expr: &str) -> Result<()> {
    if expr.trim().is_empty() {
        return Ok(());
    }
    CronSchedule::parse(expr)
        .map(|_| ())
        .map_err(|e| AnalyzerError::config(format!("{}: {}", key, e)))
}
