use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::SystemTime;

use tracing::debug;

use crate::config::BlacklistConfig;
use crate::errors::{AnalyzerError, Result};

/// 不可变的黑名单快照
///
/// 文件格式：`#` 开头为注释，其余每行 `ip<TAB>level`。
/// 只保留 `level >= min_level` 的条目，最多读取 `max_lines` 行数据。
#[derive(Debug, Clone, Default)]
pub struct BlacklistSnapshot {
    levels: HashMap<String, u32>,
    modified: Option<SystemTime>,
}

impl BlacklistSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从已打开的数据流解析
    pub fn parse<R: BufRead>(input: R, min_level: u32, max_lines: usize) -> Self {
        let mut levels = HashMap::new();
        let mut count = 0usize;

        for line in input.lines() {
            if count >= max_lines {
                break;
            }
            let Ok(line) = line else {
                break;
            };
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            count += 1;

            let mut parts = line.splitn(2, '\t');
            let ip = parts.next().unwrap_or_default().trim();
            let level = parts
                .next()
                .and_then(|l| l.trim().parse::<u32>().ok())
                .unwrap_or(0);

            if !ip.is_empty() && level >= min_level {
                levels.insert(ip.to_string(), level);
            }
        }

        Self {
            levels,
            modified: None,
        }
    }

    /// 按配置读取黑名单文件，同时记录文件修改时间
    pub fn load(config: &BlacklistConfig) -> Result<Self> {
        let file = File::open(&config.path).map_err(|e| {
            AnalyzerError::blacklist(format!("Failed to open {}: {}", config.path, e))
        })?;
        let modified = file.metadata().and_then(|m| m.modified()).ok();

        let mut snapshot = Self::parse(BufReader::new(file), config.min_level, config.max_lines);
        snapshot.modified = modified;
        debug!(
            "Blacklist loaded from {}: {} entries",
            config.path,
            snapshot.len()
        );
        Ok(snapshot)
    }

    /// 威胁等级，未收录返回 0
    pub fn threat_level(&self, ip: &str) -> u32 {
        self.levels.get(ip).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// 加载时文件的修改时间
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}
