//! GeoIP 查询抽象层
//!
//! worker 持有一个 [`ReaderSlot`]，定时任务构建新的 reader 后整体替换。
//! 请求开始时取出当前 reader 的 `Arc`，旧 reader 在最后一个请求结束后释放。

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::info;

use crate::errors::{AnalyzerError, Result};
use crate::model::AnalysisResult;

/// reader 尚未加载时返回给客户端的错误文本
pub const UNINITIALIZED_READER: &str = "geo reader is not initialized";

/// GeoIP 查询 trait
///
/// 返回的结果不含 `threat`，由调用方按黑名单补充。
/// 错误的 `message()` 会原样返回给客户端。
pub trait GeoReader: Send + Sync {
    fn lookup(&self, ip: &str) -> Result<AnalysisResult>;

    /// 获取 reader 名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 已加载的 reader 及其来源
pub struct LoadedReader {
    reader: Box<dyn GeoReader>,
    source: String,
}

impl LoadedReader {
    pub fn new(reader: Box<dyn GeoReader>, source: impl Into<String>) -> Self {
        Self {
            reader,
            source: source.into(),
        }
    }

    pub fn lookup(&self, ip: &str) -> Result<AnalysisResult> {
        self.reader.lookup(ip)
    }

    pub fn name(&self) -> &'static str {
        self.reader.name()
    }

    /// 数据来源（文件路径）
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// 可热替换的 reader 槽位，可能为空
#[derive(Default)]
pub struct ReaderSlot {
    current: ArcSwapOption<LoadedReader>,
}

impl ReaderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子替换当前 reader
    pub fn store(&self, reader: LoadedReader) {
        info!(
            "GeoIP: {} reader loaded from {}",
            reader.name(),
            reader.source()
        );
        self.current.store(Some(Arc::new(reader)));
    }

    /// 当前 reader 的快照
    pub fn current(&self) -> Option<Arc<LoadedReader>> {
        self.current.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// 使用当前 reader 查询；槽位为空时返回固定错误
    pub fn lookup(&self, ip: &str) -> Result<AnalysisResult> {
        match self.current() {
            Some(reader) => reader.lookup(ip),
            None => Err(AnalyzerError::geo_lookup(UNINITIALIZED_READER)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReader(&'static str);

    impl GeoReader for FixedReader {
        fn lookup(&self, _ip: &str) -> Result<AnalysisResult> {
            Ok(AnalysisResult {
                country_iso: self.0.to_string(),
                ..Default::default()
            })
        }

        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    #[test]
    fn test_empty_slot_reports_uninitialized() {
        let slot = ReaderSlot::new();
        assert!(!slot.is_loaded());
        let err = slot.lookup("8.8.8.8").unwrap_err();
        assert_eq!(err.message(), UNINITIALIZED_READER);
    }

    #[test]
    fn test_swap_keeps_in_flight_reader() {
        let slot = ReaderSlot::new();
        slot.store(LoadedReader::new(Box::new(FixedReader("US")), "a.mmdb"));

        let in_flight = slot.current().expect("reader loaded");
        slot.store(LoadedReader::new(Box::new(FixedReader("JP")), "b.mmdb"));

        assert_eq!(in_flight.lookup("1.1.1.1").unwrap().country_iso, "US");
        assert_eq!(in_flight.source(), "a.mmdb");
        assert_eq!(slot.lookup("1.1.1.1").unwrap().country_iso, "JP");
    }
}
