#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use ip_analyzer::analyzer::Analyzer;
use ip_analyzer::cache::{BackendHandle, CacheBackend, MemoryBackend};
use ip_analyzer::errors::{AnalyzerError, Result};
use ip_analyzer::model::AnalysisResult;
use ip_analyzer::services::{BlacklistSnapshot, GeoReader, LoadedReader, ReaderSlot};
use ip_analyzer::stats::StatsCounter;

/// 内存中的 GeoReader，记录查询次数
///
/// `10.*` 视为数据库中不存在的地址
pub struct CountingReader {
    pub lookups: Arc<AtomicUsize>,
}

impl GeoReader for CountingReader {
    fn lookup(&self, ip: &str) -> Result<AnalysisResult> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let addr: IpAddr = ip.parse().map_err(|_| {
            AnalyzerError::geo_lookup(format!("The value \"{}\" is not a valid IP address.", ip))
        })?;
        if ip.starts_with("10.") {
            return Err(AnalyzerError::geo_lookup(format!(
                "The address {} is not in the database.",
                ip
            )));
        }

        Ok(AnalysisResult {
            continent_code: "EU".to_string(),
            continent_name: "Europe".to_string(),
            country_iso: "DE".to_string(),
            country_name: "Germany".to_string(),
            is_eu: true,
            city: "Berlin".to_string(),
            accuracy_radius_km: if addr.is_ipv6() { 100 } else { 20 },
            latitude: 52.52,
            longitude: 13.405,
            time_zone: "Europe/Berlin".to_string(),
            ..AnalysisResult::default()
        })
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

pub struct Fixture {
    pub analyzer: Analyzer,
    pub readers: Arc<ReaderSlot>,
    pub blacklist: Arc<ArcSwap<BlacklistSnapshot>>,
    pub backend: Option<Arc<MemoryBackend>>,
    pub lookups: Arc<AtomicUsize>,
}

/// 构建带假 reader 的 Analyzer；`with_backend` 时共享一个 MemoryBackend
pub fn fixture(with_backend: bool, single_worker: bool) -> Fixture {
    let lookups = Arc::new(AtomicUsize::new(0));
    let readers = Arc::new(ReaderSlot::new());
    readers.store(LoadedReader::new(
        Box::new(CountingReader {
            lookups: lookups.clone(),
        }),
        "memory",
    ));

    let blacklist = Arc::new(ArcSwap::from_pointee(BlacklistSnapshot::empty()));
    let backend = with_backend.then(|| Arc::new(MemoryBackend::with_prefix("IP_ANALYZER:")));
    let handle = match &backend {
        Some(backend) => BackendHandle::connected(backend.clone() as Arc<dyn CacheBackend>),
        None => BackendHandle::none(),
    };
    let stats = Arc::new(StatsCounter::new(handle.clone(), single_worker));
    let analyzer = Analyzer::new(readers.clone(), blacklist.clone(), handle, stats);

    Fixture {
        analyzer,
        readers,
        blacklist,
        backend,
        lookups,
    }
}
