//! MaxMind GeoLite2 数据库实现
//!
//! 使用本地 GeoLite2-City.mmdb 文件进行 IP 地理位置查询

use std::net::IpAddr;
use std::path::Path;

use maxminddb::{Reader, geoip2};
use tracing::{trace, warn};

use super::provider::{GeoReader, LoadedReader};
use crate::errors::{AnalyzerError, Result};
use crate::model::AnalysisResult;

/// MaxMind GeoIP reader
pub struct MaxMindReader {
    reader: Reader<Vec<u8>>,
}

impl MaxMindReader {
    /// 从文件路径打开数据库
    pub fn open(path: &str) -> Result<Self> {
        let reader = Reader::open_readfile(path).map_err(|e| {
            AnalyzerError::geo_database(format!("Failed to open {}: {}", path, e))
        })?;
        Ok(Self { reader })
    }

    /// 打开主数据库，不可读时尝试备用路径
    ///
    /// 返回的 [`LoadedReader`] 记录实际使用的文件
    pub fn load(primary: &str, fallback: &str) -> Result<LoadedReader> {
        match Self::open(primary) {
            Ok(reader) => Ok(LoadedReader::new(Box::new(reader), primary)),
            Err(primary_err) if !fallback.is_empty() && Path::new(fallback).is_file() => {
                warn!(
                    "GeoIP: {}, falling back to {}",
                    primary_err.message(),
                    fallback
                );
                let reader = Self::open(fallback)?;
                Ok(LoadedReader::new(Box::new(reader), fallback))
            }
            Err(e) => Err(e),
        }
    }
}

impl GeoReader for MaxMindReader {
    fn lookup(&self, ip: &str) -> Result<AnalysisResult> {
        let ip_addr: IpAddr = ip.parse().map_err(|_| {
            AnalyzerError::geo_lookup(format!("The value \"{}\" is not a valid IP address.", ip))
        })?;

        let city: Option<geoip2::City> = self.reader.lookup(ip_addr)?.decode()?;
        let city = city.ok_or_else(|| {
            AnalyzerError::geo_lookup(format!("The address {} is not in the database.", ip))
        })?;

        let result = to_analysis_result(&city);
        trace!(
            "MaxMind lookup for {}: country={}, city={}",
            ip, result.country_iso, result.city
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "MaxMind"
    }
}

/// 将数据库记录映射为分析结果；缺失字段取默认值
fn to_analysis_result(city: &geoip2::City) -> AnalysisResult {
    // 最具体的行政区是列表中的最后一个
    let subdivision = city.subdivisions.last();

    AnalysisResult {
        continent_code: owned(city.continent.code),
        continent_name: owned(city.continent.names.english),
        country_iso: owned(city.country.iso_code),
        country_name: owned(city.country.names.english),
        is_eu: city.country.is_in_european_union.unwrap_or(false),
        city: owned(city.city.names.english),
        postal_code: owned(city.postal.code),
        subdivision_name: owned(subdivision.and_then(|s| s.names.english)),
        subdivision_iso: owned(subdivision.and_then(|s| s.iso_code)),
        accuracy_radius_km: city.location.accuracy_radius.map(u32::from).unwrap_or(0),
        latitude: city.location.latitude.unwrap_or(0.0),
        longitude: city.location.longitude.unwrap_or(0.0),
        time_zone: owned(city.location.time_zone),
        threat_level: None,
    }
}

fn owned(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_fails() {
        let err = MaxMindReader::open("/nonexistent/GeoLite2-City.mmdb")
            .err()
            .expect("open should fail");
        assert!(matches!(err, AnalyzerError::GeoDatabase(_)));
    }

    #[test]
    fn test_load_without_usable_fallback_returns_primary_error() {
        let err = MaxMindReader::load("/nonexistent/a.mmdb", "/nonexistent/b.mmdb")
            .err()
            .expect("load should fail");
        assert!(err.message().contains("/nonexistent/a.mmdb"));
    }

    #[test]
    fn test_load_with_broken_fallback_reports_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("broken.mmdb");
        std::fs::write(&fallback, b"not a database").unwrap();
        let fallback = fallback.to_string_lossy().to_string();

        let err = MaxMindReader::load("/nonexistent/a.mmdb", &fallback)
            .err()
            .expect("load should fail");
        assert!(err.message().contains("broken.mmdb"));
    }
}
