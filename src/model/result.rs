use serde::{Deserialize, Serialize};

/// 单个 IP 的分析结果
///
/// 序列化字段名是对外协议的一部分，缺失的数据库字段一律填默认值，
/// 不会出现缺键的情况。`threat` 只在启用黑名单时输出。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "code", default)]
    pub continent_code: String,
    #[serde(rename = "continent", default)]
    pub continent_name: String,
    #[serde(rename = "iso", default)]
    pub country_iso: String,
    #[serde(rename = "country", default)]
    pub country_name: String,
    #[serde(rename = "isEU", default)]
    pub is_eu: bool,
    #[serde(default)]
    pub city: String,
    #[serde(rename = "postal", default)]
    pub postal_code: String,
    #[serde(rename = "div", default)]
    pub subdivision_name: String,
    #[serde(rename = "divIso", default)]
    pub subdivision_iso: String,
    #[serde(rename = "accuracy", default)]
    pub accuracy_radius_km: u32,
    #[serde(rename = "lat", default)]
    pub latitude: f64,
    #[serde(rename = "long", default)]
    pub longitude: f64,
    #[serde(rename = "timezone", default)]
    pub time_zone: String,
    #[serde(rename = "threat", default, skip_serializing_if = "Option::is_none")]
    pub threat_level: Option<u32>,
}

impl AnalysisResult {
    /// 附加威胁等级
    pub fn with_threat(mut self, level: u32) -> Self {
        self.threat_level = Some(level);
        self
    }
}

/// `status` 请求返回的统计数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub analyzed: u64,
    pub failed: u64,
}
