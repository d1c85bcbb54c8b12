use serde_json::{Map, Value};
use tracing::debug;

use super::Analyzer;
use crate::cache::ResultCache;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::model::{AnalysisResult, IP_LIST_LIMIT, ResponseEnvelope, messages};
use crate::services::SchemaKind;

impl Analyzer {
    pub(super) async fn handle_status(&self) -> ResponseEnvelope {
        match self.stats.snapshot().await {
            Ok(snapshot) => ResponseEnvelope::success(serde_json::to_value(snapshot).ok(), None),
            Err(e) => {
                debug!("status unavailable: {}", e);
                ResponseEnvelope::error(e.message())
            }
        }
    }

    pub(super) async fn handle_ip(
        &self,
        config: &AppConfig,
        body: &Map<String, Value>,
    ) -> ResponseEnvelope {
        if let Err(violation) = self.schema.validate(SchemaKind::Ip, body) {
            debug!("invalid ip payload: {}", violation);
            return ResponseEnvelope::error(messages::INVALID_IP);
        }
        let Some(ip) = body.get("ip").and_then(Value::as_str) else {
            return ResponseEnvelope::error(messages::INVALID_IP);
        };

        let cache = self.result_cache(config);
        match self.analyze_ip(config, &cache, ip).await {
            Ok(result) => {
                self.stats.record_success().await;
                ResponseEnvelope::success(serde_json::to_value(result).ok(), None)
            }
            Err(e) => {
                debug!("lookup of {} failed: {}", ip, e);
                self.stats.record_failure().await;
                ResponseEnvelope::error(e.message())
            }
        }
    }

    pub(super) async fn handle_ip_list(
        &self,
        config: &AppConfig,
        body: &Map<String, Value>,
    ) -> ResponseEnvelope {
        if let Err(violation) = self.schema.validate(SchemaKind::IpList, body) {
            debug!("invalid iplist payload: {}", violation);
            return ResponseEnvelope::error(messages::INVALID_IP_LIST);
        }
        let Some(list) = body.get("iplist").and_then(Value::as_array) else {
            return ResponseEnvelope::error(messages::INVALID_IP_LIST);
        };
        if list.len() > IP_LIST_LIMIT {
            debug!("iplist with {} entries rejected", list.len());
            return ResponseEnvelope::error(messages::IP_LIST_TOO_LONG);
        }

        let cache = self.result_cache(config);
        let mut results = Map::new();

        for ip in list.iter().filter_map(Value::as_str).filter(|s| !s.is_empty()) {
            match self.analyze_ip(config, &cache, ip).await {
                Ok(result) => {
                    self.stats.record_success().await;
                    if let Ok(value) = serde_json::to_value(result) {
                        results.insert(ip.to_string(), value);
                    }
                }
                Err(e) => {
                    debug!("lookup of {} failed: {}", ip, e);
                    self.stats.record_failure().await;
                }
            }
        }

        ResponseEnvelope::success(Some(Value::Object(results)), None)
    }

    /// Cache under the current configuration snapshot
    fn result_cache(&self, config: &AppConfig) -> ResultCache {
        ResultCache::new(self.backend.get(), &config.cache)
    }

    /// Cache-then-lookup for one address
    async fn analyze_ip(
        &self,
        config: &AppConfig,
        cache: &ResultCache,
        ip: &str,
    ) -> Result<AnalysisResult> {
        if let Some(hit) = cache.get(ip).await {
            return Ok(hit);
        }

        let mut result = self.readers.lookup(ip)?;
        if config.blacklist.enabled {
            result = result.with_threat(self.blacklist.load().threat_level(ip));
        }

        cache.put(ip, &result).await;
        Ok(result)
    }
}
