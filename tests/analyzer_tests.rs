mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use ip_analyzer::config::{AppConfig, AuthConfig};
use ip_analyzer::model::{ResponseStatus, messages};
use ip_analyzer::services::{BlacklistSnapshot, hash_secret};
use ip_analyzer::stats::COUNTER_UNAVAILABLE;
use serde_json::{Value, json};

use common::fixture;

fn config() -> AppConfig {
    AppConfig::default()
}

#[cfg(test)]
mod envelope_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_payloads() {
        let f = fixture(false, true);
        for raw in [
            &b""[..],
            b"{}",
            b"null",
            b"[]",
            b"not json",
            b"{\"ip\":",
            b"0",
            b"false",
            b"\"0\"",
            b"\"ping\"",
            b"[{\"ping\":\"\"}]",
        ] {
            let response = f.analyzer.handle_bytes(&config(), raw).await;
            assert_eq!(response.status, ResponseStatus::Error);
            assert_eq!(response.message.as_deref(), Some(messages::EMPTY_PAYLOAD));
            assert!(response.data.is_none());
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let f = fixture(false, true);
        let response = f.analyzer.handle(&config(), json!({"ping": ""})).await;
        assert!(response.is_success());
        assert_eq!(response.message.as_deref(), Some("pong"));
        assert!(response.data.is_none());

        let wire: Value = serde_json::from_slice(&response.to_bytes()).unwrap();
        assert_eq!(wire, json!({"status": "success", "data": null, "message": "pong"}));
    }

    #[tokio::test]
    async fn test_unknown_category() {
        let f = fixture(false, true);
        let response = f.analyzer.handle(&config(), json!({"lookup": "1.1.1.1"})).await;
        assert_eq!(response.message.as_deref(), Some(messages::INVALID_REQUEST));
    }

    #[tokio::test]
    async fn test_auth_field_alone_without_auth() {
        let f = fixture(false, true);
        let response = f.analyzer.handle(&config(), json!({"auth": "secret"})).await;
        assert_eq!(response.message.as_deref(), Some(messages::INVALID_REQUEST));
    }

    #[tokio::test]
    async fn test_first_key_decides_category() {
        let f = fixture(false, true);
        let response = f
            .analyzer
            .handle_bytes(&config(), br#"{"ping":"","ip":"1.1.1.1"}"#)
            .await;
        assert_eq!(response.message.as_deref(), Some("pong"));
    }
}

#[cfg(test)]
mod auth_tests {
    use super::*;

    fn auth_config(secret: &str) -> AppConfig {
        let mut config = config();
        config.auth = AuthConfig::new(true, Some(hash_secret(secret).unwrap()));
        config
    }

    #[tokio::test]
    async fn test_valid_secret_is_stripped() {
        let f = fixture(false, true);
        let config = auth_config("s3cret");
        let response = f
            .analyzer
            .handle(&config, json!({"auth": "s3cret", "ping": ""}))
            .await;
        assert_eq!(response.message.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_rejections_share_one_message() {
        let f = fixture(false, true);
        let config = auth_config("s3cret");
        for payload in [
            json!({"ping": ""}),
            json!({"auth": "wrong", "ping": ""}),
            json!({"auth": "", "ping": ""}),
            json!({"auth": 42, "ping": ""}),
        ] {
            let response = f.analyzer.handle(&config, payload).await;
            assert_eq!(response.message.as_deref(), Some(messages::UNAUTHORIZED));
        }
        assert_eq!(f.lookups.load(Ordering::SeqCst), 0);
    }
}

#[cfg(test)]
mod ip_tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_success() {
        let f = fixture(false, true);
        let response = f.analyzer.handle(&config(), json!({"ip": "8.8.8.8"})).await;
        assert!(response.is_success());

        let data = response.data.unwrap();
        assert_eq!(data["iso"], "DE");
        assert_eq!(data["timezone"], "Europe/Berlin");
        assert_eq!(data["isEU"], true);
        assert!(data.get("threat").is_none());
    }

    #[tokio::test]
    async fn test_invalid_ip_shapes() {
        let f = fixture(false, true);
        for payload in [json!({"ip": ""}), json!({"ip": 7}), json!({"ip": null})] {
            let response = f.analyzer.handle(&config(), payload).await;
            assert_eq!(response.message.as_deref(), Some(messages::INVALID_IP));
        }
    }

    #[tokio::test]
    async fn test_lookup_fault_text_is_returned_raw() {
        let f = fixture(false, true);
        let response = f.analyzer.handle(&config(), json!({"ip": "999.1.1.1"})).await;
        assert_eq!(
            response.message.as_deref(),
            Some("The value \"999.1.1.1\" is not a valid IP address.")
        );

        let response = f.analyzer.handle(&config(), json!({"ip": "10.0.0.1"})).await;
        assert_eq!(
            response.message.as_deref(),
            Some("The address 10.0.0.1 is not in the database.")
        );
    }

    #[tokio::test]
    async fn test_threat_annotation() {
        let f = fixture(false, true);
        let feed = "# IPsum\n203.0.113.9\t5\n198.51.100.1\t1\n";
        f.blacklist
            .store(Arc::new(BlacklistSnapshot::parse(Cursor::new(feed), 2, 100)));

        let mut config = config();
        config.blacklist.enabled = true;

        let listed = f.analyzer.handle(&config, json!({"ip": "203.0.113.9"})).await;
        assert_eq!(listed.data.unwrap()["threat"], 5);

        // 低于最低等级的条目不会收录
        let below = f.analyzer.handle(&config, json!({"ip": "198.51.100.1"})).await;
        assert_eq!(below.data.unwrap()["threat"], 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_reader() {
        let f = fixture(true, true);
        let config = config();

        let first = f.analyzer.handle(&config, json!({"ip": "8.8.4.4"})).await;
        let second = f.analyzer.handle(&config, json!({"ip": "8.8.4.4"})).await;
        assert_eq!(first, second);
        assert_eq!(f.lookups.load(Ordering::SeqCst), 1);
        assert!(f.backend.unwrap().contains("result:8.8.4.4"));
    }

    #[tokio::test]
    async fn test_reader_not_loaded_yet() {
        use ip_analyzer::analyzer::Analyzer;
        use ip_analyzer::cache::BackendHandle;
        use ip_analyzer::services::ReaderSlot;
        use ip_analyzer::stats::StatsCounter;

        let analyzer = Analyzer::new(
            Arc::new(ReaderSlot::new()),
            Arc::new(arc_swap::ArcSwap::from_pointee(BlacklistSnapshot::empty())),
            BackendHandle::none(),
            Arc::new(StatsCounter::new(BackendHandle::none(), true)),
        );
        let response = analyzer.handle(&config(), json!({"ip": "8.8.8.8"})).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(
            response.message.as_deref(),
            Some("geo reader is not initialized")
        );
    }
}

#[cfg(test)]
mod iplist_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_entries_are_omitted() {
        let f = fixture(false, true);
        let response = f
            .analyzer
            .handle(
                &config(),
                json!({"iplist": ["8.8.8.8", "nope", "10.1.1.1", "", 5, "2001:4860::8888"]}),
            )
            .await;
        assert!(response.is_success());

        let data = response.data.unwrap();
        let keys: Vec<&String> = data.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["8.8.8.8", "2001:4860::8888"]);
        assert_eq!(data["2001:4860::8888"]["accuracy"], 100);
    }

    #[tokio::test]
    async fn test_limit() {
        let f = fixture(false, true);
        let list: Vec<String> = (0..101).map(|i| format!("1.1.1.{}", i % 255)).collect();
        let response = f.analyzer.handle(&config(), json!({"iplist": list})).await;
        assert_eq!(response.message.as_deref(), Some(messages::IP_LIST_TOO_LONG));
        assert_eq!(f.lookups.load(Ordering::SeqCst), 0);

        let status = f.analyzer.handle(&config(), json!({"status": ""})).await;
        assert_eq!(status.data, Some(json!({"analyzed": 0, "failed": 0})));

        let list: Vec<String> = (0..100).map(|i| format!("1.1.1.{}", i)).collect();
        let response = f.analyzer.handle(&config(), json!({"iplist": list})).await;
        assert_eq!(response.data.unwrap().as_object().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_not_an_array() {
        let f = fixture(false, true);
        let response = f.analyzer.handle(&config(), json!({"iplist": "1.1.1.1"})).await;
        assert_eq!(response.message.as_deref(), Some(messages::INVALID_IP_LIST));
    }
}

#[cfg(test)]
mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_local_counters() {
        let f = fixture(false, true);
        let config = config();
        f.analyzer.handle(&config, json!({"ip": "8.8.8.8"})).await;
        f.analyzer.handle(&config, json!({"ip": "bad"})).await;
        f.analyzer
            .handle(&config, json!({"iplist": ["1.1.1.1", "10.0.0.1"]}))
            .await;

        let response = f.analyzer.handle(&config, json!({"status": ""})).await;
        assert_eq!(response.data, Some(json!({"analyzed": 2, "failed": 2})));
    }

    #[tokio::test]
    async fn test_multi_worker_without_backend() {
        let f = fixture(false, false);
        let response = f.analyzer.handle(&config(), json!({"status": ""})).await;
        assert_eq!(response.message.as_deref(), Some(COUNTER_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_distributed_counters_shared() {
        let f = fixture(true, false);
        let config = config();
        f.analyzer.handle(&config, json!({"ip": "8.8.8.8"})).await;
        f.analyzer.handle(&config, json!({"ip": "8.8.8.8"})).await;

        let response = f.analyzer.handle(&config, json!({"status": ""})).await;
        assert_eq!(response.data, Some(json!({"analyzed": 2, "failed": 0})));
    }
}
