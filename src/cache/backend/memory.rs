use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cache::CacheBackend;
use crate::errors::{AnalyzerError, Result};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct MemoryState {
    values: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<String>>,
}

impl MemoryState {
    fn live_value(&mut self, key: &str) -> Option<&Entry> {
        let now = Instant::now();
        if self.values.get(key).is_some_and(|e| !e.is_live(now)) {
            self.values.remove(key);
        }
        self.values.get(key)
    }
}

/// In-process backend with the same semantics as [`super::RedisBackend`]
///
/// Every operation runs under one lock, which also makes the compound
/// index operations atomic. Used when embedding and in tests.
#[derive(Default)]
pub struct MemoryBackend {
    key_prefix: String,
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            key_prefix: prefix.to_string(),
            ..Self::default()
        }
    }

    /// Make every operation fail, as a disconnected server would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether a live value exists under the relative key
    pub fn contains(&self, key: &str) -> bool {
        let key = self.make_key(key);
        self.state.lock().live_value(&key).is_some()
    }

    /// Remaining time-to-live of a relative key, `None` without expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let key = self.make_key(key);
        let mut state = self.state.lock();
        let entry = state.live_value(&key)?;
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Members of a list, head first
    pub fn list(&self, key: &str) -> Vec<String> {
        let key = self.make_key(key);
        self.state
            .lock()
            .lists
            .get(&key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Relative keys of all live values starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let full = self.make_key(prefix);
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .state
            .lock()
            .values
            .iter()
            .filter(|(k, e)| k.starts_with(&full) && e.is_live(now))
            .map(|(k, _)| k[self.key_prefix.len()..].to_string())
            .collect();
        keys.sort();
        keys
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AnalyzerError::cache_connection("memory backend is unavailable"));
        }
        Ok(())
    }

    fn put(&self, key: &str, value: String, expires_at: Option<Instant>) {
        self.state
            .lock()
            .values
            .insert(self.make_key(key), Entry { value, expires_at });
    }

    fn parse_counter(key: &str, value: &str) -> Result<u64> {
        value.parse::<u64>().map_err(|_| {
            AnalyzerError::cache_operation(format!("value at {} is not an integer", key))
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_available()?;
        let key = self.make_key(key);
        Ok(self.state.lock().live_value(&key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        self.put(key, value.to_string(), None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.ensure_available()?;
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.put(key, value.to_string(), Some(expires_at));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()> {
        self.ensure_available()?;
        let key = self.make_key(key);
        let mut state = self.state.lock();
        if state.live_value(&key).is_some()
            && let Some(entry) = state.values.get_mut(&key)
        {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    async fn push_index(&self, index: &str, member: &str) -> Result<usize> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let list = state.lists.entry(self.make_key(index)).or_default();
        list.retain(|m| m != member);
        list.push_front(member.to_string());
        Ok(list.len())
    }

    async fn evict(&self, index: &str, keep: usize, entry_prefix: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        let mut state = self.state.lock();

        let tail: Vec<String> = match state.lists.get_mut(&self.make_key(index)) {
            Some(list) if list.len() > keep => list.split_off(keep).into_iter().collect(),
            _ => Vec::new(),
        };
        for member in &tail {
            state
                .values
                .remove(&format!("{}{}{}", self.key_prefix, entry_prefix, member));
        }
        Ok(tail)
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        self.ensure_available()?;
        let full = self.make_key(key);
        let mut state = self.state.lock();
        let current = match state.live_value(&full) {
            Some(entry) => Self::parse_counter(key, &entry.value)?,
            None => 0,
        };
        let next = current + 1;
        let expires_at = state.values.get(&full).and_then(|e| e.expires_at);
        state.values.insert(
            full,
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn get_counter(&self, key: &str) -> Result<u64> {
        self.ensure_available()?;
        let full = self.make_key(key);
        match self.state.lock().live_value(&full) {
            Some(entry) => Self::parse_counter(key, &entry.value),
            None => Ok(0),
        }
    }

    async fn set_counter(&self, key: &str, value: u64) -> Result<()> {
        self.ensure_available()?;
        self.put(key, value.to_string(), None);
        Ok(())
    }

    async fn init_counter(&self, key: &str) -> Result<bool> {
        self.ensure_available()?;
        let full = self.make_key(key);
        let mut state = self.state.lock();
        if state.live_value(&full).is_some() {
            return Ok(false);
        }
        state.values.insert(
            full,
            Entry {
                value: "0".to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_applied() {
        let backend = MemoryBackend::with_prefix("P:");
        backend.set("k", "v").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(backend.keys_with_prefix(""), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_ttl_expiry_and_refresh() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "v", 0).await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());

        backend.set_ex("k", "v", 10).await.unwrap();
        backend.expire("k", 3600).await.unwrap();
        assert!(backend.ttl("k").unwrap() > Duration::from_secs(3000));
    }

    #[tokio::test]
    async fn test_evict_trims_index_and_entries() {
        let backend = MemoryBackend::new();
        for ip in ["a", "b", "c", "d"] {
            backend.set(&format!("result:{}", ip), "{}").await.unwrap();
            backend.push_index("index", ip).await.unwrap();
        }

        let evicted = backend.evict("index", 2, "result:").await.unwrap();
        assert_eq!(evicted, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(backend.list("index"), vec!["d".to_string(), "c".to_string()]);
        assert_eq!(
            backend.keys_with_prefix("result:"),
            vec!["result:c".to_string(), "result:d".to_string()]
        );

        assert!(backend.evict("index", 2, "result:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_index_moves_existing_member() {
        let backend = MemoryBackend::new();
        for ip in ["a", "b", "a"] {
            backend.push_index("index", ip).await.unwrap();
        }
        assert_eq!(backend.list("index"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(backend.push_index("index", "c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_counters() {
        let backend = MemoryBackend::new();
        assert!(backend.init_counter("c").await.unwrap());
        assert_eq!(backend.incr("c").await.unwrap(), 1);
        assert!(!backend.init_counter("c").await.unwrap());
        assert_eq!(backend.get_counter("c").await.unwrap(), 1);
        backend.set_counter("c", 0).await.unwrap();
        assert_eq!(backend.get_counter("missing").await.unwrap(), 0);
        assert_eq!(backend.get_counter("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_operation() {
        let backend = MemoryBackend::new();
        backend.set_unavailable(true);
        assert!(backend.get("k").await.is_err());
        assert!(backend.incr("c").await.is_err());
        backend.set_unavailable(false);
        assert!(backend.get("k").await.is_ok());
    }
}
