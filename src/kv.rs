// src/kv.rs
//! TTL-aware key-value store behind a trait so request handlers never depend
//! on a concrete backend. Writes are best-effort at every call site: a failed
//! put is logged by the caller and never fails a request.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

/// Page size used by the in-memory backend when listing keys. `list` always
/// drains every page so callers see the complete key set.
const LIST_PAGE_SIZE: usize = 1000;

pub const ITEM_PREFIX: &str = "item:";
pub const CLUSTER_PREFIX: &str = "cluster:";
pub const ENRICH_PREFIX: &str = "enrich:";
pub const FETCH_PREFIX: &str = "fetch:";

pub const FIRST_SEEN_TTL_SECS: u64 = 7 * 24 * 3600;
pub const FETCH_CACHE_TTL_SECS: u64 = 180;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn put(&self, key: &str, value: Value, ttl_secs: u64) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    /// All keys under `prefix`, iterating internal pages to completion.
    async fn list(&self, prefix: &str) -> Vec<String>;
}

struct Entry {
    value: Value,
    expires_at_ms: i64,
}

/// In-process backend. Expiry is enforced lazily on read and during listing.
pub struct MemoryKv {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// One page of live keys at or after `cursor`, plus the next cursor.
    fn list_page(&self, prefix: &str, cursor: Option<&str>) -> (Vec<String>, Option<String>) {
        let now = now_ms();
        let guard = self.inner.lock().expect("kv mutex poisoned");
        let mut keys: Vec<&String> = guard
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at_ms > now)
            .map(|(k, _)| k)
            .collect();
        keys.sort();

        let start = match cursor {
            Some(c) => keys.partition_point(|k| k.as_str() <= c),
            None => 0,
        };
        let page: Vec<String> = keys[start..]
            .iter()
            .take(LIST_PAGE_SIZE)
            .map(|k| k.to_string())
            .collect();
        let next = if start + page.len() < keys.len() {
            page.last().cloned()
        } else {
            None
        };
        (page, next)
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = now_ms();
        let mut guard = self.inner.lock().expect("kv mutex poisoned");
        match guard.get(key) {
            Some(e) if e.expires_at_ms > now => Some(e.value.clone()),
            Some(_) => {
                guard.remove(key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, key: &str, value: Value, ttl_secs: u64) -> anyhow::Result<()> {
        anyhow::ensure!(ttl_secs > 0, "kv put requires a positive ttl");
        let mut guard = self.inner.lock().expect("kv mutex poisoned");
        guard.insert(
            key.to_string(),
            Entry {
                value,
                expires_at_ms: now_ms() + (ttl_secs as i64) * 1000,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().expect("kv mutex poisoned");
        guard.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (page, next) = self.list_page(prefix, cursor.as_deref());
            out.extend(page);
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        out
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
