//! 响应缓存
//! 以规范化后的请求 URL 为键，过期条目保留用于请求失败时回退。
//! 过期超过 `STALE_RETENTION_FACTOR` 倍 TTL 的条目不再保留，条目数超过容量时淘汰最旧的。

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL_SECONDS: u64 = 5 * 60;
pub const DEFAULT_CAPACITY: usize = 1000;
pub const STALE_RETENTION_FACTOR: u32 = 12;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    stored_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub expired: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECONDS))
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            capacity: DEFAULT_CAPACITY,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    fn retention(&self) -> Duration {
        self.ttl.saturating_mul(STALE_RETENTION_FACTOR)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 未过期的缓存
    pub fn get_fresh(&self, url: &str) -> Option<String> {
        let key = normalize_key(url);
        self.entries()
            .get(&key)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| e.payload.clone())
    }

    /// 不论是否过期
    pub fn get_any(&self, url: &str) -> Option<String> {
        let key = normalize_key(url);
        self.entries().get(&key).map(|e| e.payload.clone())
    }

    pub fn put(&self, url: &str, payload: &str) {
        let key = normalize_key(url);
        let mut entries = self.entries();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let retention = self.retention();
            entries.retain(|_, e| e.stored_at.elapsed() < retention);
            while entries.len() >= self.capacity {
                let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                payload: payload.to_string(),
                stored_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// 删除超过保留期限的过期条目，返回删除数
    pub fn purge_stale(&self) -> usize {
        let retention = self.retention();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.stored_at.elapsed() < retention);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries();
        CacheStats {
            size: entries.len(),
            expired: entries
                .values()
                .filter(|e| e.stored_at.elapsed() >= self.ttl)
                .count(),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

/// 去掉首尾空白与片段，查询参数按键排序；无法解析的 URL 原样使用
pub fn normalize_key(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(mut parsed) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    parsed.set_fragment(None);
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }
    parsed.to_string()
}
