//! In-process TTL cache for serialised GET responses.
//!
//! Entries are keyed by `<prefix>:<vary>:<path?query>` and removed either
//! when they expire or when a model event deletes every key matching a glob
//! pattern such as `*product_list*`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Bytes,
    expires_at: Instant,
}

pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_seconds),
            enabled: config.enabled && config.ttl_seconds > 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Build a cache key. The vary value (an `Authorization` header, say) is
    /// hashed so credentials never appear in keys or logs.
    pub fn key(prefix: &str, vary: Option<&str>, uri: &Uri) -> String {
        let vary = match vary {
            Some(value) => hex::encode(Sha256::digest(value.as_bytes())),
            None => "-".to_string(),
        };
        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        format!("{}:{}:{}", prefix, vary, target)
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }

        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.body.clone())
    }

    pub fn insert(&self, key: String, body: Bytes) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                body,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Remove every key matching a glob pattern, returning how many went
    pub fn delete_pattern(&self, pattern: &str) -> usize {
        let pattern = match glob::Pattern::new(pattern) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Invalid cache key pattern");
                return 0;
            }
        };

        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.matches(key));
        before.saturating_sub(self.entries.len())
    }

    /// Drop expired entries
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A 200 JSON response tagged with its cache status
pub fn json_response(body: Bytes, status: CacheStatus) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (
                header::HeaderName::from_static("x-cache"),
                HeaderValue::from_static(status.as_str()),
            ),
        ],
        body,
    )
        .into_response()
}

/// Spawn a background task that periodically evicts expired entries
pub fn spawn_cleanup_task(cache: Arc<ResponseCache>, cleanup_interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::time::sleep(interval).await;
            cache.cleanup_expired();
            tracing::debug!("Cache cleanup complete, {} entries remaining", cache.len());
        }
    });
}
