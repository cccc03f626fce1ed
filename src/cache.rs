//! Cache-aside memoization of analysis results.
//!
//! The worker checks this cache before running the analysis pipeline and
//! populates it after a miss. Entries carry a per-entry TTL (default 24h)
//! and are purely advisory: a cache fault degrades to a miss on read and a
//! no-op on write, never failing or stalling the job.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::job::RepoCoords;

/// Key prefix for cached analysis results.
const KEY_PREFIX: &str = "review:cache";

/// Builds the cache key for a subject.
///
/// Keyed by subject identity, scoped by repository coordinates when present
/// so equal PR numbers from different repositories never collide. Two
/// revisions of the same PR share a key; the TTL bounds how stale a served
/// result can be.
pub fn cache_key(repo: Option<&RepoCoords>, pr_number: u64) -> String {
    match repo {
        Some(coords) => format!("{KEY_PREFIX}:{coords}#{pr_number}"),
        None => format!("{KEY_PREFIX}:pr:{pr_number}"),
    }
}

/// Cached result of one analysis run.
///
/// This is the cache-entry wire format: JSON carrying the result message,
/// the finding count, and the summary text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    /// Combined result message persisted to the job record.
    pub message: String,
    /// Number of findings the static analysis produced.
    pub findings_count: usize,
    /// Natural-language summary text.
    pub summary: String,
}

/// Key/value store memoizing expensive analysis results.
///
/// Implementations must degrade gracefully: `get` answers `None` and `set`
/// is a no-op when the backing store is unreachable.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Looks up a live entry for `key`, or `None` on miss, expiry, or fault.
    async fn get(&self, key: &str) -> Option<AnalysisBundle>;

    /// Stores `bundle` under `key` with the given time-to-live.
    async fn set(&self, key: &str, bundle: &AnalysisBundle, ttl: Duration);
}

/// Redis-backed analysis cache using per-key expiry.
pub struct RedisCache {
    redis: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis and creates a new cache client.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self { redis })
    }

    /// Creates a cache from an existing connection manager.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl AnalysisCache for RedisCache {
    async fn get(&self, key: &str) -> Option<AnalysisBundle> {
        let mut conn = self.redis.clone();

        let data: Option<String> = match conn.get(key).await {
            Ok(data) => data,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let data = data?;
        match serde_json::from_str(&data) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                // An unreadable entry is as good as absent.
                warn!(key, error = %e, "cache entry unparseable, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, bundle: &AnalysisBundle, ttl: Duration) {
        let data = match serde_json::to_string(bundle) {
            Ok(data) => data,
            Err(e) => {
                warn!(key, error = %e, "cache entry serialization failed, skipping write");
                return;
            }
        };

        let mut conn = self.redis.clone();
        let ttl_secs = ttl.as_secs().max(1) as u64;
        match conn.set_ex::<_, _, ()>(key, data, ttl_secs).await {
            Ok(()) => debug!(key, ttl_secs, "cache entry written"),
            Err(e) => warn!(key, error = %e, "cache write failed, skipping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_with_repo() {
        let coords = RepoCoords::new("octocat", "hello-world");
        assert_eq!(
            cache_key(Some(&coords), 42),
            "review:cache:octocat/hello-world#42"
        );
    }

    #[test]
    fn test_cache_key_without_repo() {
        assert_eq!(cache_key(None, 42), "review:cache:pr:42");
    }

    #[test]
    fn test_cache_key_deterministic() {
        let coords = RepoCoords::new("a", "b");
        assert_eq!(cache_key(Some(&coords), 7), cache_key(Some(&coords), 7));
        assert_ne!(cache_key(Some(&coords), 7), cache_key(None, 7));
    }

    #[test]
    fn test_bundle_serialization_roundtrip() {
        let bundle = AnalysisBundle {
            message: "Analyzed PR #42: 3 findings.".to_string(),
            findings_count: 3,
            summary: "Looks mostly fine.".to_string(),
        };

        let json = serde_json::to_string(&bundle).expect("serialization should work");
        let parsed: AnalysisBundle =
            serde_json::from_str(&json).expect("deserialization should work");

        assert_eq!(parsed, bundle);
    }
}
