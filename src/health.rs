//! Liveness probe over the queue and the durable store.
//!
//! Used by external monitoring (the `status` CLI command); the core
//! pipeline never consults it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::queue::JobQueue;
use crate::store::JobStore;

/// Snapshot of dependency liveness and queue depth.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall verdict: every dependency answered.
    pub healthy: bool,
    /// Redis answered a PING.
    pub queue: bool,
    /// The store answered the readiness probe.
    pub store: bool,
    /// Jobs currently waiting in the queue.
    pub queue_depth: usize,
    /// When the probe ran.
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    fn verdict(queue: bool, store: bool) -> bool {
        queue && store
    }
}

/// Probes the queue and store and assembles a report.
pub async fn check(queue: &JobQueue, store: &dyn JobStore) -> HealthReport {
    let queue_alive = match queue.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "queue liveness probe failed");
            false
        }
    };

    let store_alive = match store.probe_ready().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "store liveness probe failed");
            false
        }
    };

    let queue_depth = queue.len().await.unwrap_or(0);

    HealthReport {
        healthy: HealthReport::verdict(queue_alive, store_alive),
        queue: queue_alive,
        store: store_alive,
        queue_depth,
        timestamp: Utc::now(),
    }
}
