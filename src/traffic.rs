//! In-memory traffic log exposed through the admin surface — spec.md §6
//! "Admin surface" (ambient, grounded in the teacher's own `traffic.rs`).
//!
//! [`TrafficLog`] is a fixed-capacity ring-buffer: once full, the oldest
//! entry is evicted to make room for the newest. This gives a bounded, O(1)
//! memory footprint regardless of request volume — the same structure the
//! teacher uses, with entries re-shaped from "tier/backend" to this crate's
//! "route/provider/priority" model (spec.md §3 `Task`).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{Priority, Route};

/// Fixed-capacity ring-buffer of recent [`TrafficEntry`] records.
///
/// Safe to share across threads via `Arc<TrafficLog>`. [`push`][Self::push] uses
/// a non-blocking `try_lock` so it never delays request handling; in the
/// unlikely event of lock contention the entry is silently dropped.
pub struct TrafficLog {
    capacity: usize,
    entries: Mutex<VecDeque<TrafficEntry>>,
}

impl TrafficLog {
    /// Create a new log with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    /// Record a completed, cancelled or errored task.
    pub fn push(&self, entry: TrafficEntry) {
        if let Ok(mut entries) = self.entries.try_lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    /// Return up to `limit` recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<TrafficEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Compute aggregate statistics over all buffered entries.
    pub async fn stats(&self) -> TrafficStats {
        let entries = self.entries.lock().await;
        let total = entries.len();
        let avg_latency_ms = if total == 0 {
            0.0
        } else {
            entries.iter().map(|e| e.latency_ms as f64).sum::<f64>() / total as f64
        };

        let error_count = entries.iter().filter(|e| !e.success).count();

        let mut route_counts: std::collections::HashMap<Route, usize> = std::collections::HashMap::new();
        for entry in entries.iter() {
            *route_counts.entry(entry.route).or_default() += 1;
        }

        TrafficStats { total_requests: total, error_count, avg_latency_ms, route_counts }
    }
}

/// One completed (or failed) task, as recorded by the Channel Gateway once
/// the Router's terminal `TaskEvent` arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub channel_id: String,
    pub route: Route,
    pub provider: String,
    pub priority: Priority,
    pub latency_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

impl TrafficEntry {
    pub fn new(channel_id: String, route: Route, provider: String, priority: Priority, latency_ms: u64, success: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            channel_id,
            route,
            provider,
            priority,
            latency_ms,
            success,
            error: None,
        }
    }

    pub fn with_error(mut self, err: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(err.into());
        self
    }
}

/// Aggregate statistics derived from all buffered [`TrafficEntry`] records.
#[derive(Debug, Serialize)]
pub struct TrafficStats {
    pub total_requests: usize,
    pub error_count: usize,
    pub avg_latency_ms: f64,
    pub route_counts: std::collections::HashMap<Route, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(route: Route, latency_ms: u64) -> TrafficEntry {
        TrafficEntry::new("chan".into(), route, "local".into(), Priority::Normal, latency_ms, true)
    }

    #[tokio::test]
    async fn push_and_retrieve_single_entry() {
        let log = TrafficLog::new(10);
        log.push(make_entry(Route::Local, 42));

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].latency_ms, 42);
    }

    #[tokio::test]
    async fn recent_returns_entries_newest_first() {
        let log = TrafficLog::new(10);
        log.push(make_entry(Route::Local, 1));
        log.push(make_entry(Route::Cloud, 2));
        log.push(make_entry(Route::Cloud, 3));

        let recent = log.recent(10).await;
        assert_eq!(recent[0].latency_ms, 3);
        assert_eq!(recent[2].latency_ms, 1);
    }

    #[tokio::test]
    async fn ring_buffer_evicts_oldest_entry_once_full() {
        let log = TrafficLog::new(2);
        log.push(make_entry(Route::Local, 1));
        log.push(make_entry(Route::Local, 2));
        log.push(make_entry(Route::Local, 3));

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].latency_ms, 2);
    }

    #[tokio::test]
    async fn stats_compute_average_latency_and_error_count() {
        let log = TrafficLog::new(10);
        log.push(make_entry(Route::Local, 100));
        log.push(make_entry(Route::Cloud, 200).with_error("boom"));

        let stats = log.stats().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.avg_latency_ms, 150.0);
    }
}
