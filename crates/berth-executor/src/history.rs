//! Per-context action history and metrics.
//!
//! History is a fixed-capacity ring, oldest evicted on overflow. Records
//! keep the error kind only; free-form messages never enter the ring, so
//! metrics stay cardinality-safe. Percentiles are recomputed from the ring
//! on read; totals come from running counters that survive eviction.

use std::collections::{HashMap, VecDeque};

use berth_types::ErrorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub action_type: String,
    pub page_id: Option<String>,
    pub context_id: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub at: DateTime<Utc>,
}

pub struct HistoryRing {
    capacity: usize,
    records: VecDeque<ActionRecord>,
    total: u64,
    successes: u64,
    failures: u64,
    by_type: HashMap<String, u64>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::with_capacity(capacity.max(1)),
            total: 0,
            successes: 0,
            failures: 0,
            by_type: HashMap::new(),
        }
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.total += 1;
        if record.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        *self.by_type.entry(record.action_type.clone()).or_insert(0) += 1;
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Newest-first slice of retained records.
    pub fn recent(&self, limit: usize) -> Vec<ActionRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn metrics(&self) -> ContextMetrics {
        let mut durations: Vec<u64> = self.records.iter().map(|r| r.duration_ms).collect();
        durations.sort_unstable();
        let (min, max, avg, p95) = if durations.is_empty() {
            (0, 0, 0.0, 0)
        } else {
            let sum: u64 = durations.iter().sum();
            let p95_idx =
                ((durations.len() as f64 * 0.95).ceil() as usize).clamp(1, durations.len()) - 1;
            (
                durations[0],
                durations[durations.len() - 1],
                sum as f64 / durations.len() as f64,
                durations[p95_idx],
            )
        };
        ContextMetrics {
            total: self.total,
            successes: self.successes,
            failures: self.failures,
            by_type: self.by_type.clone(),
            duration_min_ms: min,
            duration_avg_ms: avg,
            duration_p95_ms: p95,
            duration_max_ms: max,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetrics {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub by_type: HashMap<String, u64>,
    pub duration_min_ms: u64,
    pub duration_avg_ms: f64,
    pub duration_p95_ms: u64,
    pub duration_max_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(action: &str, success: bool, duration_ms: u64) -> ActionRecord {
        ActionRecord {
            action_type: action.to_string(),
            page_id: None,
            context_id: "ctx_test".to_string(),
            success,
            duration_ms,
            error: (!success).then_some(ErrorKind::Timeout),
            at: Utc::now(),
        }
    }

    #[test]
    fn ring_evicts_oldest_but_totals_survive() {
        let mut ring = HistoryRing::new(3);
        for i in 0..5 {
            ring.push(record("navigate", true, i * 10));
        }
        assert_eq!(ring.len(), 3);
        let metrics = ring.metrics();
        assert_eq!(metrics.total, 5);
        assert_eq!(metrics.successes, 5);
        // Oldest two evicted; min reflects the retained window.
        assert_eq!(metrics.duration_min_ms, 20);
    }

    #[test]
    fn metrics_aggregate_by_type_and_outcome() {
        let mut ring = HistoryRing::new(10);
        ring.push(record("navigate", true, 100));
        ring.push(record("click", false, 50));
        ring.push(record("navigate", true, 200));

        let metrics = ring.metrics();
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.successes, 2);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.by_type["navigate"], 2);
        assert_eq!(metrics.by_type["click"], 1);
        assert_eq!(metrics.duration_min_ms, 50);
        assert_eq!(metrics.duration_max_ms, 200);
        assert!((metrics.duration_avg_ms - 116.666).abs() < 0.01);
    }

    #[test]
    fn p95_on_small_windows() {
        let mut ring = HistoryRing::new(100);
        for d in [10, 20, 30, 40, 50, 60, 70, 80, 90, 100] {
            ring.push(record("wait", true, d));
        }
        assert_eq!(ring.metrics().duration_p95_ms, 100);
    }

    #[test]
    fn recent_is_newest_first() {
        let mut ring = HistoryRing::new(5);
        ring.push(record("a", true, 1));
        ring.push(record("b", true, 2));
        let recent = ring.recent(10);
        assert_eq!(recent[0].action_type, "b");
        assert_eq!(recent[1].action_type, "a");
    }
}
