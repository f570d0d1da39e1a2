//! Runtime counters for the scoring pipeline.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::detector::types::RiskLevel;

/// Lock-free counters updated once per scored transaction.
#[derive(Default)]
pub struct DetectionCounters {
    analyzed: AtomicU64,
    blocked: AtomicU64,
    scorer_fallbacks: AtomicU64,
    by_level: [AtomicU64; 5],
}

impl DetectionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, level: RiskLevel, blocked: bool) {
        self.analyzed.fetch_add(1, Ordering::Relaxed);
        if blocked {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
        self.by_level[level as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scorer_fallback(&self) {
        self.scorer_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let by_level = RiskLevel::ALL
            .iter()
            .map(|level| {
                (
                    level.as_str().to_string(),
                    self.by_level[*level as usize].load(Ordering::Relaxed),
                )
            })
            .collect();

        CounterSnapshot {
            transactions_analyzed: self.analyzed.load(Ordering::Relaxed),
            transactions_blocked: self.blocked.load(Ordering::Relaxed),
            scorer_fallbacks: self.scorer_fallbacks.load(Ordering::Relaxed),
            by_level,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub transactions_analyzed: u64,
    pub transactions_blocked: u64,
    pub scorer_fallbacks: u64,
    pub by_level: BTreeMap<String, u64>,
}
