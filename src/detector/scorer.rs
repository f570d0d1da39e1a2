use chrono::Timelike;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ScorerError;

use super::types::Transaction;

/// Output of a predictive scorer. Both values are nominally in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub score: f64,
    pub confidence: f64,
}

/// Opaque model consulted by the detector when predictive scoring is
/// enabled. Implementations must not block indefinitely and must tolerate
/// concurrent calls.
pub trait PredictiveScorer: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, tx: &Transaction) -> Result<Prediction, ScorerError>;

    fn is_ready(&self) -> bool {
        true
    }
}

/// Feature-threshold stand-in for a trained model.
pub struct HeuristicScorer {
    ready: AtomicBool,
}

impl HeuristicScorer {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictiveScorer for HeuristicScorer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn predict(&self, tx: &Transaction) -> Result<Prediction, ScorerError> {
        if !self.is_ready() {
            return Err(ScorerError::Unavailable {
                name: self.name().to_string(),
            });
        }

        let mut score = 0.0;
        if tx.amount > 10_000.0 {
            score += 0.2;
        }
        if tx.amount > 50_000.0 {
            score += 0.3;
        }

        let hour = tx.timestamp.hour();
        if (2..=5).contains(&hour) {
            score += 0.1;
        }

        // Same case-insensitive match as `Condition::TransactionType`.
        if tx.transaction_type.eq_ignore_ascii_case("WIRE_TRANSFER") {
            score += 0.15;
        }

        // Less device context, less confidence.
        let mut confidence = 0.85;
        if tx.device_id.is_empty() {
            confidence -= 0.1;
        }
        if tx.ip_address.is_empty() {
            confidence -= 0.1;
        }

        Ok(Prediction {
            score: f64::min(1.0, score),
            confidence,
        })
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}
