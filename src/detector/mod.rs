pub mod engine;
pub mod geo;
pub mod patterns;
pub mod rules;
pub mod scorer;
pub mod types;
pub mod velocity;

pub use engine::{Detector, DetectorMetrics};
pub use types::{FraudScore, Location, RiskLevel, Transaction};

use std::panic::{catch_unwind, AssertUnwindSafe};

use rules::Predicate;

/// Run a rule or pattern predicate, treating a panic as "no match" so one
/// malformed predicate cannot take down the whole evaluation.
pub(crate) fn evaluate_guarded(
    source: &str,
    name: &str,
    predicate: &dyn Predicate,
    tx: &Transaction,
) -> bool {
    match catch_unwind(AssertUnwindSafe(|| predicate.evaluate(tx))) {
        Ok(matched) => matched,
        Err(_) => {
            tracing::warn!(
                source,
                predicate = name,
                transaction_id = %tx.id,
                "Predicate panicked, treating as no match"
            );
            false
        }
    }
}
