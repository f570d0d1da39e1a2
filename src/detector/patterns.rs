use std::fmt;
use std::sync::Arc;

use super::evaluate_guarded;
use super::rules::Predicate;
use super::types::Transaction;

const ROUND_AMOUNT_MIN: f64 = 1000.0;

/// A fixed heuristic with a weight. Unlike rules, patterns are not editable
/// at runtime.
#[derive(Clone)]
pub struct Pattern {
    pub name: String,
    pub description: String,
    pub score: f64,
    matcher: Arc<dyn Predicate>,
}

impl Pattern {
    pub fn new(
        name: &str,
        description: &str,
        score: f64,
        matcher: impl Predicate + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            score,
            matcher: Arc::new(matcher),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        evaluate_guarded("pattern", &self.name, self.matcher.as_ref(), tx)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("score", &self.score)
            .finish_non_exhaustive()
    }
}

pub struct PatternMatcher {
    patterns: Vec<Pattern>,
}

impl PatternMatcher {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    /// Sum the weights of matching patterns, collecting their descriptions.
    pub fn matches(&self, tx: &Transaction) -> (f64, Vec<String>) {
        let mut total = 0.0;
        let mut reasons = Vec::new();
        for pattern in &self.patterns {
            if !pattern.score.is_finite() {
                tracing::warn!(pattern = %pattern.name, "Skipping pattern with non-finite weight");
                continue;
            }
            if pattern.matches(tx) {
                total += pattern.score;
                reasons.push(pattern.description.clone());
            }
        }
        (total, reasons)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(default_patterns())
    }
}

pub fn default_patterns() -> Vec<Pattern> {
    vec![Pattern::new(
        "ROUND_AMOUNT",
        "Suspicious round amount",
        0.1,
        |tx: &Transaction| tx.amount.fract() == 0.0 && tx.amount > ROUND_AMOUNT_MIN,
    )]
}
