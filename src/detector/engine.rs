use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::DetectorConfig;
use crate::error::{DetectorError, DetectorResult, ScorerError};
use crate::metrics::{CounterSnapshot, DetectionCounters};

use super::geo::GeoAnalyzer;
use super::patterns::PatternMatcher;
use super::rules::{default_rules, Rule, RuleEngine, RuleSpec, RuleSummary};
use super::scorer::{HeuristicScorer, Prediction, PredictiveScorer};
use super::types::{FraudScore, RiskLevel, Transaction};
use super::velocity::{VelocityTracker, MAX_WINDOW_SECS};

pub const VELOCITY_PENALTY: f64 = 0.3;
pub const IMPOSSIBLE_TRAVEL_PENALTY: f64 = 0.5;
pub const MAX_TRAVEL_SPEED_KMH: f64 = 900.0;
/// Confidence reported when predictive scoring is enabled but the scorer fails.
pub const DEGRADED_CONFIDENCE: f64 = 0.5;

/// Read-only view of detector settings and counters for observability.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorMetrics {
    pub total_rules: usize,
    pub max_velocity: usize,
    pub velocity_window_secs: u64,
    pub high_risk_threshold: f64,
    pub block_threshold: f64,
    pub ml_enabled: bool,
    pub scorer: String,
    pub scorer_ready: bool,
    pub velocity_accounts: usize,
    pub geo_accounts: usize,
    pub counters: CounterSnapshot,
}

/// The risk aggregator. Runs every signal source against a transaction and
/// folds their contributions into one clamped score and decision.
pub struct Detector {
    config: DetectorConfig,
    rules: RuleEngine,
    velocity: Arc<VelocityTracker>,
    geo: Arc<GeoAnalyzer>,
    patterns: PatternMatcher,
    scorer: Arc<dyn PredictiveScorer>,
    counters: DetectionCounters,
}

impl Detector {
    /// Build a detector with the built-in rules (plus any configured ones),
    /// default patterns, fresh state registries and the heuristic scorer.
    pub fn new(config: DetectorConfig) -> Self {
        let mut rules = default_rules();
        rules.extend(config.rules.iter().cloned().map(RuleSpec::into_rule));

        let window_secs = i64::try_from(config.velocity_window_secs)
            .unwrap_or(MAX_WINDOW_SECS)
            .min(MAX_WINDOW_SECS);
        let velocity = Arc::new(VelocityTracker::new(Duration::seconds(window_secs)));

        Self {
            config,
            rules: RuleEngine::new(rules),
            velocity,
            geo: Arc::new(GeoAnalyzer::new()),
            patterns: PatternMatcher::default(),
            scorer: Arc::new(HeuristicScorer::new()),
            counters: DetectionCounters::new(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = RuleEngine::new(rules);
        self
    }

    pub fn with_patterns(mut self, patterns: PatternMatcher) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_velocity_tracker(mut self, velocity: Arc<VelocityTracker>) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_geo_analyzer(mut self, geo: Arc<GeoAnalyzer>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn PredictiveScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn scorer(&self) -> &dyn PredictiveScorer {
        self.scorer.as_ref()
    }

    /// Score one transaction.
    ///
    /// Stages run in a fixed order: rules, velocity, geography, patterns,
    /// predictive blend. Velocity and geography update per-account state as a
    /// side effect. Two concurrent calls for the same account are recorded in
    /// whichever order they reach the account's lock, so neither is guaranteed
    /// to see the other.
    pub fn analyze(&self, tx: &Transaction) -> DetectorResult<FraudScore> {
        if let Some(reason) = tx.validation_error() {
            return Err(DetectorError::InvalidTransaction(reason));
        }

        let mut score = 0.0;
        let mut reasons = Vec::new();
        let mut confidence = 0.0;

        // Stage 1: Static rules
        let (rule_score, rule_reasons) = self.rules.apply(tx);
        score += rule_score;
        reasons.extend(rule_reasons);

        // Stage 2: Velocity
        if let Some((penalty, reason)) = self.check_velocity(tx) {
            score += penalty;
            reasons.push(reason);
        }

        // Stage 3: Impossible travel
        if let Some((penalty, reason)) = self.check_geography(tx) {
            score += penalty;
            reasons.push(reason);
        }

        // Stage 4: Known patterns
        let (pattern_score, pattern_reasons) = self.patterns.matches(tx);
        score += pattern_score;
        reasons.extend(pattern_reasons);

        // Stage 5: Predictive blend (average, not sum)
        if self.config.ml_enabled {
            let predicted = self.scorer.predict(tx).and_then(|prediction| {
                if prediction.score.is_finite() {
                    Ok(prediction)
                } else {
                    Err(ScorerError::Failed {
                        name: self.scorer.name().to_string(),
                        message: format!("non-finite score {}", prediction.score),
                    })
                }
            });
            match predicted {
                Ok(prediction) => {
                    score = (score + prediction.score) / 2.0;
                    confidence = prediction.confidence;
                }
                Err(e) => {
                    tracing::warn!(
                        transaction_id = %tx.id,
                        error = %e,
                        "Predictive scoring failed, using signal-only score"
                    );
                    self.counters.record_scorer_fallback();
                    confidence = DEGRADED_CONFIDENCE;
                }
            }
        }

        // NaN fails closed; clamp alone would pass it through.
        let score = if score.is_nan() {
            tracing::warn!(transaction_id = %tx.id, "Aggregate score is NaN, treating as maximum risk");
            1.0
        } else {
            score.clamp(0.0, 1.0)
        };
        let risk = RiskLevel::from_score(score);
        let should_block = score >= self.config.block_threshold;
        self.counters.record(risk, should_block);

        tracing::debug!(
            transaction_id = %tx.id,
            account_id = %tx.account_id,
            score,
            risk = risk.as_str(),
            should_block,
            "Transaction scored"
        );

        Ok(FraudScore {
            score,
            risk,
            reasons,
            confidence,
            should_block,
            timestamp: Utc::now(),
        })
    }

    /// Score transactions in order. Every transaction is validated before any
    /// is scored, so an invalid entry fails the batch without touching
    /// account state.
    pub fn analyze_batch(&self, transactions: &[Transaction]) -> DetectorResult<Vec<FraudScore>> {
        if let Some(reason) = transactions.iter().find_map(Transaction::validation_error) {
            return Err(DetectorError::InvalidTransaction(reason));
        }
        transactions.iter().map(|tx| self.analyze(tx)).collect()
    }

    /// Track first, then count, so the transaction counts toward its own
    /// velocity and the last transaction of a burst is the one flagged.
    fn check_velocity(&self, tx: &Transaction) -> Option<(f64, String)> {
        self.velocity.track(tx);
        let count = self.velocity.count(&tx.account_id);

        if count > self.config.max_velocity {
            return Some((
                VELOCITY_PENALTY,
                format!("High transaction velocity: {} transactions in window", count),
            ));
        }
        None
    }

    fn check_geography(&self, tx: &Transaction) -> Option<(f64, String)> {
        let (last_location, seen_at) = match self.geo.last_observation(&tx.account_id) {
            Some(observation) => observation,
            None => {
                self.geo.update_location(&tx.account_id, tx.location.clone());
                return None;
            }
        };

        let distance = self.geo.calculate_distance(&last_location, &tx.location);
        let elapsed_hours =
            ((Utc::now() - seen_at).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
        let max_possible_distance = elapsed_hours * MAX_TRAVEL_SPEED_KMH;

        self.geo.update_location(&tx.account_id, tx.location.clone());

        if distance > max_possible_distance {
            return Some((
                IMPOSSIBLE_TRAVEL_PENALTY,
                format!(
                    "Impossible travel detected: {:.0} km in {:.2} hours",
                    distance, elapsed_hours
                ),
            ));
        }
        None
    }

    /// Consult the predictive scorer alone. Account state is not touched and
    /// scorer failures are returned instead of falling back.
    pub fn predict(&self, tx: &Transaction) -> DetectorResult<Prediction> {
        if let Some(reason) = tx.validation_error() {
            return Err(DetectorError::InvalidTransaction(reason));
        }
        Ok(self.scorer.predict(tx)?)
    }

    pub fn add_rule(&self, rule: Rule) {
        self.rules.add_rule(rule);
    }

    /// Add a rule, failing with `DuplicateRule` if its id is taken.
    pub fn try_add_rule(&self, rule: Rule) -> DetectorResult<()> {
        self.rules.try_add_rule(rule)
    }

    pub fn remove_rule(&self, id: &str) -> DetectorResult<()> {
        self.rules.remove_rule(id)
    }

    pub fn rules(&self) -> Vec<RuleSummary> {
        self.rules.summaries()
    }

    pub fn metrics(&self) -> DetectorMetrics {
        DetectorMetrics {
            total_rules: self.rules.len(),
            max_velocity: self.config.max_velocity,
            velocity_window_secs: self.velocity.window().num_seconds().max(0) as u64,
            high_risk_threshold: self.config.high_risk_threshold,
            block_threshold: self.config.block_threshold,
            ml_enabled: self.config.ml_enabled,
            scorer: self.scorer.name().to_string(),
            scorer_ready: self.scorer.is_ready(),
            velocity_accounts: self.velocity.tracked_accounts(),
            geo_accounts: self.geo.tracked_accounts(),
            counters: self.counters.snapshot(),
        }
    }
}
