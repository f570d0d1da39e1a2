use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{DetectorError, DetectorResult};

use super::evaluate_guarded;
use super::types::Transaction;

/// A deterministic, side-effect free check over a transaction.
pub trait Predicate: Send + Sync {
    fn evaluate(&self, tx: &Transaction) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Transaction) -> bool + Send + Sync,
{
    fn evaluate(&self, tx: &Transaction) -> bool {
        self(tx)
    }
}

/// Declarative predicate tree, used for rules that arrive as data
/// (config file or API).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    AmountAbove { value: f64 },
    AmountAtLeast { value: f64 },
    AmountBelow { value: f64 },
    /// Inclusive local hour range. Wraps midnight when `start > end`.
    HourBetween { start: u32, end: u32 },
    TransactionType { value: String },
    Merchant { value: String },
    Currency { value: String },
    CountryIn { values: Vec<String> },
    MissingDevice,
    MissingIp,
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Predicate for Condition {
    fn evaluate(&self, tx: &Transaction) -> bool {
        match self {
            Self::AmountAbove { value } => tx.amount > *value,
            Self::AmountAtLeast { value } => tx.amount >= *value,
            Self::AmountBelow { value } => tx.amount < *value,
            Self::HourBetween { start, end } => {
                let hour = tx.timestamp.hour();
                if start <= end {
                    hour >= *start && hour <= *end
                } else {
                    hour >= *start || hour <= *end
                }
            }
            Self::TransactionType { value } => tx.transaction_type.eq_ignore_ascii_case(value),
            Self::Merchant { value } => tx.merchant_id == *value,
            Self::Currency { value } => tx.currency.eq_ignore_ascii_case(value),
            Self::CountryIn { values } => values
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&tx.location.country)),
            Self::MissingDevice => tx.device_id.is_empty(),
            Self::MissingIp => tx.ip_address.is_empty(),
            Self::All { conditions } => conditions.iter().all(|c| c.evaluate(tx)),
            Self::Any { conditions } => conditions.iter().any(|c| c.evaluate(tx)),
            Self::Not { condition } => !condition.evaluate(tx),
        }
    }
}

/// What an operator should do when a rule fires. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleAction {
    Review,
    Flag,
    Monitor,
    Block,
}

#[derive(Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub score: f64,
    pub action: RuleAction,
    condition: Arc<dyn Predicate>,
}

impl Rule {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        score: f64,
        action: RuleAction,
        condition: impl Predicate + 'static,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            score,
            action,
            condition: Arc::new(condition),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        evaluate_guarded("rule", &self.id, self.condition.as_ref(), tx)
    }

    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            score: self.score,
            action: self.action,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("score", &self.score)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Serializable view of a rule, without its predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub score: f64,
    pub action: RuleAction,
}

/// A rule described entirely as data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub score: f64,
    #[serde(default = "default_action")]
    pub action: RuleAction,
    pub condition: Condition,
}

fn default_action() -> RuleAction {
    RuleAction::Flag
}

impl RuleSpec {
    pub fn into_rule(self) -> Rule {
        Rule {
            id: self.id,
            name: self.name,
            description: self.description,
            score: self.score,
            action: self.action,
            condition: Arc::new(self.condition),
        }
    }
}

/// Ordered, mutable rule collection. Evaluation takes the read lock,
/// mutation the write lock.
pub struct RuleEngine {
    rules: RwLock<Vec<Rule>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(default_rules())
    }

    /// Sum the weights of every matching rule, collecting their descriptions
    /// in rule order.
    pub fn apply(&self, tx: &Transaction) -> (f64, Vec<String>) {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);

        let mut total = 0.0;
        let mut reasons = Vec::new();
        for rule in rules.iter() {
            if !rule.score.is_finite() {
                tracing::warn!(rule_id = %rule.id, score = rule.score, "Skipping rule with non-finite weight");
                continue;
            }
            if rule.matches(tx) {
                total += rule.score;
                reasons.push(rule.description.clone());
            }
        }
        (total, reasons)
    }

    pub fn add_rule(&self, rule: Rule) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(rule_id = %rule.id, score = rule.score, "Rule added");
        rules.push(rule);
    }

    /// Add `rule` unless one with the same id exists. The check and the
    /// insert happen under one write guard.
    pub fn try_add_rule(&self, rule: Rule) -> DetectorResult<()> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(DetectorError::DuplicateRule { id: rule.id });
        }
        tracing::info!(rule_id = %rule.id, score = rule.score, "Rule added");
        rules.push(rule);
        Ok(())
    }

    /// Remove the first rule with `id`, keeping the order of the rest.
    pub fn remove_rule(&self, id: &str) -> DetectorResult<()> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        match rules.iter().position(|r| r.id == id) {
            Some(index) => {
                rules.remove(index);
                tracing::info!(rule_id = %id, "Rule removed");
                Ok(())
            }
            None => Err(DetectorError::RuleNotFound { id: id.to_string() }),
        }
    }

    pub fn len(&self) -> usize {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summaries(&self) -> Vec<RuleSummary> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Rule::summary)
            .collect()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "HIGH_AMOUNT",
            "High Amount Detection",
            "Transaction amount exceeds threshold",
            0.3,
            RuleAction::Review,
            Condition::AmountAbove { value: 10_000.0 },
        ),
        Rule::new(
            "UNUSUAL_TIME",
            "Unusual Time Detection",
            "Transaction at unusual hours",
            0.2,
            RuleAction::Flag,
            Condition::HourBetween { start: 2, end: 5 },
        ),
        // No merchant history is kept in memory, so "NEW" is the caller's marker.
        Rule::new(
            "NEW_MERCHANT",
            "New Merchant Detection",
            "First transaction with merchant",
            0.1,
            RuleAction::Monitor,
            Condition::Merchant {
                value: "NEW".to_string(),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::types::Location;
    use chrono::{FixedOffset, TimeZone};

    fn tx_at(hour: u32, amount: f64) -> Transaction {
        let utc = FixedOffset::east_opt(0).unwrap();
        Transaction::new("TXN", "ACC", amount)
            .with_timestamp(utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_default_rules_high_amount() {
        let engine = RuleEngine::with_defaults();
        let (score, reasons) = engine.apply(&tx_at(14, 15_000.0));

        assert!((score - 0.3).abs() < 1e-9);
        assert_eq!(reasons, vec!["Transaction amount exceeds threshold"]);
    }

    #[test]
    fn test_reasons_follow_rule_order() {
        let engine = RuleEngine::with_defaults();
        let tx = tx_at(3, 20_000.0).with_merchant("NEW");
        let (score, reasons) = engine.apply(&tx);

        assert!((score - 0.6).abs() < 1e-9);
        assert_eq!(
            reasons,
            vec![
                "Transaction amount exceeds threshold",
                "Transaction at unusual hours",
                "First transaction with merchant",
            ]
        );
    }

    #[test]
    fn test_no_rule_matches_ordinary_purchase() {
        let engine = RuleEngine::with_defaults();
        let (score, reasons) = engine.apply(&tx_at(14, 100.0));
        assert_eq!(score, 0.0);
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_add_and_remove_rule() {
        let engine = RuleEngine::with_defaults();
        let before = engine.len();

        engine.add_rule(Rule::new(
            "CUSTOM_RULE",
            "Custom Rule",
            "Custom fraud detection rule",
            0.9,
            RuleAction::Block,
            |tx: &Transaction| tx.amount > 99_999.0,
        ));
        assert_eq!(engine.len(), before + 1);

        engine.remove_rule("CUSTOM_RULE").unwrap();
        assert_eq!(engine.len(), before);

        let err = engine.remove_rule("CUSTOM_RULE").unwrap_err();
        assert!(err.to_string().contains("rule not found"));
        assert_eq!(engine.len(), before);
    }

    #[test]
    fn test_try_add_rejects_duplicate_id() {
        let engine = RuleEngine::with_defaults();
        let err = engine
            .try_add_rule(Rule::new("HIGH_AMOUNT", "Dup", "dup", 0.1, RuleAction::Flag, |_: &Transaction| true))
            .unwrap_err();
        assert!(matches!(err, DetectorError::DuplicateRule { ref id } if id == "HIGH_AMOUNT"));
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn test_concurrent_try_add_admits_one() {
        let engine = RuleEngine::with_defaults();
        let admitted = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                let engine = &engine;
                let admitted = &admitted;
                s.spawn(move || {
                    let rule = Rule::new("CRYPTO", "Crypto", "Crypto", 0.2, RuleAction::Review, |_: &Transaction| false);
                    if engine.try_add_rule(rule).is_ok() {
                        admitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(admitted.into_inner(), 1);
        let crypto = engine.summaries().into_iter().filter(|r| r.id == "CRYPTO").count();
        assert_eq!(crypto, 1);
    }

    #[test]
    fn test_non_finite_weight_is_skipped() {
        let engine = RuleEngine::new(vec![
            Rule::new("NAN", "Nan", "nan weight", f64::NAN, RuleAction::Flag, |_: &Transaction| true),
            Rule::new("OK", "Ok", "shown", 0.1, RuleAction::Flag, |_: &Transaction| true),
        ]);

        let (score, reasons) = engine.apply(&tx_at(12, 1.0));
        assert!((score - 0.1).abs() < 1e-9);
        assert_eq!(reasons, vec!["shown"]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let engine = RuleEngine::with_defaults();
        engine.remove_rule("UNUSUAL_TIME").unwrap();
        let ids: Vec<String> = engine.summaries().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["HIGH_AMOUNT", "NEW_MERCHANT"]);
    }

    #[test]
    fn test_remove_first_duplicate_only() {
        let engine = RuleEngine::new(vec![]);
        engine.add_rule(Rule::new("DUP", "a", "first", 0.1, RuleAction::Flag, |_: &Transaction| true));
        engine.add_rule(Rule::new("DUP", "b", "second", 0.2, RuleAction::Flag, |_: &Transaction| true));

        engine.remove_rule("DUP").unwrap();
        let (score, reasons) = engine.apply(&tx_at(12, 1.0));
        assert!((score - 0.2).abs() < 1e-9);
        assert_eq!(reasons, vec!["second"]);
    }

    #[test]
    fn test_panicking_predicate_is_skipped() {
        let engine = RuleEngine::new(vec![
            Rule::new("BROKEN", "Broken", "never shown", 0.5, RuleAction::Flag, |_: &Transaction| -> bool {
                panic!("malformed predicate")
            }),
            Rule::new("OK", "Ok", "shown", 0.1, RuleAction::Flag, |_: &Transaction| true),
        ]);

        let (score, reasons) = engine.apply(&tx_at(12, 1.0));
        assert!((score - 0.1).abs() < 1e-9);
        assert_eq!(reasons, vec!["shown"]);
    }

    #[test]
    fn test_hour_between_wraps_midnight() {
        let night = Condition::HourBetween { start: 22, end: 4 };
        assert!(night.evaluate(&tx_at(23, 1.0)));
        assert!(night.evaluate(&tx_at(3, 1.0)));
        assert!(!night.evaluate(&tx_at(12, 1.0)));
    }

    #[test]
    fn test_condition_tree() {
        let condition = Condition::All {
            conditions: vec![
                Condition::AmountAtLeast { value: 500.0 },
                Condition::Any {
                    conditions: vec![Condition::MissingDevice, Condition::MissingIp],
                },
                Condition::Not {
                    condition: Box::new(Condition::CountryIn {
                        values: vec!["US".to_string()],
                    }),
                },
            ],
        };

        let tx = Transaction::new("T", "A", 500.0)
            .with_location(Location::new(6.5, 3.4).with_labels("NG", "Lagos"));
        assert!(condition.evaluate(&tx));

        let tx = tx.with_device("dev-1", "10.0.0.1");
        assert!(!condition.evaluate(&tx));
    }

    #[test]
    fn test_rule_spec_from_json() {
        let spec: RuleSpec = serde_json::from_str(
            r#"{
                "id": "CRYPTO",
                "name": "Crypto purchase",
                "description": "Cryptocurrency purchase",
                "score": 0.25,
                "condition": {"kind": "transaction_type", "value": "cryptocurrency"}
            }"#,
        )
        .unwrap();
        assert_eq!(spec.action, RuleAction::Flag);

        let rule = spec.into_rule();
        assert!(rule.matches(&Transaction::new("T", "A", 1.0).with_type("CRYPTOCURRENCY")));
        assert!(!rule.matches(&Transaction::new("T", "A", 1.0).with_type("PURCHASE")));
    }
}
