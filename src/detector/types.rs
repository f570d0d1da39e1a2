use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Geographic coordinates with optional human-readable labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }

    pub fn with_labels(mut self, country: &str, city: &str) -> Self {
        self.country = country.to_string();
        self.city = city.to_string();
        self
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A single payment to be scored. Never persisted; lives for one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub location: Location,
    /// Caller-supplied time. Keeps the caller's UTC offset so hour-of-day
    /// checks see local time.
    #[serde(default = "now_local")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default, rename = "type")]
    pub transaction_type: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub ip_address: String,
}

fn now_local() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

impl Transaction {
    /// Create a transaction stamped with the current time.
    pub fn new(id: &str, account_id: &str, amount: f64) -> Self {
        Self {
            id: id.to_string(),
            account_id: account_id.to_string(),
            amount,
            currency: "USD".to_string(),
            merchant_id: String::new(),
            location: Location::default(),
            timestamp: now_local(),
            transaction_type: String::new(),
            device_id: String::new(),
            ip_address: String::new(),
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_type(mut self, transaction_type: &str) -> Self {
        self.transaction_type = transaction_type.to_string();
        self
    }

    pub fn with_merchant(mut self, merchant_id: &str) -> Self {
        self.merchant_id = merchant_id.to_string();
        self
    }

    pub fn with_device(mut self, device_id: &str, ip_address: &str) -> Self {
        self.device_id = device_id.to_string();
        self.ip_address = ip_address.to_string();
        self
    }

    /// Reason the transaction cannot be scored, if any.
    pub fn validation_error(&self) -> Option<String> {
        if self.account_id.trim().is_empty() {
            return Some(format!("transaction '{}' has no account id", self.id));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Some(format!(
                "transaction '{}' has invalid amount {}",
                self.id, self.amount
            ));
        }
        if !self.location.is_valid() {
            return Some(format!(
                "transaction '{}' has out-of-range coordinates ({}, {})",
                self.id, self.location.latitude, self.location.longitude
            ));
        }
        None
    }
}

/// Ordered severity label derived from the clamped aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::Minimal,
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Classify a score using fixed, inclusive lower bounds.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            RiskLevel::Critical
        } else if score >= 0.6 {
            RiskLevel::High
        } else if score >= 0.4 {
            RiskLevel::Medium
        } else if score >= 0.2 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "MINIMAL",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Outcome of scoring one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudScore {
    /// Aggregate score, always within [0, 1].
    pub score: f64,
    pub risk: RiskLevel,
    pub reasons: Vec<String>,
    /// Predictive scorer confidence. Zero when the scorer was not consulted
    /// and passed through unclamped otherwise.
    pub confidence: f64,
    pub should_block: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0.9), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.5), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.2), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.1), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Minimal);
    }

    #[test]
    fn test_risk_level_is_monotonic() {
        let mut previous = RiskLevel::Minimal;
        for step in 0..=1000 {
            let level = RiskLevel::from_score(step as f64 / 1000.0);
            assert!(level >= previous, "tier dropped at step {}", step);
            previous = level;
        }
        assert_eq!(previous, RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_serializes_uppercase() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        assert_eq!(RiskLevel::Medium.as_str(), "MEDIUM");
    }

    #[test]
    fn test_transaction_timestamp_defaults_to_now() {
        let before = Utc::now();
        let tx: Transaction = serde_json::from_str(
            r#"{"id": "TXN-1", "account_id": "ACC-1", "amount": 25.0}"#,
        )
        .unwrap();
        assert!(tx.timestamp >= before);
        assert!(tx.location.is_valid());
    }

    #[test]
    fn test_transaction_keeps_caller_offset() {
        let tx: Transaction = serde_json::from_str(
            r#"{"id": "TXN-2", "account_id": "ACC-1", "amount": 25.0,
                "timestamp": "2024-01-01T02:30:00+09:00", "type": "WIRE_TRANSFER"}"#,
        )
        .unwrap();
        use chrono::Timelike;
        assert_eq!(tx.timestamp.hour(), 2);
        assert_eq!(tx.transaction_type, "WIRE_TRANSFER");
    }

    #[test]
    fn test_validation_error() {
        assert!(Transaction::new("T", "A", 10.0).validation_error().is_none());
        assert!(Transaction::new("T", "", 10.0).validation_error().is_some());
        assert!(Transaction::new("T", "A", -1.0).validation_error().is_some());
        assert!(Transaction::new("T", "A", f64::NAN).validation_error().is_some());

        let off_map = Transaction::new("T", "A", 10.0).with_location(Location::new(91.0, 0.0));
        assert!(off_map.validation_error().is_some());
    }
}
