use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::detector::types::{FraudScore, Location, RiskLevel, Transaction};

// ============================================================
// Requests
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequest {
    pub id: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub location: RequestLocation,
    #[serde(default)]
    pub device_info: DeviceInfo,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestLocation {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub fingerprint: String,
}

impl TransactionRequest {
    /// Checks applied at the HTTP boundary, before the detector's own
    /// data-model validation.
    pub fn check(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("transaction id is required".to_string());
        }
        if self.amount.is_nan() || self.amount <= 0.0 {
            return Err(format!("transaction '{}': amount must be positive", self.id));
        }
        Ok(())
    }

    /// The customer is the account; payment method doubles as the
    /// transaction type and the IP travels with the location.
    pub fn into_transaction(self) -> Transaction {
        let mut tx = Transaction::new(&self.id, &self.customer_id, self.amount)
            .with_location(Location {
                latitude: self.location.latitude,
                longitude: self.location.longitude,
                country: self.location.country,
                city: self.location.city,
            })
            .with_type(&self.payment_method)
            .with_merchant(&self.merchant_id)
            .with_device(&self.device_info.device_id, &self.location.ip_address);

        if !self.currency.is_empty() {
            tx.currency = self.currency;
        }
        if let Some(timestamp) = self.timestamp {
            tx = tx.with_timestamp(timestamp);
        }
        tx
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub transactions: Vec<TransactionRequest>,
}

// ============================================================
// Responses
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Review,
    Decline,
}

impl Decision {
    pub fn from_score(result: &FraudScore, high_risk_threshold: f64) -> Self {
        if result.should_block {
            Decision::Decline
        } else if result.score >= high_risk_threshold {
            Decision::Review
        } else {
            Decision::Approve
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FraudResponse {
    pub transaction_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    pub confidence: f64,
    pub should_block: bool,
    pub processing_time_us: u64,
}

impl FraudResponse {
    pub fn new(
        transaction_id: String,
        result: FraudScore,
        high_risk_threshold: f64,
        processing_time_us: u64,
    ) -> Self {
        Self {
            transaction_id,
            risk_score: result.score,
            risk_level: result.risk,
            decision: Decision::from_score(&result, high_risk_threshold),
            reasons: result.reasons,
            confidence: result.confidence,
            should_block: result.should_block,
            processing_time_us,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<FraudResponse>,
    pub summary: BatchSummary,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub approved: usize,
    pub declined: usize,
    pub require_review: usize,
    pub avg_risk_score: f64,
    pub processing_time_us: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[FraudResponse], processing_time_us: u64) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            processing_time_us,
            ..Default::default()
        };
        let mut total_score = 0.0;
        for result in results {
            match result.decision {
                Decision::Approve => summary.approved += 1,
                Decision::Review => summary.require_review += 1,
                Decision::Decline => summary.declined += 1,
            }
            total_score += result.risk_score;
        }
        if !results.is_empty() {
            summary.avg_risk_score = total_score / results.len() as f64;
        }
        summary
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub scorer_ready: bool,
    pub total_rules: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_request_conversion() {
        let request: TransactionRequest = serde_json::from_str(
            r#"{
                "id": "TXN-1",
                "amount": 250.0,
                "merchant_id": "NEW",
                "customer_id": "CUST-9",
                "payment_method": "WIRE_TRANSFER",
                "location": {"country": "JP", "city": "Tokyo", "latitude": 35.68,
                             "longitude": 139.69, "ip_address": "10.1.1.1"},
                "device_info": {"device_id": "dev-7", "platform": "ios"},
                "timestamp": "2024-03-01T03:15:00+09:00"
            }"#,
        )
        .unwrap();
        assert!(request.check().is_ok());

        let tx = request.into_transaction();
        assert_eq!(tx.account_id, "CUST-9");
        assert_eq!(tx.transaction_type, "WIRE_TRANSFER");
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.device_id, "dev-7");
        assert_eq!(tx.ip_address, "10.1.1.1");
        assert_eq!(tx.location.city, "Tokyo");
        assert_eq!(tx.timestamp.hour(), 3);
    }

    #[test]
    fn test_request_check() {
        let mut request: TransactionRequest =
            serde_json::from_str(r#"{"id": "", "amount": 10.0}"#).unwrap();
        assert!(request.check().is_err());

        request.id = "TXN".to_string();
        request.amount = 0.0;
        assert!(request.check().is_err());

        request.amount = f64::NAN;
        assert!(request.check().is_err());
    }

    #[test]
    fn test_batch_summary() {
        let response = |score: f64, decision: Decision| FraudResponse {
            transaction_id: "T".to_string(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            decision,
            reasons: Vec::new(),
            confidence: 0.0,
            should_block: decision == Decision::Decline,
            processing_time_us: 1,
        };
        let results = vec![
            response(0.1, Decision::Approve),
            response(0.7, Decision::Review),
            response(0.9, Decision::Decline),
            response(0.1, Decision::Approve),
        ];

        let summary = BatchSummary::from_results(&results, 42);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.approved, 2);
        assert_eq!(summary.require_review, 1);
        assert_eq!(summary.declined, 1);
        assert!((summary.avg_risk_score - 0.45).abs() < 1e-9);
        assert_eq!(summary.processing_time_us, 42);
    }

    #[test]
    fn test_decision_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Decision::Decline).unwrap(), "\"DECLINE\"");
    }
}
