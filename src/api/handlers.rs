use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::detector::rules::{RuleSpec, RuleSummary};
use crate::detector::DetectorMetrics;
use crate::error::DetectorError;

use super::types::*;
use super::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

fn detector_error(e: DetectorError) -> ApiError {
    let status = match &e {
        DetectorError::InvalidTransaction(_) => StatusCode::BAD_REQUEST,
        DetectorError::RuleNotFound { .. } => StatusCode::NOT_FOUND,
        DetectorError::DuplicateRule { .. } => StatusCode::CONFLICT,
        DetectorError::ScorerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, e.to_string())
}

fn elapsed_us(started: Instant) -> u64 {
    started.elapsed().as_micros() as u64
}

// ============================================================
// Health & Stats
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        scorer_ready: state.detector.scorer().is_ready(),
        total_rules: state.detector.rules().len(),
        timestamp: Utc::now(),
    })
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<DetectorMetrics> {
    Json(state.detector.metrics())
}

// ============================================================
// Scoring
// ============================================================

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransactionRequest>,
) -> ApiResult<FraudResponse> {
    let started = Instant::now();
    request
        .check()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let transaction_id = request.id.clone();
    let result = state
        .detector
        .analyze(&request.into_transaction())
        .map_err(detector_error)?;

    let threshold = state.detector.config().high_risk_threshold;
    Ok(Json(FraudResponse::new(
        transaction_id,
        result,
        threshold,
        elapsed_us(started),
    )))
}

pub async fn batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<BatchResponse> {
    let started = Instant::now();
    if request.transactions.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "transactions array cannot be empty",
        ));
    }
    if request.transactions.len() > state.max_batch {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("maximum {} transactions per batch", state.max_batch),
        ));
    }
    for tx in &request.transactions {
        tx.check()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    }

    let ids: Vec<String> = request.transactions.iter().map(|t| t.id.clone()).collect();
    let transactions: Vec<_> = request
        .transactions
        .into_iter()
        .map(TransactionRequest::into_transaction)
        .collect();

    // Large batches are CPU-bound; keep them off the async workers.
    let detector = Arc::clone(&state.detector);
    let scores = tokio::task::spawn_blocking(move || detector.analyze_batch(&transactions))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(detector_error)?;

    let threshold = state.detector.config().high_risk_threshold;
    let results: Vec<FraudResponse> = ids
        .into_iter()
        .zip(scores)
        // Per-entry timing is not measured; the summary carries the batch total.
        .map(|(id, score)| FraudResponse::new(id, score, threshold, 0))
        .collect();

    let summary = BatchSummary::from_results(&results, elapsed_us(started));
    tracing::info!(
        total = summary.total,
        declined = summary.declined,
        review = summary.require_review,
        "Batch analyzed"
    );

    Ok(Json(BatchResponse { results, summary }))
}

// ============================================================
// Rules
// ============================================================

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Vec<RuleSummary>> {
    Json(state.detector.rules())
}

pub async fn add_rule(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<RuleSpec>,
) -> Result<(StatusCode, Json<RuleSummary>), ApiError> {
    if spec.id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "rule id is required"));
    }
    if !spec.score.is_finite() || spec.score < 0.0 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("rule '{}' has invalid score {}", spec.id, spec.score),
        ));
    }

    let rule = spec.into_rule();
    let summary = rule.summary();
    state.detector.try_add_rule(rule).map_err(detector_error)?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.detector.remove_rule(&id).map_err(detector_error)?;
    Ok(StatusCode::NO_CONTENT)
}
