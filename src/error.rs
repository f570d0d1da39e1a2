use thiserror::Error;

/// Failures surfaced by the scoring pipeline.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("rule not found: {id}")]
    RuleNotFound { id: String },

    #[error("rule already exists: {id}")]
    DuplicateRule { id: String },

    #[error("predictive scorer unavailable: {0}")]
    ScorerUnavailable(#[from] ScorerError),
}

/// Failure modes of a predictive scorer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScorerError {
    #[error("scorer '{name}' is not ready")]
    Unavailable { name: String },

    #[error("scorer '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

pub type DetectorResult<T> = Result<T, DetectorError>;
