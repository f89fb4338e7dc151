use thiserror::Error;

use crate::objective::ObjectiveError;

pub type Result<T> = std::result::Result<T, PsoError>;

#[derive(Debug, Error)]
pub enum PsoError {
    /// Rejected before any particle is created.
    #[error("invalid configuration: {param} = {value}, expected {constraint}")]
    InvalidConfig {
        param: String,
        value: String,
        constraint: String,
    },

    #[error(
        "objective evaluation failed at iteration {iteration}, particle {particle}, position {position:?}: {cause}"
    )]
    Evaluation {
        iteration: usize,
        particle: usize,
        position: Vec<f64>,
        cause: EvaluationFailure,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EvaluationFailure {
    #[error("objective returned non-finite value {0}")]
    NonFinite(f64),

    #[error(transparent)]
    Objective(#[from] ObjectiveError),
}

impl PsoError {
    pub(crate) fn invalid(
        param: impl Into<String>,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        PsoError::InvalidConfig {
            param: param.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }
}
