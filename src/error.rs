//! Error hierarchy surfaced at the orchestrator boundary.
//!
//! All failures propagate synchronously through `Result<_, SimError>`; the
//! engine never panics on user-supplied scenarios. In-path depletion is a
//! normal outcome and never produces one of these variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid scenario: {0}")]
    Validation(#[from] ValidationError),

    #[error("numerical failure: {0}")]
    Numerical(#[from] NumericalError),

    #[error("simulation cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("internal error at path {path}, year {year}: {message}")]
    Internal {
        path: usize,
        year: usize,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("end_age ({end_age}) must not be before current_age ({current_age})")]
    AgesInverted { current_age: i64, end_age: i64 },

    #[error("n_sims must be positive, got {0}")]
    NonPositiveSims(i64),

    #[error("account weights must sum to 1 +/- 1e-6, got {sum} for account index {index}")]
    AccountWeightsDontSum { index: usize, sum: f64 },

    #[error("account balance must be non-negative, got {balance} for account index {index}")]
    NegativeBalance { index: usize, balance: f64 },

    #[error("weight for asset at index {index} must be in [0,1], got {value}")]
    WeightOutOfRange { index: usize, value: f64 },

    #[error("correlation matrix is not symmetric at ({i},{j}): {a} vs {b}")]
    CorrelationNotSymmetric { i: usize, j: usize, a: f64, b: f64 },

    #[error("correlation matrix diagonal must be 1.0, got {value} at index {index}")]
    CorrelationBadDiagonal { index: usize, value: f64 },

    #[error("correlation matrix is not positive semi-definite")]
    CorrelationNotPsd,

    #[error("student-t degrees of freedom must be >= 3, got {0}")]
    DegenerateDf(f64),

    #[error("Kou eta parameter must be positive, got {value} for asset index {index}")]
    NegativeEta { index: usize, value: f64 },

    #[error("tax rate must be in [0,1], got {0}")]
    TaxRateOutOfRange(f64),

    #[error("parameter pack is missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum NumericalError {
    #[error("cholesky decomposition failed: covariance matrix is not positive semi-definite")]
    CholeskyFailed,

    #[error("NaN or Inf detected in generated returns for asset index {asset}, year {year}, sim {sim}")]
    NonFiniteReturn { asset: usize, year: usize, sim: usize },

    #[error("pilot mean correction diverged for asset index {asset}: delta={delta}")]
    MeanCorrectionDiverged { asset: usize, delta: f64 },
}
