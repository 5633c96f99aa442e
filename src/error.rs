use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegressionError {
    #[error("matrix is singular within tolerance")]
    SingularMatrix,
    #[error("not enough samples: need {needed}, got {got}")]
    InsufficientSamples { needed: usize, got: usize },
    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("no training data")]
    Empty,
}

/// Fatal calibration conditions. Any of these ends the session; the caller
/// must restart from INITIAL_MAPPING.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("regression training failed: {0}")]
    Regression(#[from] RegressionError),
    #[error("only {count} training samples accumulated (minimum 5)")]
    InsufficientTrainingSamples { count: usize },
}
