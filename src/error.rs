use std::fmt;

/// Error types for cycle slip detection and repair
#[derive(Debug, Clone, PartialEq)]
pub enum CycleSlipError {
    /// Series is too short for a single window or difference pass (have, need)
    InsufficientData(usize, usize),
    /// Least squares fit could not be solved (singular or ill-conditioned system)
    Numerical(String),
    /// Detector parameters violate a configuration rule
    InvalidConfiguration(String),
    /// Input samples or records are malformed
    InvalidInput(String),
}

impl fmt::Display for CycleSlipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleSlipError::InsufficientData(have, need) => {
                write!(
                    f,
                    "Insufficient data: {} samples. Need at least {} samples for one detection pass",
                    have, need
                )
            }
            CycleSlipError::Numerical(msg) => {
                write!(f, "Numerical error: {}", msg)
            }
            CycleSlipError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            CycleSlipError::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
        }
    }
}

impl std::error::Error for CycleSlipError {}

/// Result type for cycle slip operations
pub type Result<T> = std::result::Result<T, CycleSlipError>;
