use std::fmt;

/// Failure taxonomy for the evaluation boundary. Missing window data is not
/// an error: it surfaces as an `Inconclusive` verdict on the affected metric.
#[derive(Debug)]
pub enum EvalError {
    /// Rejected before any computation; non-retryable.
    InvalidConfiguration(String),
    /// The backing store could not serve the request after bounded retries.
    DataSourceUnavailable(String),
    /// The request-boundary cancellation token fired mid-evaluation.
    Cancelled,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {message}")
            }
            EvalError::DataSourceUnavailable(message) => {
                write!(f, "data source unavailable: {message}")
            }
            EvalError::Cancelled => write!(f, "evaluation cancelled"),
        }
    }
}

impl std::error::Error for EvalError {}

pub type EvalResult<T> = Result<T, EvalError>;
