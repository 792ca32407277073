use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod policy;
pub mod requirement;

pub use config::Config;
pub use policy::ExecutionPolicy;
pub use requirement::{PercentileRequirement, RequirementSet, Verdict};

/// Sample capacity used when no `max` requirement bounds it.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 1_000;

/// Failure raised by a single invocation of the unit under test.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationError {
    /// Declared failure of the unit under test. Counted as an error; suppressed when the
    /// requirement set allows errors.
    #[error("{message}")]
    Execution {
        message: String,
        cause: Option<Box<InvocationError>>,
    },

    /// Functional-correctness failure. Takes priority over performance verdicts.
    #[error("{0}")]
    Assertion(String),

    /// Anything else. Never recorded, always propagated unchanged.
    #[error("{0}")]
    Unexpected(String),
}

impl InvocationError {
    pub fn execution(message: impl Into<String>) -> Self {
        InvocationError::Execution {
            message: message.into(),
            cause: None,
        }
    }

    /// Declared failure wrapping the error that caused it.
    pub fn caused_by(message: impl Into<String>, cause: InvocationError) -> Self {
        InvocationError::Execution {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Returns `true` if this error or any error in its cause chain is an assertion failure.
    pub fn is_assertion(&self) -> bool {
        self.assertion_message().is_some()
    }

    /// Walks the cause chain outermost-first and returns the message of the first assertion.
    pub fn assertion_message(&self) -> Option<&str> {
        let mut current = self;
        loop {
            match current {
                InvocationError::Assertion(message) => return Some(message),
                InvocationError::Execution { cause: Some(cause), .. } => current = cause,
                _ => return None,
            }
        }
    }

    /// The run-level error a recorded failure is re-raised as, unwrapping nested causes
    /// down to the assertion when there is one.
    pub fn to_failure(&self) -> PerfError {
        match self.assertion_message() {
            Some(message) => PerfError::AssertionFailed(message.to_string()),
            None => PerfError::from(self.clone()),
        }
    }
}

/// Error types for a measured run
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerfError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No samples recorded")]
    EmptyStatistics,

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Performance requirement failed: {0}")]
    RequirementViolation(String),

    #[error("{0}")]
    Unexpected(String),
}

impl From<InvocationError> for PerfError {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Execution { .. } => PerfError::Execution(err.to_string()),
            InvocationError::Assertion(message) => PerfError::AssertionFailed(message),
            InvocationError::Unexpected(message) => PerfError::Unexpected(message),
        }
    }
}

/// Result type for perftrack operations
pub type Result<T> = std::result::Result<T, PerfError>;
