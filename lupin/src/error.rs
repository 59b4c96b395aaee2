//! Error types for the lupin library.

use thiserror::Error;

/// Errors raised by priors, models, samplers and proposers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LupinError {
    /// A prior state disagrees with the structure it summarizes, or a
    /// move would drive a count negative.
    #[error("consistency error in {context}: {message}")]
    Consistency {
        /// Component that detected the violation
        context: &'static str,
        /// What went wrong
        message: String,
    },
    /// A probability fell outside `[0, 1]`, a parameter is out of its
    /// domain, or a required component is missing.
    #[error("safety error in {context}: {message}")]
    Safety {
        /// Component that detected the violation
        context: &'static str,
        /// What went wrong
        message: String,
    },
    /// No structurally valid move was found within the retry bound.
    #[error("{proposer} found no valid move after {attempts} attempts")]
    Exhausted {
        /// Proposer that gave up
        proposer: &'static str,
        /// Number of candidates drawn
        attempts: usize,
    },
    /// Invalid user-supplied parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl LupinError {
    pub(crate) fn consistency(context: &'static str, message: impl Into<String>) -> Self {
        LupinError::Consistency {
            context,
            message: message.into(),
        }
    }

    pub(crate) fn safety(context: &'static str, message: impl Into<String>) -> Self {
        LupinError::Safety {
            context,
            message: message.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, LupinError>;
