//! Error types for the qanalysis-core crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which end of the representable range a request fell outside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// Not achievable even at the minimum load.
    BelowMinimum,
    /// Beyond what the server sustains at the maximum load.
    AboveMaximum,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowMinimum => write!(f, "below minimum"),
            Self::AboveMaximum => write!(f, "above maximum"),
        }
    }
}

/// Top-level error type for queue analysis.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Infeasible ({bound}): {detail}")]
    Infeasible { bound: Bound, detail: String },

    #[error("Numerical invalidity: {0}")]
    NumericalInvalidity(String),

    #[error("Search error: {0}")]
    Search(String),
}

impl QueueError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn below_minimum(msg: impl Into<String>) -> Self {
        Self::Infeasible {
            bound: Bound::BelowMinimum,
            detail: msg.into(),
        }
    }

    pub fn above_maximum(msg: impl Into<String>) -> Self {
        Self::Infeasible {
            bound: Bound::AboveMaximum,
            detail: msg.into(),
        }
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::NumericalInvalidity(msg.into())
    }

    pub fn search(msg: impl Into<String>) -> Self {
        Self::Search(msg.into())
    }

    /// Whether the caller supplied bad parameters, as opposed to asking for
    /// something the model cannot deliver.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QueueError>;
