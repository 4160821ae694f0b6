use thiserror::Error;

/// Top-level error type for path fitting.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid volume: {0}")]
    InvalidVolume(String),

    #[error("circle fit failed at node {node}: {source}")]
    Optimizer {
        node: usize,
        #[source]
        source: OptimizerError,
    },

    #[error("fit cancelled")]
    Cancelled,
}

/// Failures of the circle search on a single cross-section.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("no convergence after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("objective evaluated to non-finite value {value}")]
    NonFinite { value: f64 },

    #[error("empty cross-section grid")]
    EmptyGrid,
}

pub type Result<T> = std::result::Result<T, FitError>;
