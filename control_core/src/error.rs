use thiserror::Error;

use crate::types::Action;

/// Failures of the learned disturbance model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("kernel matrix for state dimension {dim} is not positive definite ({samples} samples)")]
    NotPositiveDefinite { dim: usize, samples: usize },

    #[error("non-finite transition sample: {0}")]
    NonFiniteSample(String),
}

/// Fatal conditions of the control loop. None of these are recovered locally.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("nominal action {action:?} lies outside the action box")]
    ActionOutOfBounds { action: Action },

    #[error("dynamics model failure: {0}")]
    Model(#[from] ModelError),

    #[error("safety correction infeasible: residual {residual:.3e} after {iterations} iterations")]
    InfeasibleSafetyCorrection { residual: f64, iterations: usize },
}

pub type Result<T> = std::result::Result<T, ControlError>;
