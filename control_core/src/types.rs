//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix3x2, SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Scalar type: f64 throughout, the GP solves are ill-conditioned in f32.
// ---------------------------------------------------------------------------

/// Robot state: [x, y, θ]
pub type State = Vector3<f64>;

/// Control input: [linear speed, angular rate]
pub type Action = Vector2<f64>;

/// Planar point (positions, hazard centres, goal)
pub type Point2 = Vector2<f64>;

/// Control-affine input matrix g(x), 3×2
pub type ControlMatrix = Matrix3x2<f64>;

/// Observation: [x, y, cos θ, sin θ, compass_x, compass_y, exp(−dist)]
pub type Observation = SVector<f64, OBS_DIM>;

pub const STATE_DIM: usize = 3;
pub const ACTION_DIM: usize = 2;
pub const OBS_DIM: usize = 7;

// ---------------------------------------------------------------------------
// Action box
// ---------------------------------------------------------------------------

/// Axis-aligned action bounds `low ≤ u ≤ high`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionBox {
    pub low: Action,
    pub high: Action,
}

impl ActionBox {
    pub fn new(low: Action, high: Action) -> Self {
        Self { low, high }
    }

    /// The symmetric box [−bound, bound]².
    pub fn symmetric(bound: f64) -> Self {
        Self {
            low: Action::repeat(-bound),
            high: Action::repeat(bound),
        }
    }

    /// Membership test. NaN components are never contained.
    pub fn contains(&self, action: &Action) -> bool {
        action
            .iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(u, (lo, hi))| *u >= *lo && *u <= *hi)
    }

    /// Component-wise clamp into the box.
    pub fn clip(&self, action: &Action) -> Action {
        Action::from_fn(|i, _| action[i].clamp(self.low[i], self.high[i]))
    }
}

impl Default for ActionBox {
    fn default() -> Self {
        Self::symmetric(1.0)
    }
}

// ---------------------------------------------------------------------------
// Environment step output
// ---------------------------------------------------------------------------

/// Side information reported with each transition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// The goal region was reached on this step.
    pub goal_met: bool,
    /// Hazard cost incurred on this step (0 or one fixed increment).
    pub cost: f64,
}

/// Result of one environment transition. All fields are owned copies.
#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Static hazard layout and timing that the safety filter needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub hazards: Vec<Point2>,
    pub hazard_radius: f64,
    pub dt: f64,
}

/// Wrap an angle to (−π, π].
pub fn wrap_angle(theta: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let wrapped = (theta + std::f64::consts::PI).rem_euclid(two_pi) - std::f64::consts::PI;
    if wrapped == -std::f64::consts::PI {
        std::f64::consts::PI
    } else {
        wrapped
    }
}
