//! Robust control-barrier-function (CBF) safety filter.
//!
//! # Barrier
//! For every hazard `c_i` with radius `r`, evaluated at a look-ahead point
//! `p = [x + l·cos θ, y + l·sin θ]` so that both inputs appear in `ḣ`:
//!
//! h_i(x) = ‖p − c_i‖² − r²        (safe set: h_i ≥ 0)
//!
//! # Constraint on the correction `u_s`
//! ∇h_i·(f + μ_d + g·(u_nom + u_s)) − k_d·|∇h_i|·σ_d + γ_b·h_i ≥ 0
//!
//! i.e. `h_i` may not decrease faster than `γ_b·h_i`, even when the
//! disturbance sits `k_d` standard deviations away from its mean. The
//! action box adds `low ≤ u_nom + u_s ≤ high`.
//!
//! # Solver
//! The minimum-norm `u_s` is the projection of the origin onto the
//! intersection of those half-planes and the box, computed with Dykstra's
//! alternating projections. The box is projected last in each sweep so the
//! combined action always lies inside it.

use crate::error::{ControlError, Result};
use crate::types::{Action, ActionBox, ControlMatrix, Point2, State, Workspace};
use nalgebra::Matrix2x3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Computes a correction that keeps the nominal action safe.
pub trait SafetyFilter {
    /// Return `u_s` such that `nominal + u_s` satisfies the safety constraints.
    ///
    /// `drift` is `f(x)` plus the disturbance mean; `disturbance_std` is the
    /// per-dimension standard deviation of the disturbance estimate.
    fn get_u_safe(
        &self,
        nominal: &Action,
        drift: &State,
        control_matrix: &ControlMatrix,
        state: &State,
        disturbance_std: &State,
    ) -> Result<Action>;
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CbfConfig {
    /// Distance of the look-ahead point in front of the axle (m)
    pub look_ahead: f64,
    /// Dykstra sweeps before giving up
    pub max_iterations: usize,
    /// Accepted constraint residual
    pub tolerance: f64,
}

impl Default for CbfConfig {
    fn default() -> Self {
        Self {
            look_ahead: 0.05,
            max_iterations: 500,
            tolerance: 1e-6,
        }
    }
}

/// Half-plane `aᵀ·u ≥ b` in correction space.
#[derive(Clone, Copy, Debug)]
struct HalfPlane {
    a: Action,
    b: f64,
}

impl HalfPlane {
    fn residual(&self, u: &Action) -> f64 {
        (self.b - self.a.dot(u)).max(0.0)
    }

    fn project(&self, u: &Action) -> Action {
        let slack = self.b - self.a.dot(u);
        let a2 = self.a.norm_squared();
        if slack <= 0.0 || a2 <= f64::EPSILON {
            *u
        } else {
            u + self.a * (slack / a2)
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Robust CBF filter over a static set of circular hazards.
#[derive(Clone, Debug)]
pub struct CbfSafetyFilter {
    pub config: CbfConfig,
    hazards: Vec<Point2>,
    hazard_radius: f64,
    action_box: ActionBox,
    /// Decay rate of the barrier (γ_b)
    pub gamma_b: f64,
    /// Uncertainty multiplier on the disturbance std (k_d)
    pub k_d: f64,
}

impl CbfSafetyFilter {
    pub fn new(
        workspace: &Workspace,
        action_box: ActionBox,
        gamma_b: f64,
        k_d: f64,
        config: CbfConfig,
    ) -> Self {
        Self {
            config,
            hazards: workspace.hazards.clone(),
            hazard_radius: workspace.hazard_radius,
            action_box,
            gamma_b,
            k_d,
        }
    }

    fn look_ahead_point(&self, state: &State) -> (Point2, Matrix2x3<f64>) {
        let (s, c) = state[2].sin_cos();
        let l = self.config.look_ahead;
        let p = Point2::new(state[0] + l * c, state[1] + l * s);
        // ∂p/∂x
        #[rustfmt::skip]
        let jac = Matrix2x3::new(
            1.0, 0.0, -l * s,
            0.0, 1.0,  l * c,
        );
        (p, jac)
    }

    /// Barrier value of every hazard at `state`.
    pub fn barrier_values(&self, state: &State) -> Vec<f64> {
        let (p, _) = self.look_ahead_point(state);
        let r2 = self.hazard_radius * self.hazard_radius;
        self.hazards
            .iter()
            .map(|c| (p - c).norm_squared() - r2)
            .collect()
    }

    fn constraints(
        &self,
        nominal: &Action,
        drift: &State,
        g: &ControlMatrix,
        state: &State,
        disturbance_std: &State,
    ) -> Vec<HalfPlane> {
        let (p, jac) = self.look_ahead_point(state);
        let r2 = self.hazard_radius * self.hazard_radius;
        self.hazards
            .iter()
            .map(|c| {
                let h = (p - c).norm_squared() - r2;
                let grad: State = jac.transpose() * (2.0 * (p - c));
                let robust_margin = self.k_d * grad.abs().dot(disturbance_std);
                let a: Action = g.transpose() * grad;
                let b = robust_margin - self.gamma_b * h - grad.dot(drift) - a.dot(nominal);
                HalfPlane { a, b }
            })
            .collect()
    }
}

impl SafetyFilter for CbfSafetyFilter {
    fn get_u_safe(
        &self,
        nominal: &Action,
        drift: &State,
        control_matrix: &ControlMatrix,
        state: &State,
        disturbance_std: &State,
    ) -> Result<Action> {
        let planes = self.constraints(nominal, drift, control_matrix, state, disturbance_std);
        let correction_box = ActionBox::new(
            self.action_box.low - nominal,
            self.action_box.high - nominal,
        );

        let worst = |u: &Action| planes.iter().map(|hp| hp.residual(u)).fold(0.0, f64::max);

        let mut u = correction_box.clip(&Action::zeros());
        if worst(&u) <= self.config.tolerance {
            return Ok(u);
        }

        // Dykstra increments, one per set (planes then box)
        let mut increments = vec![Action::zeros(); planes.len() + 1];
        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            iterations += 1;
            let prev = u;
            for (k, plane) in planes.iter().enumerate() {
                let shifted = u + increments[k];
                let projected = plane.project(&shifted);
                increments[k] = shifted - projected;
                u = projected;
            }
            let k = planes.len();
            let shifted = u + increments[k];
            let projected = correction_box.clip(&shifted);
            increments[k] = shifted - projected;
            u = projected;

            if worst(&u) <= self.config.tolerance && (u - prev).norm() <= self.config.tolerance {
                return Ok(u);
            }
        }

        let residual = worst(&u);
        if residual <= self.config.tolerance {
            Ok(u)
        } else {
            Err(ControlError::InfeasibleSafetyCorrection { residual, iterations })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
