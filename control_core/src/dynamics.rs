//! Nominal continuous-time dynamics `ẋ = f(x) + g(x)·u`.
//!
//! The dynamics family is fixed once at construction through
//! [`DynamicsMode`]; everything downstream (environment integration,
//! learned disturbance, barrier filter) reads `f` and `g` from here.

use crate::types::{ControlMatrix, Observation, State};
use serde::{Deserialize, Serialize};

/// Which kinematic model drives the robot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum DynamicsMode {
    /// Differential-drive unicycle: speed along heading, direct yaw rate.
    #[default]
    Unicycle,
}

impl DynamicsMode {
    /// Drift term f(x).
    pub fn drift(&self, _state: &State) -> State {
        match self {
            DynamicsMode::Unicycle => State::zeros(),
        }
    }

    /// Input matrix g(x).
    pub fn control_matrix(&self, state: &State) -> ControlMatrix {
        match self {
            DynamicsMode::Unicycle => {
                let theta = state[2];
                #[rustfmt::skip]
                let g = ControlMatrix::new(
                    theta.cos(), 0.0,
                    theta.sin(), 0.0,
                    0.0,         1.0,
                );
                g
            }
        }
    }

    /// Recover the compact state from an observation.
    pub fn state_from_observation(&self, obs: &Observation) -> State {
        match self {
            DynamicsMode::Unicycle => State::new(obs[0], obs[1], obs[3].atan2(obs[2])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn unicycle_drift_is_zero() {
        let mode = DynamicsMode::Unicycle;
        for s in [State::new(1.0, -2.0, 0.3), State::new(-1e3, 4.0, -7.0)] {
            assert_eq!(mode.drift(&s), State::zeros());
        }
    }

    #[test]
    fn unicycle_control_matrix_follows_heading() {
        let mode = DynamicsMode::Unicycle;
        let theta = 0.7;
        let g = mode.control_matrix(&State::new(5.0, 5.0, theta));
        assert_abs_diff_eq!(g[(0, 0)], theta.cos());
        assert_abs_diff_eq!(g[(1, 0)], theta.sin());
        assert_abs_diff_eq!(g[(2, 1)], 1.0);
        assert_abs_diff_eq!(g[(0, 1)], 0.0);
        assert_abs_diff_eq!(g[(1, 1)], 0.0);
        assert_abs_diff_eq!(g[(2, 0)], 0.0);
    }

    #[test]
    fn state_from_observation_recovers_heading() {
        let theta: f64 = -2.1;
        let obs = Observation::from_column_slice(&[
            0.5, -1.5, theta.cos(), theta.sin(), 1.0, 0.0, 0.2,
        ]);
        let s = DynamicsMode::Unicycle.state_from_observation(&obs);
        assert_abs_diff_eq!(s[0], 0.5);
        assert_abs_diff_eq!(s[1], -1.5);
        assert_abs_diff_eq!(s[2], theta, epsilon = 1e-12);
    }
}
