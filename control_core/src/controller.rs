//! Goal-seeking nominal controller.

use crate::types::{Action, ActionBox, Point2, State};

/// Default gain between goal-vector length and forward speed.
pub const DEFAULT_SPEED_GAIN: f64 = 3e-3;

/// Stateless proportional controller.
///
/// Speed is `gain · ‖goal‖`; the turn rate is the polar angle of the goal
/// vector itself (no heading is subtracted, the vector is expected to be
/// expressed in the robot frame already). The result is clipped into the
/// action box, so any finite input yields an admissible action.
#[derive(Clone, Copy, Debug)]
pub struct NominalController {
    pub speed_gain: f64,
}

impl Default for NominalController {
    fn default() -> Self {
        Self {
            speed_gain: DEFAULT_SPEED_GAIN,
        }
    }
}

impl NominalController {
    pub fn new(speed_gain: f64) -> Self {
        Self { speed_gain }
    }

    pub fn compute(&self, _state: &State, goal: &Point2, bounds: &ActionBox) -> Action {
        let v = self.speed_gain * goal.norm();
        let omega = goal[1].atan2(goal[0]);
        bounds.clip(&Action::new(v, omega))
    }
}
