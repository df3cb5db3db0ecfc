//! The environment seam consumed by the control loop.

use crate::types::{Action, ActionBox, Observation, StepResult, Workspace};

/// Gym-style episodic environment.
///
/// Every value crossing this boundary is returned by value, so callers
/// never hold a view into the environment's internal buffers.
pub trait Environment {
    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Observation;

    /// Advance one fixed time step under `action`.
    fn step(&mut self, action: &Action) -> StepResult;

    /// Emit a textual diagnostic of the current state. No simulation effect.
    fn render(&self);

    /// Admissible inputs.
    fn action_space(&self) -> ActionBox;

    /// Hazard layout and integration step.
    fn workspace(&self) -> Workspace;
}
