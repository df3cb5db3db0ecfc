//! Robot and workspace configuration.
//!
//! Every field has a default, so a JSON file only needs to list what it
//! changes. The defaults reproduce the reference workspace: start at
//! (−2.5, −2.5) facing +x, goal at (2.5, 2.5), five hazards on a 1.5-scaled
//! cross pattern.

use crate::export::load_json;
use control_core::{Action, ActionBox, Point2, State};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Hazard centres before scaling.
const BASE_HAZARDS: [[f64; 2]; 5] = [[0., 0.], [-1., 1.], [-1., -1.], [1., -1.], [1., 1.]];
const HAZARD_SCALE: f64 = 1.5;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("action bound low {low} is not below high {high} on axis {axis}")]
    EmptyActionBox { axis: usize, low: f64, high: f64 },

    #[error("disturbance variance on axis {axis} is negative or non-finite: {value}")]
    InvalidVariance { axis: usize, value: f64 },

    #[error("max_episode_steps must be at least 1")]
    ZeroEpisodeLength,
}

/// Physical and episodic parameters of the unicycle workspace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Integration step (s)
    pub dt: f64,
    /// Episode truncation length
    pub max_episode_steps: u64,
    pub start_state: [f64; 3],
    pub goal_pos: [f64; 2],
    /// Goal region radius (m)
    pub goal_size: f64,
    /// Bonus added to the reward on arrival
    pub reward_goal: f64,
    pub hazards_radius: f64,
    pub hazards_locations: Vec<[f64; 2]>,
    /// Cost reported on a step that ends inside any hazard
    pub hazard_cost: f64,
    pub action_low: [f64; 2],
    pub action_high: [f64; 2],
    /// Diagonal of the injected-disturbance covariance
    pub disturb_covar_diag: [f64; 3],
    /// Inject random disturbance into the integration
    pub noisy: bool,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            dt: 0.02,
            max_episode_steps: 1000,
            start_state: [-2.5, -2.5, 0.0],
            goal_pos: [2.5, 2.5],
            goal_size: 0.3,
            reward_goal: 1.0,
            hazards_radius: 0.6,
            hazards_locations: BASE_HAZARDS
                .iter()
                .map(|[x, y]| [x * HAZARD_SCALE, y * HAZARD_SCALE])
                .collect(),
            hazard_cost: 0.1,
            action_low: [-1.0, -1.0],
            action_high: [1.0, 1.0],
            disturb_covar_diag: [0.05, 0.05, 0.5],
            noisy: false,
        }
    }
}

impl RobotConfig {
    /// Load from a JSON file and validate.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: RobotConfig = load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("dt", self.dt),
            ("goal_size", self.goal_size),
            ("hazards_radius", self.hazards_radius),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.max_episode_steps == 0 {
            return Err(ConfigError::ZeroEpisodeLength);
        }
        for axis in 0..2 {
            let (low, high) = (self.action_low[axis], self.action_high[axis]);
            if !(low < high) {
                return Err(ConfigError::EmptyActionBox { axis, low, high });
            }
        }
        for (axis, &value) in self.disturb_covar_diag.iter().enumerate() {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::InvalidVariance { axis, value });
            }
        }
        Ok(())
    }

    pub fn start(&self) -> State {
        State::from(self.start_state)
    }

    pub fn goal(&self) -> Point2 {
        Point2::from(self.goal_pos)
    }

    pub fn hazards(&self) -> Vec<Point2> {
        self.hazards_locations.iter().map(|h| Point2::from(*h)).collect()
    }

    pub fn action_box(&self) -> ActionBox {
        ActionBox::new(Action::from(self.action_low), Action::from(self.action_high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hazards_are_scaled() {
        let c = RobotConfig::default();
        assert_eq!(c.hazards_locations.len(), 5);
        assert_eq!(c.hazards_locations[1], [-1.5, 1.5]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let c: RobotConfig = serde_json::from_str(r#"{ "dt": 0.05, "noisy": true }"#).unwrap();
        assert_eq!(c.dt, 0.05);
        assert!(c.noisy);
        assert_eq!(c.goal_pos, [2.5, 2.5]);
    }

    #[test]
    fn rejects_bad_values() {
        let c = RobotConfig {
            dt: 0.0,
            ..RobotConfig::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigError::NonPositive { field: "dt", value: 0.0 })
        );

        let c = RobotConfig {
            action_low: [1.0, -1.0],
            ..RobotConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::EmptyActionBox { axis: 0, .. })));

        let c = RobotConfig {
            disturb_covar_diag: [0.1, -0.1, 0.0],
            ..RobotConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::InvalidVariance { axis: 1, .. })));
    }
}
