//! `sim` — Kinematic unicycle workspace, robot configuration, rollout export.

pub mod config;
pub mod export;
pub mod unicycle_env;

pub use config::{ConfigError, RobotConfig};
pub use export::{load_json, save_json, RolloutLog};
pub use unicycle_env::UnicycleEnv;
