//! Kinematic unicycle environment.
//!
//! The robot state [x, y, θ] is integrated with explicit Euler at a fixed
//! `dt` under `ẋ = f(x) + g(x)·u`. Episodes end on arrival inside the goal
//! region or at the step limit; entering a hazard only costs.
//!
//! Observation layout:
//! [pos_x, pos_y, cos θ, sin θ, compass_x, compass_y, exp(−dist2goal)]

use crate::config::{ConfigError, RobotConfig};
use control_core::{
    Action, ActionBox, DynamicsMode, Environment, Observation, Point2, State, StepInfo, StepResult,
    Workspace,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tracing::debug;

/// Keeps the compass finite when the robot sits on the goal.
const COMPASS_EPS: f64 = 1e-3;

/// Zero-mean Gaussian disturbance with diagonal covariance.
#[derive(Clone, Debug)]
struct DisturbanceSource {
    rng: ChaCha8Rng,
    /// Per-axis standard deviation (square root of the covariance diagonal)
    std: State,
}

impl DisturbanceSource {
    fn new(covar_diag: [f64; 3], seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            std: State::from(covar_diag).map(f64::sqrt),
        }
    }

    fn sample(&mut self) -> State {
        let z = State::from_fn(|_, _| self.rng.sample::<f64, _>(StandardNormal));
        self.std.component_mul(&z)
    }
}

/// Unicycle in a planar workspace with circular hazards.
#[derive(Clone, Debug)]
pub struct UnicycleEnv {
    pub config: RobotConfig,
    mode: DynamicsMode,
    state: State,
    goal: Point2,
    hazards: Vec<Point2>,
    action_box: ActionBox,
    episode_step: u64,
    last_goal_dist: f64,
    disturbance: Option<DisturbanceSource>,
}

impl UnicycleEnv {
    /// Build and reset. `seed` drives the disturbance source when `config.noisy` is set.
    pub fn new(config: RobotConfig, mode: DynamicsMode, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let disturbance = config
            .noisy
            .then(|| DisturbanceSource::new(config.disturb_covar_diag, seed));
        let mut env = Self {
            mode,
            state: config.start(),
            goal: config.goal(),
            hazards: config.hazards(),
            action_box: config.action_box(),
            episode_step: 0,
            last_goal_dist: 0.0,
            disturbance,
            config,
        };
        env.reset();
        Ok(env)
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Teleport the robot. Episode counters are left untouched.
    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn goal(&self) -> Point2 {
        self.goal
    }

    pub fn episode_step(&self) -> u64 {
        self.episode_step
    }

    pub fn goal_dist(&self) -> f64 {
        (self.goal - self.state.xy()).norm()
    }

    /// True when the robot is inside the goal region (boundary inclusive).
    pub fn goal_met(&self) -> bool {
        self.goal_dist() <= self.config.goal_size
    }

    /// True when the robot is strictly inside at least one hazard.
    pub fn in_hazard(&self) -> bool {
        let pos = self.state.xy();
        let r2 = self.config.hazards_radius * self.config.hazards_radius;
        self.hazards.iter().any(|c| (pos - c).norm_squared() < r2)
    }

    /// Unit goal direction in the robot frame.
    pub fn compass(&self) -> Point2 {
        let v = self.goal - self.state.xy();
        let (s, c) = self.state[2].sin_cos();
        // Rᵀ·v with R the body-to-world rotation
        let ego = Point2::new(c * v[0] + s * v[1], -s * v[0] + c * v[1]);
        ego / (ego.norm() + COMPASS_EPS)
    }

    pub fn get_obs(&self) -> Observation {
        let compass = self.compass();
        let (s, c) = self.state[2].sin_cos();
        Observation::from_column_slice(&[
            self.state[0],
            self.state[1],
            c,
            s,
            compass[0],
            compass[1],
            (-self.goal_dist()).exp(),
        ])
    }
}

impl Environment for UnicycleEnv {
    fn reset(&mut self) -> Observation {
        self.episode_step = 0;
        self.state = self.config.start();
        self.goal = self.config.goal();
        self.last_goal_dist = self.goal_dist();
        self.get_obs()
    }

    fn step(&mut self, action: &Action) -> StepResult {
        let u = self.action_box.clip(action);
        let dt = self.config.dt;
        let f = self.mode.drift(&self.state);
        let g = self.mode.control_matrix(&self.state);
        self.state += dt * (f + g * u);
        if let Some(source) = self.disturbance.as_mut() {
            self.state += dt * source.sample();
        }

        self.episode_step += 1;

        let dist = self.goal_dist();
        let mut reward = self.last_goal_dist - dist;
        self.last_goal_dist = dist;

        let mut info = StepInfo::default();
        let done = if self.goal_met() {
            info.goal_met = true;
            reward += self.config.reward_goal;
            true
        } else {
            self.episode_step >= self.config.max_episode_steps
        };

        if self.in_hazard() {
            info.cost = self.config.hazard_cost;
        }

        StepResult {
            observation: self.get_obs(),
            reward,
            done,
            info,
        }
    }

    fn render(&self) {
        let rel = self.goal - self.state.xy();
        let alignment_error = rel[1].atan2(rel[0]) - self.state[2];
        debug!(
            ep_step = self.episode_step,
            state = ?self.state.as_slice(),
            dist2goal = self.goal_dist(),
            alignment_error,
            "render"
        );
    }

    fn action_space(&self) -> ActionBox {
        self.action_box
    }

    fn workspace(&self) -> Workspace {
        Workspace {
            hazards: self.hazards.clone(),
            hazard_radius: self.config.hazards_radius,
            dt: self.config.dt,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
