//! Learned model of unmodeled dynamics.
//!
//! # Design choices
//! - The true system is assumed to be `ẋ = f(x) + g(x)·u + d(x)` where `f`, `g`
//!   come from [`DynamicsMode`] and `d` is unknown.
//! - `d` is learned online with one zero-mean Gaussian process per state
//!   dimension (RBF kernel, fixed hyper-parameters).
//! - The [`DynamicsModel`] trait is the only thing the control loop sees, so a
//!   different regression backend can be dropped in.
//!
//! ## Training target
//! For a transition (x, u, x') sampled at step `dt`:
//! d̂ = (x' − x)/dt − (f(x) + g(x)·u), heading difference wrapped to (−π, π].
//!
//! ## Posterior
//! μ(x*) = k*ᵀ·(K + σₙ²I)⁻¹·y
//! σ²(x*) = k(x*, x*) − k*ᵀ·(K + σₙ²I)⁻¹·k*

use crate::dynamics::DynamicsMode;
use crate::error::ModelError;
use crate::types::{wrap_angle, Action, ControlMatrix, Observation, State, STATE_DIM};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Nominal dynamics plus a learned, uncertainty-aware disturbance estimate.
pub trait DynamicsModel {
    /// Compact state estimate from a raw observation.
    fn get_state(&self, obs: &Observation) -> State;

    /// Nominal dynamics family; `f` and `g` are pure functions of the state.
    fn dynamics(&self) -> DynamicsMode;

    /// Disturbance mean and standard deviation at `state`, per state dimension.
    fn predict_disturbance(&self, state: &State) -> (State, State);

    /// One-step-ahead state mean and standard deviation under `action`.
    fn predict_next_state(&self, state: &State, action: &Action) -> (State, State);

    /// Add a realized transition to the training data.
    fn append_transition(
        &mut self,
        state: &State,
        action: &Action,
        next_state: &State,
    ) -> Result<(), ModelError>;
}

// ---------------------------------------------------------------------------
// GP configuration
// ---------------------------------------------------------------------------

/// Hyper-parameters and buffer policy of the GP disturbance model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpConfig {
    /// RBF length scale (same on every input axis)
    pub length_scale: f64,
    /// Prior variance of the latent disturbance
    pub signal_variance: f64,
    /// Observation noise variance added to the kernel diagonal
    pub noise_variance: f64,
    /// Training buffer capacity; oldest samples are dropped first
    pub max_samples: usize,
    /// Refit after this many appended samples
    pub refit_every: usize,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            length_scale: 1.0,
            signal_variance: 0.01,
            noise_variance: 0.01,
            max_samples: 200,
            refit_every: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar GP
// ---------------------------------------------------------------------------

fn rbf(a: &State, b: &State, length_scale: f64, signal_variance: f64) -> f64 {
    let d2 = (a - b).norm_squared();
    signal_variance * (-0.5 * d2 / (length_scale * length_scale)).exp()
}

/// Posterior of one output dimension.
#[derive(Clone, Debug)]
struct ScalarGp {
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
}

impl ScalarGp {
    fn fit(
        inputs: &[State],
        targets: &[f64],
        config: &GpConfig,
        dim: usize,
    ) -> Result<Self, ModelError> {
        let n = inputs.len();
        let k = DMatrix::from_fn(n, n, |i, j| {
            let kij = rbf(&inputs[i], &inputs[j], config.length_scale, config.signal_variance);
            if i == j {
                kij + config.noise_variance
            } else {
                kij
            }
        });
        let chol = Cholesky::new(k).ok_or(ModelError::NotPositiveDefinite { dim, samples: n })?;
        let y = DVector::from_column_slice(targets);
        let alpha = chol.solve(&y);
        Ok(Self { chol, alpha })
    }

    fn predict(&self, inputs: &[State], x: &State, config: &GpConfig) -> (f64, f64) {
        let k_star = DVector::from_iterator(
            inputs.len(),
            inputs
                .iter()
                .map(|xi| rbf(xi, x, config.length_scale, config.signal_variance)),
        );
        let mean = k_star.dot(&self.alpha);
        let w = self.chol.solve(&k_star);
        let var = (config.signal_variance - k_star.dot(&w)).max(0.0);
        (mean, var.sqrt())
    }
}

// ---------------------------------------------------------------------------
// GP dynamics model
// ---------------------------------------------------------------------------

/// [`DynamicsModel`] backed by per-dimension Gaussian processes.
#[derive(Clone, Debug)]
pub struct GpDynamicsModel {
    pub config: GpConfig,
    mode: DynamicsMode,
    dt: f64,
    /// (state, disturbance target) pairs, oldest first
    buffer: VecDeque<(State, State)>,
    /// Inputs the current posterior was conditioned on
    fitted_inputs: Vec<State>,
    posterior: Option<Vec<ScalarGp>>,
    since_fit: usize,
}

impl GpDynamicsModel {
    pub fn new(mode: DynamicsMode, dt: f64, config: GpConfig) -> Self {
        Self {
            config,
            mode,
            dt,
            buffer: VecDeque::new(),
            fitted_inputs: Vec::new(),
            posterior: None,
            since_fit: 0,
        }
    }

    /// Number of buffered training samples.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True once at least one posterior fit has happened.
    pub fn is_fitted(&self) -> bool {
        self.posterior.is_some()
    }

    /// Disturbance realized by one transition.
    pub fn disturbance_target(&self, state: &State, action: &Action, next_state: &State) -> State {
        let mut delta = next_state - state;
        delta[2] = wrap_angle(delta[2]);
        let nominal = self.mode.drift(state) + self.mode.control_matrix(state) * action;
        delta / self.dt - nominal
    }

    /// Condition the per-dimension posteriors on the current buffer.
    pub fn refit(&mut self) -> Result<(), ModelError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let inputs: Vec<State> = self.buffer.iter().map(|(x, _)| *x).collect();
        let gps = (0..STATE_DIM)
            .into_par_iter()
            .map(|dim| {
                let targets: Vec<f64> = self.buffer.iter().map(|(_, d)| d[dim]).collect();
                ScalarGp::fit(&inputs, &targets, &self.config, dim)
            })
            .collect::<Result<Vec<_>, _>>()?;
        trace!(samples = inputs.len(), "refit disturbance model");
        self.fitted_inputs = inputs;
        self.posterior = Some(gps);
        self.since_fit = 0;
        Ok(())
    }

    fn nominal_dynamics(&self, state: &State) -> (State, ControlMatrix) {
        (self.mode.drift(state), self.mode.control_matrix(state))
    }
}

impl DynamicsModel for GpDynamicsModel {
    fn get_state(&self, obs: &Observation) -> State {
        self.mode.state_from_observation(obs)
    }

    fn dynamics(&self) -> DynamicsMode {
        self.mode
    }

    fn predict_disturbance(&self, state: &State) -> (State, State) {
        match &self.posterior {
            None => (
                State::zeros(),
                State::repeat(self.config.signal_variance.sqrt()),
            ),
            Some(gps) => {
                let mut mean = State::zeros();
                let mut std = State::zeros();
                for (dim, gp) in gps.iter().enumerate() {
                    let (m, s) = gp.predict(&self.fitted_inputs, state, &self.config);
                    mean[dim] = m;
                    std[dim] = s;
                }
                (mean, std)
            }
        }
    }

    fn predict_next_state(&self, state: &State, action: &Action) -> (State, State) {
        let (f, g) = self.nominal_dynamics(state);
        let (d_mean, d_std) = self.predict_disturbance(state);
        let mean = state + self.dt * (f + g * action + d_mean);
        (mean, self.dt * d_std)
    }

    fn append_transition(
        &mut self,
        state: &State,
        action: &Action,
        next_state: &State,
    ) -> Result<(), ModelError> {
        let target = self.disturbance_target(state, action, next_state);
        if !state.iter().chain(target.iter()).all(|v| v.is_finite()) {
            return Err(ModelError::NonFiniteSample(format!(
                "state={:?} action={:?} next={:?}",
                state.as_slice(),
                action.as_slice(),
                next_state.as_slice()
            )));
        }
        self.buffer.push_back((*state, target));
        while self.buffer.len() > self.config.max_samples {
            self.buffer.pop_front();
        }
        self.since_fit += 1;
        if self.since_fit >= self.config.refit_every {
            self.refit()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
