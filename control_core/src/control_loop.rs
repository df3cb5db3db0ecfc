//! Control loop orchestrator: one safe, learning-aware decision per tick.
//!
//! # Processing steps per tick
//! 1. On an episode boundary: close the episode summary, reset the environment
//! 2. State estimate from the observation (dynamics model)
//! 3. Disturbance mean / std at that state
//! 4. Nominal action from the goal compass, checked against the action box
//! 5. Safety correction from the barrier filter
//! 6. Next-state prediction and confidence band (diagnostics only)
//! 7. Environment step with nominal + correction
//! 8. Every `transition_stride`-th episode step: feed the transition back
//! 9. Record diagnostics, accumulate return and cost, render
//!
//! Collaborator failures are returned as-is; nothing here retries.

use crate::{
    controller::{NominalController, DEFAULT_SPEED_GAIN},
    env::Environment,
    error::{ControlError, Result},
    history::{EpisodeSummary, RolloutHistory},
    model::DynamicsModel,
    safety::{CbfConfig, CbfSafetyFilter, SafetyFilter},
    types::{Action, Observation, Point2, State},
};
use serde::{Deserialize, Serialize};
use tracing::{info, trace, warn};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for a rollout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlLoopConfig {
    /// Total ticks to execute
    pub steps: usize,
    /// Uncertainty multiplier (k_d) for the confidence bands
    pub k_d: f64,
    /// Barrier decay rate (γ_b) for [`ControlLoop::with_barrier_filter`]
    pub gamma_b: f64,
    /// Feed every n-th episode step back into the model
    pub transition_stride: u64,
    /// Nominal controller speed gain
    pub speed_gain: f64,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            steps: 3000,
            k_d: 1.5,
            gamma_b: 0.5,
            transition_stride: 2,
            speed_gain: DEFAULT_SPEED_GAIN,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Running,
    /// The previous step signalled `done`; reset before the next tick.
    EpisodeBoundary,
}

/// What happened during one tick.
#[derive(Clone, Debug)]
pub struct TickRecord {
    pub state: State,
    pub nominal: Action,
    pub correction: Action,
    pub next_state: State,
    pub reward: f64,
    pub cost: f64,
    pub done: bool,
    /// The transition was appended to the model's training data
    pub learned: bool,
}

/// Owns the environment, the learned model and the safety filter for the
/// whole run.
pub struct ControlLoop<E, M, S> {
    pub config: ControlLoopConfig,
    env: E,
    model: M,
    filter: S,
    controller: NominalController,
    history: RolloutHistory,
    phase: LoopPhase,
    obs: Observation,
    ep_ret: f64,
    ep_cost: f64,
    ep_step: u64,
    ep_goal_met: bool,
}

impl<E, M, S> ControlLoop<E, M, S>
where
    E: Environment,
    M: DynamicsModel,
    S: SafetyFilter,
{
    /// Create a loop and start the first episode.
    pub fn new(mut env: E, model: M, filter: S, config: ControlLoopConfig) -> Self {
        let obs = env.reset();
        Self {
            controller: NominalController::new(config.speed_gain),
            history: RolloutHistory::new(config.k_d),
            config,
            env,
            model,
            filter,
            phase: LoopPhase::Running,
            obs,
            ep_ret: 0.0,
            ep_cost: 0.0,
            ep_step: 0,
            ep_goal_met: false,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn history(&self) -> &RolloutHistory {
        &self.history
    }

    pub fn into_history(self) -> RolloutHistory {
        self.history
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn filter(&self) -> &S {
        &self.filter
    }

    /// Run `config.steps` ticks.
    pub fn run(&mut self) -> Result<&RolloutHistory> {
        for _ in 0..self.config.steps {
            self.tick()?;
        }
        Ok(&self.history)
    }

    fn close_episode(&mut self) {
        let summary = EpisodeSummary {
            index: self.history.episodes.len(),
            ret: self.ep_ret,
            cost: self.ep_cost,
            steps: self.ep_step,
            goal_met: self.ep_goal_met,
        };
        info!(
            episode = summary.index,
            steps = summary.steps,
            goal_met = summary.goal_met,
            "Episode Return: {:.3} \t Episode Cost: {:.3}",
            summary.ret,
            summary.cost
        );
        self.history.episodes.push(summary);
        self.ep_ret = 0.0;
        self.ep_cost = 0.0;
        self.ep_step = 0;
        self.ep_goal_met = false;
    }

    /// Execute one tick of the loop.
    pub fn tick(&mut self) -> Result<TickRecord> {
        if self.phase == LoopPhase::EpisodeBoundary {
            self.close_episode();
            self.obs = self.env.reset();
            self.phase = LoopPhase::Running;
        }

        let state = self.model.get_state(&self.obs);
        let (disturb_mean, disturb_std) = self.model.predict_disturbance(&state);

        let bounds = self.env.action_space();
        let goal = Point2::new(self.obs[4], self.obs[5]);
        let nominal = self.controller.compute(&state, &goal, &bounds);
        if !bounds.contains(&nominal) {
            return Err(ControlError::ActionOutOfBounds { action: nominal });
        }

        let mode = self.model.dynamics();
        let drift = mode.drift(&state) + disturb_mean;
        let g = mode.control_matrix(&state);
        let correction = self
            .filter
            .get_u_safe(&nominal, &drift, &g, &state, &disturb_std)?;
        let action = nominal + correction;
        trace!(
            nominal = ?nominal.as_slice(),
            correction = ?correction.as_slice(),
            "safe action"
        );

        let (pred_mean, pred_std) = self.model.predict_next_state(&state, &action);

        let step = self.env.step(&action);
        let next_state = self.model.get_state(&step.observation);

        let learned = self.ep_step % self.config.transition_stride.max(1) == 0;
        if learned {
            self.model.append_transition(&state, &action, &next_state)?;
        }

        self.history.record(&next_state, &pred_mean, &pred_std);

        if step.info.cost > 0.0 {
            warn!(step = self.ep_step, cost = step.info.cost, "hazard entered");
        }
        self.ep_ret += step.reward;
        self.ep_cost += step.info.cost;
        self.ep_step += 1;
        self.ep_goal_met |= step.info.goal_met;
        self.env.render();

        self.obs = step.observation;
        if step.done {
            self.phase = LoopPhase::EpisodeBoundary;
        }

        Ok(TickRecord {
            state,
            nominal,
            correction,
            next_state,
            reward: step.reward,
            cost: step.info.cost,
            done: step.done,
            learned,
        })
    }
}

impl<E, M> ControlLoop<E, M, CbfSafetyFilter>
where
    E: Environment,
    M: DynamicsModel,
{
    /// Create a loop guarded by a barrier filter built from the environment's
    /// workspace and the config's `gamma_b` / `k_d`.
    pub fn with_barrier_filter(
        env: E,
        model: M,
        config: ControlLoopConfig,
        cbf: CbfConfig,
    ) -> Self {
        let filter = CbfSafetyFilter::new(
            &env.workspace(),
            env.action_space(),
            config.gamma_b,
            config.k_d,
            cbf,
        );
        Self::new(env, model, filter, config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::DynamicsMode;
    use crate::error::ModelError;
    use crate::types::{ActionBox, ControlMatrix, StepInfo, StepResult, Workspace};
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;

    /// Integrator on a line that ends after a fixed number of steps.
    struct ScriptedEnv {
        state: State,
        steps: u64,
        episode_len: u64,
        resets: usize,
    }

    impl ScriptedEnv {
        fn new(episode_len: u64) -> Self {
            Self {
                state: State::zeros(),
                steps: 0,
                episode_len,
                resets: 0,
            }
        }

        fn obs(&self) -> Observation {
            let th = self.state[2];
            Observation::from_column_slice(&[
                self.state[0], self.state[1], th.cos(), th.sin(), 1.0, 0.0, 0.5,
            ])
        }
    }

    impl Environment for ScriptedEnv {
        fn reset(&mut self) -> Observation {
            self.state = State::zeros();
            self.steps = 0;
            self.resets += 1;
            self.obs()
        }

        fn step(&mut self, action: &Action) -> StepResult {
            let g = DynamicsMode::Unicycle.control_matrix(&self.state);
            self.state += 0.1 * (g * action);
            self.steps += 1;
            StepResult {
                observation: self.obs(),
                reward: 1.0,
                done: self.steps >= self.episode_len,
                info: StepInfo {
                    goal_met: false,
                    cost: 0.1,
                },
            }
        }

        fn render(&self) {}

        fn action_space(&self) -> ActionBox {
            ActionBox::default()
        }

        fn workspace(&self) -> Workspace {
            Workspace {
                hazards: Vec::new(),
                hazard_radius: 0.1,
                dt: 0.1,
            }
        }
    }

    fn disturb_mean() -> State {
        State::new(0.01, -0.02, 0.03)
    }

    /// Model that predicts nominal motion and counts appended transitions.
    #[derive(Default)]
    struct CountingModel {
        appended: usize,
        fail_on_append: bool,
    }

    impl DynamicsModel for CountingModel {
        fn get_state(&self, obs: &Observation) -> State {
            DynamicsMode::Unicycle.state_from_observation(obs)
        }

        fn dynamics(&self) -> DynamicsMode {
            DynamicsMode::Unicycle
        }

        fn predict_disturbance(&self, _state: &State) -> (State, State) {
            (disturb_mean(), State::repeat(0.5))
        }

        fn predict_next_state(&self, state: &State, action: &Action) -> (State, State) {
            let g = DynamicsMode::Unicycle.control_matrix(state);
            (state + 0.1 * (g * action), State::repeat(0.01))
        }

        fn append_transition(
            &mut self,
            _: &State,
            _: &Action,
            _: &State,
        ) -> std::result::Result<(), ModelError> {
            if self.fail_on_append {
                return Err(ModelError::NotPositiveDefinite { dim: 0, samples: 1 });
            }
            self.appended += 1;
            Ok(())
        }
    }

    struct ConstantCorrection(Action);

    impl SafetyFilter for ConstantCorrection {
        fn get_u_safe(
            &self,
            _: &Action,
            _: &State,
            _: &ControlMatrix,
            _: &State,
            _: &State,
        ) -> Result<Action> {
            Ok(self.0)
        }
    }

    /// Arguments of one `get_u_safe` call.
    #[derive(Clone, Debug)]
    struct FilterCall {
        nominal: Action,
        drift: State,
        control_matrix: ControlMatrix,
        state: State,
        disturbance_std: State,
    }

    /// Filter that never corrects and remembers what it was asked.
    #[derive(Default)]
    struct RecordingFilter {
        calls: RefCell<Vec<FilterCall>>,
    }

    impl SafetyFilter for RecordingFilter {
        fn get_u_safe(
            &self,
            nominal: &Action,
            drift: &State,
            control_matrix: &ControlMatrix,
            state: &State,
            disturbance_std: &State,
        ) -> Result<Action> {
            self.calls.borrow_mut().push(FilterCall {
                nominal: *nominal,
                drift: *drift,
                control_matrix: *control_matrix,
                state: *state,
                disturbance_std: *disturbance_std,
            });
            Ok(Action::zeros())
        }
    }

    fn config(steps: usize) -> ControlLoopConfig {
        ControlLoopConfig {
            steps,
            ..ControlLoopConfig::default()
        }
    }

    #[test]
    fn applies_nominal_plus_correction() {
        let mut lp = ControlLoop::new(
            ScriptedEnv::new(100),
            CountingModel::default(),
            ConstantCorrection(Action::new(0.1, -0.05)),
            config(1),
        );
        let rec = lp.tick().unwrap();
        // Compass (1, 0): speed = gain, bearing = 0
        assert_abs_diff_eq!(rec.nominal[0], DEFAULT_SPEED_GAIN, epsilon = 1e-15);
        assert_abs_diff_eq!(rec.nominal[1], 0.0);
        assert_abs_diff_eq!(rec.next_state[0], 0.1 * (DEFAULT_SPEED_GAIN + 0.1), epsilon = 1e-12);
        assert_abs_diff_eq!(rec.next_state[2], -0.005, epsilon = 1e-12);
    }

    #[test]
    fn learns_every_second_episode_step() {
        let mut lp = ControlLoop::new(
            ScriptedEnv::new(3),
            CountingModel::default(),
            ConstantCorrection(Action::zeros()),
            config(6),
        );
        let learned: Vec<bool> = (0..6).map(|_| lp.tick().unwrap().learned).collect();
        // Episode steps 0,1,2 | 0,1,2
        assert_eq!(learned, vec![true, false, true, true, false, true]);
        assert_eq!(lp.model().appended, 4);
    }

    #[test]
    fn episode_boundary_resets_and_summarizes() {
        let mut lp = ControlLoop::new(
            ScriptedEnv::new(2),
            CountingModel::default(),
            ConstantCorrection(Action::zeros()),
            config(5),
        );
        lp.run().unwrap();
        // Ticks 1-2 episode 0, ticks 3-4 episode 1, tick 5 opens episode 2.
        assert_eq!(lp.env().resets, 3);
        let episodes = &lp.history().episodes;
        assert_eq!(episodes.len(), 2);
        assert_abs_diff_eq!(episodes[0].ret, 2.0);
        assert_abs_diff_eq!(episodes[0].cost, 0.2, epsilon = 1e-12);
        assert_eq!(episodes[1].steps, 2);
        assert_eq!(lp.history().len(), 5);
        assert_eq!(lp.phase(), LoopPhase::Running);
    }

    #[test]
    fn model_failure_propagates() {
        let mut lp = ControlLoop::new(
            ScriptedEnv::new(10),
            CountingModel {
                appended: 0,
                fail_on_append: true,
            },
            ConstantCorrection(Action::zeros()),
            config(3),
        );
        assert!(matches!(lp.run(), Err(ControlError::Model(_))));
    }

    #[test]
    fn out_of_box_nominal_is_fatal() {
        let mut lp = ControlLoop::new(
            ScriptedEnv::new(10),
            CountingModel::default(),
            ConstantCorrection(Action::zeros()),
            config(1),
        );
        // A NaN compass passes through clip unchanged and fails the box test.
        lp.obs[4] = f64::NAN;
        assert!(matches!(lp.tick(), Err(ControlError::ActionOutOfBounds { .. })));
    }

    #[test]
    fn filter_sees_learned_drift_and_uncertainty() {
        let mut lp = ControlLoop::new(
            ScriptedEnv::new(100),
            CountingModel::default(),
            RecordingFilter::default(),
            config(3),
        );
        let records: Vec<TickRecord> = (0..3).map(|_| lp.tick().unwrap()).collect();

        let calls = lp.filter().calls.borrow();
        assert_eq!(calls.len(), 3);
        for (call, rec) in calls.iter().zip(&records) {
            // Unicycle drift is zero, so the filter sees exactly the learned mean.
            let f = DynamicsMode::Unicycle.drift(&rec.state);
            assert_eq!(call.drift, f + disturb_mean());
            assert_eq!(call.disturbance_std, State::repeat(0.5));
            assert_eq!(call.state, rec.state);
            assert_eq!(call.nominal, rec.nominal);
            assert_eq!(
                call.control_matrix,
                DynamicsMode::Unicycle.control_matrix(&rec.state)
            );
        }
        // Second tick starts from the state the first one produced.
        assert_eq!(calls[1].state, records[0].next_state);
        assert!(calls[1].state[0] > 0.0);
    }

    #[test]
    fn barrier_filter_takes_gains_from_config() {
        let lp = ControlLoop::with_barrier_filter(
            ScriptedEnv::new(10),
            CountingModel::default(),
            ControlLoopConfig {
                gamma_b: 0.8,
                k_d: 2.0,
                ..ControlLoopConfig::default()
            },
            CbfConfig::default(),
        );
        assert_eq!(lp.filter().gamma_b, 0.8);
        assert_eq!(lp.filter().k_d, 2.0);
        assert_eq!(lp.history().k_d, 2.0);
    }
}
