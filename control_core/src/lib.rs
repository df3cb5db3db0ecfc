//! `control_core` — Uncertainty-aware safe control of a kinematic robot.
//!
//! # Module layout
//! - [`types`]        — Fundamental types (state, action, observation, action box)
//! - [`dynamics`]     — Nominal dynamics `f`, `g` per dynamics mode
//! - [`env`]          — Environment trait consumed by the loop
//! - [`model`]        — Learned disturbance model (GP backend)
//! - [`safety`]       — Robust barrier-certificate safety filter
//! - [`controller`]   — Goal-seeking nominal controller
//! - [`control_loop`] — Per-tick orchestrator with online learning
//! - [`history`]      — Prediction traces, episode summaries, statistics
//! - [`error`]        — Error types

pub mod control_loop;
pub mod controller;
pub mod dynamics;
pub mod env;
pub mod error;
pub mod history;
pub mod model;
pub mod safety;
pub mod types;

pub use control_loop::{ControlLoop, ControlLoopConfig, LoopPhase, TickRecord};
pub use controller::NominalController;
pub use dynamics::DynamicsMode;
pub use env::Environment;
pub use error::{ControlError, ModelError};
pub use history::{DimensionTrace, EpisodeSummary, HistorySummary, RolloutHistory};
pub use model::{DynamicsModel, GpConfig, GpDynamicsModel};
pub use safety::{CbfConfig, CbfSafetyFilter, SafetyFilter};
pub use types::{
    Action, ActionBox, ControlMatrix, Observation, Point2, State, StepInfo, StepResult, Workspace,
};
