//! Rollout diagnostics: per-dimension prediction traces and episode summaries.

use crate::types::{State, STATE_DIM};
use serde::{Deserialize, Serialize};

/// Predicted-vs-realized trace of one state dimension.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DimensionTrace {
    /// Realized next-state value
    pub actual: Vec<f64>,
    /// Predicted next-state mean
    pub predicted_mean: Vec<f64>,
    /// mean − k_d·std
    pub lower: Vec<f64>,
    /// mean + k_d·std
    pub upper: Vec<f64>,
    /// Predicted next-state std
    pub predicted_std: Vec<f64>,
}

impl DimensionTrace {
    pub fn len(&self) -> usize {
        self.actual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actual.is_empty()
    }

    /// Mean |predicted − actual|; zero for an empty trace.
    pub fn mean_abs_error(&self) -> f64 {
        if self.actual.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .actual
            .iter()
            .zip(&self.predicted_mean)
            .map(|(a, p)| (p - a).abs())
            .sum();
        sum / self.actual.len() as f64
    }

    /// Largest predicted std; zero for an empty trace.
    pub fn max_std(&self) -> f64 {
        self.predicted_std.iter().copied().fold(0.0, f64::max)
    }

    /// Fraction of realized values inside the confidence band.
    pub fn coverage(&self) -> f64 {
        if self.actual.is_empty() {
            return 1.0;
        }
        let inside = self
            .actual
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .filter(|(a, (lo, hi))| **a >= **lo && **a <= **hi)
            .count();
        inside as f64 / self.actual.len() as f64
    }
}

/// Totals of one completed episode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub index: usize,
    pub ret: f64,
    pub cost: f64,
    pub steps: u64,
    pub goal_met: bool,
}

/// Everything recorded during one rollout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RolloutHistory {
    pub dims: Vec<DimensionTrace>,
    pub episodes: Vec<EpisodeSummary>,
    /// Uncertainty multiplier used for the bands
    pub k_d: f64,
}

impl RolloutHistory {
    pub fn new(k_d: f64) -> Self {
        Self {
            dims: vec![DimensionTrace::default(); STATE_DIM],
            episodes: Vec::new(),
            k_d,
        }
    }

    /// Record one tick's realized and predicted next state.
    pub fn record(&mut self, actual: &State, mean: &State, std: &State) {
        let lower = mean - self.k_d * std;
        let upper = mean + self.k_d * std;
        for (i, trace) in self.dims.iter_mut().enumerate() {
            trace.actual.push(actual[i]);
            trace.predicted_mean.push(mean[i]);
            trace.lower.push(lower[i]);
            trace.upper.push(upper[i]);
            trace.predicted_std.push(std[i]);
        }
    }

    /// Number of recorded ticks.
    pub fn len(&self) -> usize {
        self.dims.first().map_or(0, DimensionTrace::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            mean_abs_error: self.dims.iter().map(DimensionTrace::mean_abs_error).collect(),
            max_std: self.dims.iter().map(DimensionTrace::max_std).collect(),
            coverage: self.dims.iter().map(DimensionTrace::coverage).collect(),
            episodes: self.episodes.len(),
            total_cost: self.episodes.iter().map(|e| e.cost).sum(),
            goals_reached: self.episodes.iter().filter(|e| e.goal_met).count(),
        }
    }
}

/// Aggregate statistics printed at the end of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Per state dimension
    pub mean_abs_error: Vec<f64>,
    /// Per state dimension
    pub max_std: Vec<f64>,
    /// Per state dimension
    pub coverage: Vec<f64>,
    /// Completed episodes
    pub episodes: usize,
    pub total_cost: f64,
    pub goals_reached: usize,
}
