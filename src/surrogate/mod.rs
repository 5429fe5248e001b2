//! Pluggable surrogate capabilities
//!
//! The pipeline treats its expensive models as external capabilities with
//! fixed contracts: a Gaussian-process or neural-network search surrogate, a
//! per-metric regressor for workload mapping, a reinforcement-learning agent,
//! and a space-filling design generator. Implementations live outside this
//! crate; tests use lightweight mocks.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Knob, KnobValue};
use crate::preprocess::ConfigRepair;
use std::collections::HashMap;

/// Errors surfaced by surrogate implementations
#[derive(Debug, Error)]
pub enum SurrogateError {
    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Surrogate failure: {0}")]
    Internal(String),
}

/// Result alias for surrogate operations
pub type Result<T> = std::result::Result<T, SurrogateError>;

/// Per-column search bounds in scaled space
#[derive(Debug, Clone)]
pub struct Bounds {
    pub min: Array1<f64>,
    pub max: Array1<f64>,
}

/// Outcome of a surrogate-driven local optimization: one locally-optimized
/// configuration and its predicted loss per seed point.
#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub configs: Array2<f64>,
    pub losses: Array1<f64>,
}

/// Search surrogate contract (GP regression or neural network).
///
/// `fit` trains on the combined scaled training set; `optimize` refines each
/// seed within the bounds, using the repair helper to keep candidates
/// feasible, and reports the predicted loss of each refined configuration.
/// The caller selects the seed with minimum predicted loss.
pub trait SearchSurrogate {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn optimize(
        &mut self,
        seeds: &Array2<f64>,
        bounds: &Bounds,
        repair: &ConfigRepair,
    ) -> Result<OptimizeOutcome>;
}

/// Regression surrogate used by the workload mapper, one fresh instance per
/// (workload, metric column) pair.
pub trait MetricRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Serialized RL agent state: network weights plus replay memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub actor: Vec<u8>,
    pub critic: Vec<u8>,
    pub replay_memory: Vec<u8>,
}

/// Reinforcement-learning agent contract (actor-critic with replay memory)
pub trait RlAgent {
    /// Restore previously persisted networks and replay memory
    fn restore(&mut self, snapshot: &AgentSnapshot) -> Result<()>;

    /// Snapshot the current networks and replay memory
    fn snapshot(&self) -> Result<AgentSnapshot>;

    /// Append one transition to the replay memory
    fn add_sample(&mut self, state: &Array1<f64>, action: &Array1<f64>, reward: f64, next_state: &Array1<f64>);

    /// Run one gradient-update epoch over the replay memory
    fn update(&mut self) -> Result<()>;

    /// Choose an action for the given state, without training
    fn choose_action(&mut self, state: &Array1<f64>) -> Result<Array1<f64>>;
}

/// Space-filling design generator (e.g. maximin Latin Hypercube), seeded with
/// each knob's declared range.
pub trait DesignGenerator {
    fn generate(&mut self, knobs: &[Knob], n: usize) -> Vec<HashMap<String, KnobValue>>;
}
