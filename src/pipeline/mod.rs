//! Pipeline description and stage payloads
//!
//! Stages run as a linear chain of independently schedulable jobs: each
//! stage's output payload is the next stage's sole input. There is no retry
//! budget: a failing stage permanently fails that trial's pipeline and a new
//! trial must be started fresh. At most one in-flight pipeline per session is
//! assumed; serializing per-session pipelines is the caller's obligation.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::KnobValue;
use crate::preprocess::PreprocessError;
use crate::store::{ObservationId, PipelineRunId, StoreError, WorkloadId};
use crate::surrogate::SurrogateError;

/// Recommendation algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    /// Gaussian-process regression surrogate
    Gpr,
    /// Neural-network regression surrogate
    Dnn,
    /// Reinforcement-learning recommender
    Ddpg,
}

/// One stage of the recommendation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Cold-start state machine and target training-set assembly
    Aggregate,
    /// Workload-similarity scoring and selection
    MapWorkload,
    /// Training-set combination plus surrogate search
    Recommend,
    /// One RL training transition from the latest trial
    TrainAgent,
    /// Query the persisted RL agent for the next configuration
    RecommendAgent,
}

/// The ordered stage chain for an algorithm. The RL path bypasses mapping
/// and combination and drives the persistent agent directly.
pub fn stages_for(algorithm: Algorithm) -> &'static [Stage] {
    match algorithm {
        Algorithm::Gpr | Algorithm::Dnn => {
            &[Stage::Aggregate, Stage::MapWorkload, Stage::Recommend]
        }
        Algorithm::Ddpg => &[Stage::TrainAgent, Stage::RecommendAgent],
    }
}

/// The workload the mapper matched to the target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedWorkload {
    pub id: WorkloadId,
    pub name: String,
    pub score: f64,
}

/// Structured payload handed from stage to stage for one trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagePayload {
    /// The trial this pipeline run is recommending for
    pub newest_observation_id: ObservationId,
    /// Cold-start round: skip mapping and search, persist the supplied config
    pub bad: bool,
    pub knob_matrix: Array2<f64>,
    pub knob_labels: Vec<String>,
    pub metric_matrix: Array2<f64>,
    pub metric_labels: Vec<String>,
    /// Observation id per matrix row
    pub rowlabels: Vec<u64>,
    pub mapped_workload: Option<MappedWorkload>,
    /// Workload id to (name, similarity score)
    pub scores: Option<HashMap<WorkloadId, (String, f64)>>,
    pub pipeline_run: Option<PipelineRunId>,
    /// Configuration chosen by the cold-start state machine
    pub cold_start_config: Option<HashMap<String, KnobValue>>,
}

impl StagePayload {
    /// An empty payload for a trial, before aggregation
    pub fn for_observation(id: ObservationId) -> Self {
        Self {
            newest_observation_id: id,
            bad: false,
            knob_matrix: Array2::zeros((0, 0)),
            knob_labels: Vec::new(),
            metric_matrix: Array2::zeros((0, 0)),
            metric_labels: Vec::new(),
            rowlabels: Vec::new(),
            mapped_workload: None,
            scores: None,
            pipeline_run: None,
            cold_start_config: None,
        }
    }
}

/// Errors that permanently fail a trial's pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Preprocessing error: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("Surrogate error: {0}")]
    Surrogate(#[from] SurrogateError),

    /// Column-label mismatch between datasets that must share a schema
    #[error("{side} column labels differ between target and workload data")]
    SchemaMismatch { side: &'static str },

    #[error("Could not find target objective {0} in metrics")]
    TargetObjectiveMissing(String),

    #[error("Found {count} instances of target objective {name} in metrics")]
    TargetObjectiveDuplicated { name: String, count: usize },

    /// Unreachable by construction: the cold-start state machine guards it
    #[error("No results found for session {session} in normal mode")]
    NoTargetResults { session: u64 },

    #[error("Cannot recommend: {0}")]
    Invalid(String),
}

/// Result alias for pipeline stages
pub type Result<T> = std::result::Result<T, PipelineError>;
