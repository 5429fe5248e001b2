//! Tuning-session data model and storage contract
//!
//! Sessions, benchmark observations, workloads, and the read-only pipeline
//! cache live behind the [`Store`] trait. The pipeline core only ever talks
//! to this contract; [`InMemoryStore`] backs tests and embedded use.
//!
//! Session-scoped mutable state (the LHS sample pool and the RL agent
//! snapshot) is read, mutated, and written back within a single stage
//! invocation with no internal locking. Serializing pipelines per session is
//! the caller's obligation; concurrent trials on one session can race on the
//! pool pop and the agent load-mutate-save cycle.


use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Knob, KnobValue, Metric};
use crate::params::Hyperparameters;
use crate::surrogate::AgentSnapshot;

pub type SessionId = u64;
pub type ObservationId = u64;
pub type WorkloadId = u64;
pub type PipelineRunId = u64;

/// Cold-start mode of a tuning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningMode {
    Lhs,
    RandomlyGenerate,
    Normal,
}

/// One tuning session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub dbms: String,
    pub hardware: String,
    pub project: String,
    /// The single metric this session optimizes
    pub target_objective: String,
    pub tuning_mode: TuningMode,
    /// Knob catalog; defines canonical knob column order
    pub knobs: Vec<Knob>,
    /// Metric catalog for the session's DBMS
    pub metric_catalog: Vec<Metric>,
    pub hyperparameters: Hyperparameters,
    /// Persisted Latin-Hypercube sample pool
    pub lhs_pool: Vec<HashMap<String, KnobValue>>,
    /// Persisted RL agent networks and replay memory
    pub agent_snapshot: Option<AgentSnapshot>,
}

impl Session {
    /// Polarity of the session's target objective, if cataloged
    pub fn target_metric(&self) -> Option<&Metric> {
        self.metric_catalog
            .iter()
            .find(|m| m.name == self.target_objective)
    }
}

/// Status of a persisted recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Good,
    Bad,
}

/// A persisted next-configuration recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Knob name to recommended value
    pub config: HashMap<String, KnobValue>,
    pub status: RecommendationStatus,
    /// Explanatory note (e.g. training-set size, cold-start provenance)
    pub info: String,
    /// The trial this recommendation was computed from
    pub observation_id: ObservationId,
    pub pipeline_run: Option<PipelineRunId>,
}

/// One benchmark trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub session_id: SessionId,
    pub workload_id: WorkloadId,
    pub dbms: String,
    pub created_at: DateTime<Utc>,
    /// Observed knob vector, keyed by knob name
    pub knob_values: HashMap<String, f64>,
    /// Observed metric vector, keyed by metric name
    pub metric_values: HashMap<String, f64>,
    /// Written exactly once, by the terminal recommendation stage
    pub recommendation: Option<Recommendation>,
}

/// A cluster of trials sharing execution environment characteristics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    pub name: String,
    pub dbms: String,
    pub hardware: String,
    pub project: String,
}

/// Task type of a cached pipeline artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineTaskType {
    KnobData,
    MetricData,
    RankedKnobs,
    PrunedMetrics,
}

/// A labeled matrix as cached by the offline pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixPayload {
    pub data: Vec<Vec<f64>>,
    pub columnlabels: Vec<String>,
    pub rowlabels: Vec<u64>,
}

/// Cached pipeline artifact: either a labeled matrix or a name list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineArtifact {
    Matrix(MatrixPayload),
    Names(Vec<String>),
}

impl PipelineArtifact {
    pub fn as_matrix(&self) -> Option<&MatrixPayload> {
        match self {
            PipelineArtifact::Matrix(m) => Some(m),
            PipelineArtifact::Names(_) => None,
        }
    }

    pub fn as_names(&self) -> Option<&[String]> {
        match self {
            PipelineArtifact::Names(n) => Some(n),
            PipelineArtifact::Matrix(_) => None,
        }
    }
}

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Observation not found: {0}")]
    ObservationNotFound(ObservationId),

    #[error("Workload not found: {0}")]
    WorkloadNotFound(WorkloadId),

    #[error("Pipeline data not found for run {run}, workload {workload}, task {task:?}")]
    PipelineDataNotFound {
        run: PipelineRunId,
        workload: WorkloadId,
        task: PipelineTaskType,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage contract for the recommendation pipeline
pub trait Store {
    fn session(&self, id: SessionId) -> Result<Session>;

    fn save_session(&mut self, session: &Session) -> Result<()>;

    fn observation(&self, id: ObservationId) -> Result<Observation>;

    /// Persist a recommendation onto its source observation
    fn save_recommendation(&mut self, rec: &Recommendation) -> Result<()>;

    /// All trials for (session, dbms, workload), oldest first
    fn observations_for_target(
        &self,
        session: SessionId,
        dbms: &str,
        workload: WorkloadId,
    ) -> Result<Vec<Observation>>;

    /// All trials for a session created strictly before `before`, oldest first
    fn observations_for_session_before(
        &self,
        session: SessionId,
        before: DateTime<Utc>,
    ) -> Result<Vec<Observation>>;

    /// All trials belonging to a workload
    fn observations_for_workload(&self, workload: WorkloadId) -> Result<Vec<Observation>>;

    fn workload(&self, id: WorkloadId) -> Result<Workload>;

    /// Workloads with zero observations are deleted when encountered
    fn delete_workload(&mut self, id: WorkloadId) -> Result<()>;

    /// Latest completed offline pipeline run, if any
    fn latest_pipeline_run(&self) -> Result<Option<PipelineRunId>>;

    /// Whether any pipeline data exists for the workload, in any run
    fn workload_has_pipeline_data(&self, workload: WorkloadId) -> Result<bool>;

    /// Distinct workloads with cached data for `run` sharing the target's
    /// (dbms, hardware, project), in stable (id) order
    fn pipeline_workloads(
        &self,
        run: PipelineRunId,
        dbms: &str,
        hardware: &str,
        project: &str,
    ) -> Result<Vec<WorkloadId>>;

    fn pipeline_data(
        &self,
        run: PipelineRunId,
        workload: WorkloadId,
        task: PipelineTaskType,
    ) -> Result<PipelineArtifact>;
}

/// In-memory store for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: HashMap<SessionId, Session>,
    observations: HashMap<ObservationId, Observation>,
    workloads: HashMap<WorkloadId, Workload>,
    pipeline_cache: HashMap<(PipelineRunId, WorkloadId, PipelineTaskType), PipelineArtifact>,
    latest_run: Option<PipelineRunId>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    pub fn add_observation(&mut self, observation: Observation) {
        self.observations.insert(observation.id, observation);
    }

    pub fn add_workload(&mut self, workload: Workload) {
        self.workloads.insert(workload.id, workload);
    }

    pub fn add_pipeline_data(
        &mut self,
        run: PipelineRunId,
        workload: WorkloadId,
        task: PipelineTaskType,
        artifact: PipelineArtifact,
    ) {
        self.latest_run = Some(self.latest_run.map_or(run, |r| r.max(run)));
        self.pipeline_cache.insert((run, workload, task), artifact);
    }
}

impl Store for InMemoryStore {
    fn session(&self, id: SessionId) -> Result<Session> {
        self.sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn save_session(&mut self, session: &Session) -> Result<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn observation(&self, id: ObservationId) -> Result<Observation> {
        self.observations
            .get(&id)
            .cloned()
            .ok_or(StoreError::ObservationNotFound(id))
    }

    fn save_recommendation(&mut self, rec: &Recommendation) -> Result<()> {
        let obs = self
            .observations
            .get_mut(&rec.observation_id)
            .ok_or(StoreError::ObservationNotFound(rec.observation_id))?;
        obs.recommendation = Some(rec.clone());
        Ok(())
    }

    fn observations_for_target(
        &self,
        session: SessionId,
        dbms: &str,
        workload: WorkloadId,
    ) -> Result<Vec<Observation>> {
        let mut out: Vec<Observation> = self
            .observations
            .values()
            .filter(|o| o.session_id == session && o.dbms == dbms && o.workload_id == workload)
            .cloned()
            .collect();
        out.sort_by_key(|o| (o.created_at, o.id));
        Ok(out)
    }

    fn observations_for_session_before(
        &self,
        session: SessionId,
        before: DateTime<Utc>,
    ) -> Result<Vec<Observation>> {
        let mut out: Vec<Observation> = self
            .observations
            .values()
            .filter(|o| o.session_id == session && o.created_at < before)
            .cloned()
            .collect();
        out.sort_by_key(|o| (o.created_at, o.id));
        Ok(out)
    }

    fn observations_for_workload(&self, workload: WorkloadId) -> Result<Vec<Observation>> {
        let mut out: Vec<Observation> = self
            .observations
            .values()
            .filter(|o| o.workload_id == workload)
            .cloned()
            .collect();
        out.sort_by_key(|o| (o.created_at, o.id));
        Ok(out)
    }

    fn workload(&self, id: WorkloadId) -> Result<Workload> {
        self.workloads
            .get(&id)
            .cloned()
            .ok_or(StoreError::WorkloadNotFound(id))
    }

    fn delete_workload(&mut self, id: WorkloadId) -> Result<()> {
        self.workloads
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::WorkloadNotFound(id))
    }

    fn latest_pipeline_run(&self) -> Result<Option<PipelineRunId>> {
        Ok(self.latest_run)
    }

    fn workload_has_pipeline_data(&self, workload: WorkloadId) -> Result<bool> {
        Ok(self
            .pipeline_cache
            .keys()
            .any(|(_, w, _)| *w == workload))
    }

    fn pipeline_workloads(
        &self,
        run: PipelineRunId,
        dbms: &str,
        hardware: &str,
        project: &str,
    ) -> Result<Vec<WorkloadId>> {
        let mut ids: Vec<WorkloadId> = self
            .pipeline_cache
            .keys()
            .filter(|(r, _, _)| *r == run)
            .map(|(_, w, _)| *w)
            .filter(|w| {
                self.workloads.get(w).is_some_and(|wl| {
                    wl.dbms == dbms && wl.hardware == hardware && wl.project == project
                })
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn pipeline_data(
        &self,
        run: PipelineRunId,
        workload: WorkloadId,
        task: PipelineTaskType,
    ) -> Result<PipelineArtifact> {
        self.pipeline_cache
            .get(&(run, workload, task))
            .cloned()
            .ok_or(StoreError::PipelineDataNotFound {
                run,
                workload,
                task,
            })
    }
}
