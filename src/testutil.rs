//! Shared fixtures and mock capabilities for tests

use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use ndarray::{Array1, Array2};

use crate::catalog::{Knob, KnobType, KnobValue, Metric, MetricPolarity};
use crate::params::Hyperparameters;
use crate::preprocess::ConfigRepair;
use crate::store::{Observation, ObservationId, Session, SessionId, TuningMode, WorkloadId};
use crate::surrogate::{
    AgentSnapshot, Bounds, DesignGenerator, MetricRegressor, OptimizeOutcome, Result, RlAgent,
    SearchSurrogate, SurrogateError,
};

pub fn knob(name: &str, vartype: KnobType, default: &str, minval: f64, maxval: f64) -> Knob {
    Knob {
        name: name.into(),
        vartype,
        default: default.into(),
        minval,
        maxval,
        enumvals: vec![],
    }
}

pub fn int_knob(name: &str, minval: f64, maxval: f64) -> Knob {
    knob(name, KnobType::Integer, "0", minval, maxval)
}

pub fn session(id: SessionId, mode: TuningMode, knobs: Vec<Knob>) -> Session {
    Session {
        id,
        dbms: "postgres".into(),
        hardware: "hw-1".into(),
        project: "proj".into(),
        target_objective: "throughput".into(),
        tuning_mode: mode,
        knobs,
        metric_catalog: vec![
            Metric {
                name: "latency_p99".into(),
                polarity: MetricPolarity::LessIsBetter,
            },
            Metric {
                name: "cache_hit_ratio".into(),
                polarity: MetricPolarity::MoreIsBetter,
            },
        ],
        hyperparameters: Hyperparameters::default(),
        lhs_pool: vec![],
        agent_snapshot: None,
    }
}

pub fn observation(
    id: ObservationId,
    session_id: SessionId,
    workload_id: WorkloadId,
    knobs: &[(&str, f64)],
    metrics: &[(&str, f64)],
) -> Observation {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Observation {
        id,
        session_id,
        workload_id,
        dbms: "postgres".into(),
        created_at: base + Duration::minutes(id as i64),
        knob_values: knobs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        metric_values: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        recommendation: None,
    }
}

/// Design generator producing evenly spaced configurations over each knob's
/// declared range
pub struct GridDesignGenerator;

impl DesignGenerator for GridDesignGenerator {
    fn generate(&mut self, knobs: &[Knob], n: usize) -> Vec<HashMap<String, KnobValue>> {
        (0..n)
            .map(|i| {
                let frac = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.5 };
                knobs
                    .iter()
                    .map(|k| {
                        let v = k.minval + frac * (k.maxval - k.minval);
                        (k.name.clone(), KnobValue::Real(v))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Nearest-neighbor regressor: predicts the training target of the closest
/// training row
#[derive(Default)]
pub struct NearestNeighborRegressor {
    x: Option<Array2<f64>>,
    y: Option<Array1<f64>>,
}

impl MetricRegressor for NearestNeighborRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.x = Some(x.clone());
        self.y = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let train_x = self.x.as_ref().ok_or(SurrogateError::NotFitted)?;
        let train_y = self.y.as_ref().ok_or(SurrogateError::NotFitted)?;
        Ok(Array1::from_iter(x.rows().into_iter().map(|row| {
            let nearest = train_x
                .rows()
                .into_iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let da: f64 = a.iter().zip(&row).map(|(u, v)| (u - v).powi(2)).sum();
                    let db: f64 = b.iter().zip(&row).map(|(u, v)| (u - v).powi(2)).sum();
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i)
                .unwrap_or(0);
            train_y[nearest]
        })))
    }
}

/// Surrogate that returns each seed unchanged, scored by its distance to the
/// fitted training row with the best (smallest) objective
pub struct PassThroughSurrogate {
    best_row: Option<Array1<f64>>,
}

impl PassThroughSurrogate {
    pub fn new() -> Self {
        Self { best_row: None }
    }
}

impl SearchSurrogate for PassThroughSurrogate {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let best = y
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.best_row = Some(x.row(best).to_owned());
        Ok(())
    }

    fn optimize(
        &mut self,
        seeds: &Array2<f64>,
        bounds: &Bounds,
        repair: &ConfigRepair,
    ) -> Result<OptimizeOutcome> {
        let best = self.best_row.as_ref().ok_or(SurrogateError::NotFitted)?;
        let mut configs = seeds.clone();
        for mut row in configs.rows_mut() {
            for j in 0..row.len() {
                row[j] = row[j].clamp(bounds.min[j], bounds.max[j]);
            }
        }
        let repaired: Vec<Array1<f64>> = configs
            .rows()
            .into_iter()
            .map(|r| repair.repair(&r.to_owned()))
            .collect();
        for (mut row, rep) in configs.rows_mut().into_iter().zip(&repaired) {
            row.assign(rep);
        }
        let losses = Array1::from_iter(configs.rows().into_iter().map(|row| {
            row.iter().zip(best).map(|(a, b)| (a - b).powi(2)).sum::<f64>()
        }));
        Ok(OptimizeOutcome { configs, losses })
    }
}

/// Recording agent: remembers transitions and update calls, acts with a
/// constant normalized action
pub struct RecordingAgent {
    pub transitions: Vec<(Array1<f64>, Array1<f64>, f64, Array1<f64>)>,
    pub updates: usize,
    pub action: Vec<f64>,
    pub restored: Option<AgentSnapshot>,
}

impl RecordingAgent {
    pub fn with_action(action: Vec<f64>) -> Self {
        Self {
            transitions: Vec::new(),
            updates: 0,
            action,
            restored: None,
        }
    }
}

impl RlAgent for RecordingAgent {
    fn restore(&mut self, snapshot: &AgentSnapshot) -> Result<()> {
        self.restored = Some(snapshot.clone());
        Ok(())
    }

    fn snapshot(&self) -> Result<AgentSnapshot> {
        Ok(AgentSnapshot {
            actor: vec![1],
            critic: vec![2],
            replay_memory: vec![self.transitions.len() as u8],
        })
    }

    fn add_sample(
        &mut self,
        state: &Array1<f64>,
        action: &Array1<f64>,
        reward: f64,
        next_state: &Array1<f64>,
    ) {
        self.transitions
            .push((state.clone(), action.clone(), reward, next_state.clone()));
    }

    fn update(&mut self) -> Result<()> {
        self.updates += 1;
        Ok(())
    }

    fn choose_action(&mut self, _state: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from(self.action.clone()))
    }
}
