//! Result aggregation and the cold-start state machine
//!
//! The first pipeline stage. Decides between cold-start sampling (LHS pool or
//! per-knob random draws) and data-driven mode, and assembles the target
//! training set for the stages downstream.


use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::align::align_knobs;
use crate::catalog::{Knob, KnobType, KnobValue};
use crate::pipeline::{PipelineError, Result, StagePayload};
use crate::store::{Observation, ObservationId, Store, TuningMode};
use crate::surrogate::DesignGenerator;

/// LHS pool size regenerated in `lhs` mode
const LHS_POOL_SIZE: usize = 100;
/// LHS pool size regenerated when cold-starting a normal session
const LHS_POOL_SIZE_FALLBACK: usize = 10;

/// Build labeled knob/metric matrices from a set of observations.
///
/// Column labels are the sorted union of observed names; values missing from
/// an observation become 0. Row labels are observation ids, in input order.
pub fn aggregate_observations(
    observations: &[Observation],
) -> (Array2<f64>, Vec<String>, Array2<f64>, Vec<String>, Vec<u64>) {
    let knob_labels: Vec<String> = observations
        .iter()
        .flat_map(|o| o.knob_values.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let metric_labels: Vec<String> = observations
        .iter()
        .flat_map(|o| o.metric_values.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let x = Array2::from_shape_fn((observations.len(), knob_labels.len()), |(r, c)| {
        observations[r]
            .knob_values
            .get(&knob_labels[c])
            .copied()
            .unwrap_or(0.0)
    });
    let y = Array2::from_shape_fn((observations.len(), metric_labels.len()), |(r, c)| {
        observations[r]
            .metric_values
            .get(&metric_labels[c])
            .copied()
            .unwrap_or(0.0)
    });
    let rowlabels = observations.iter().map(|o| o.id).collect();
    (x, knob_labels, y, metric_labels, rowlabels)
}

/// Draw one independent uniform sample per knob, respecting its type
pub fn gen_random_config<R: Rng>(knobs: &[Knob], rng: &mut R) -> HashMap<String, KnobValue> {
    let mut config = HashMap::new();
    for knob in knobs {
        let value = match knob.vartype {
            KnobType::Bool => KnobValue::Bool(rng.random::<f64>() < 0.5),
            KnobType::Enum => {
                let idx = (rng.random::<f64>() * knob.enumvals.len() as f64).floor() as usize;
                KnobValue::Int(idx.min(knob.enumvals.len().saturating_sub(1)) as i64)
            }
            KnobType::Integer => {
                let span = knob.maxval - knob.minval;
                KnobValue::Int((knob.minval + rng.random::<f64>() * span).round() as i64)
            }
            KnobType::Real => {
                KnobValue::Real(knob.minval + rng.random::<f64>() * (knob.maxval - knob.minval))
            }
            KnobType::String | KnobType::Timestamp => KnobValue::Str("None".into()),
        };
        config.insert(knob.name.clone(), value);
    }
    config
}

/// Aggregate the target's benchmark history and decide cold-start vs.
/// data-driven mode for this trial.
///
/// LHS is entered in `lhs` mode and also whenever no pipeline data exists yet
/// for the trial's workload. The pool pop and the session save happen exactly
/// once per call.
pub fn aggregate_target_results<S, G, R>(
    store: &mut S,
    generator: &mut G,
    rng: &mut R,
    observation_id: ObservationId,
) -> Result<StagePayload>
where
    S: Store,
    G: DesignGenerator,
    R: Rng,
{
    let newest = store.observation(observation_id)?;
    let mut session = store.session(newest.session_id)?;
    let has_pipeline_data = store.workload_has_pipeline_data(newest.workload_id)?;

    let mut payload = StagePayload::for_observation(observation_id);

    if !has_pipeline_data || session.tuning_mode == TuningMode::Lhs {
        if !has_pipeline_data && session.tuning_mode == TuningMode::Normal {
            debug!("no pipeline data for this workload yet, picking a config with LHS");
        }
        let mut pool = std::mem::take(&mut session.lhs_pool);
        if pool.is_empty() {
            let n = if session.tuning_mode == TuningMode::Lhs {
                LHS_POOL_SIZE
            } else {
                LHS_POOL_SIZE_FALLBACK
            };
            pool = generator.generate(&session.knobs, n);
            pool.shuffle(rng);
            info!(samples = pool.len(), "regenerated LHS sample pool");
        }
        let config = pool
            .pop()
            .ok_or_else(|| PipelineError::Invalid("design generator returned no samples".into()))?;

        fill_target_matrices(&mut payload, &[newest]);
        payload.bad = true;
        payload.cold_start_config = Some(config);

        session.lhs_pool = pool;
        store.save_session(&session)?;
        debug!(remaining = session.lhs_pool.len(), "popped LHS config");
    } else if session.tuning_mode == TuningMode::RandomlyGenerate {
        let config = gen_random_config(&session.knobs, rng);
        fill_target_matrices(&mut payload, &[newest]);
        payload.bad = true;
        payload.cold_start_config = Some(config);
        debug!("generated a random config");
    } else {
        let target_results =
            store.observations_for_target(session.id, &newest.dbms, newest.workload_id)?;
        if target_results.is_empty() {
            // Guarded by the mode state machine; fatal if it ever occurs
            return Err(PipelineError::NoTargetResults {
                session: session.id,
            });
        }
        fill_target_matrices(&mut payload, &target_results);
        payload.bad = false;

        let (aligned, labels) = align_knobs(&payload.knob_matrix, &payload.knob_labels, &session);
        payload.knob_matrix = aligned;
        payload.knob_labels = labels;
        info!(rows = payload.rowlabels.len(), "aggregated target results");
    }

    Ok(payload)
}

fn fill_target_matrices(payload: &mut StagePayload, observations: &[Observation]) {
    let (x, knob_labels, y, metric_labels, rowlabels) = aggregate_observations(observations);
    payload.knob_matrix = x;
    payload.knob_labels = knob_labels;
    payload.metric_matrix = y;
    payload.metric_labels = metric_labels;
    payload.rowlabels = rowlabels;
}
