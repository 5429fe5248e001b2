//! Configuration recommendation search
//!
//! Fits the session's surrogate on the combined workload data and runs its
//! optimizer from a mix of random seeds and the best configurations seen so
//! far. The winning candidate is decoded back to raw knob values and clamped
//! to the catalog's declared ranges.


use std::collections::HashMap;

use ndarray::{Array1, Array2};
use rand::Rng;
use tracing::{debug, info};

use crate::catalog::{Knob, KnobType, KnobValue};
use crate::combine::{combine_workload, CombinedWorkload};
use crate::pipeline::{Result, StagePayload};
use crate::store::{Recommendation, RecommendationStatus, Store, TuningMode};
use crate::surrogate::{Bounds, SearchSurrogate};

// Seeds this close (squared distance) to the upper bound get nudged down
// instead of up so they stay in range
const UPPER_BOUND_PROXIMITY: f64 = 1e-3;

/// Recommend the next configuration to try and persist it onto the trial.
///
/// On a cold-start round the sampled configuration rides through unchanged
/// with a `Bad` status. Otherwise the surrogate is fitted and optimized and
/// the lowest-loss candidate becomes the recommendation.
pub fn recommend_configuration<S, M, R>(
    store: &mut S,
    payload: &StagePayload,
    model: &mut M,
    rng: &mut R,
) -> Result<Recommendation>
where
    S: Store,
    M: SearchSurrogate,
    R: Rng,
{
    let newest = store.observation(payload.newest_observation_id)?;
    let session = store.session(newest.session_id)?;

    if payload.bad {
        let config = payload.cold_start_config.clone().unwrap_or_default();
        debug!("cold-start round, passing the sampled configuration through");
        // The note tells the operator where the configuration came from
        let info = match session.tuning_mode {
            TuningMode::RandomlyGenerate => "randomly generated configuration",
            _ => "configuration sampled from the latin hypercube pool",
        };
        let rec = Recommendation {
            config,
            status: RecommendationStatus::Bad,
            info: info.into(),
            observation_id: payload.newest_observation_id,
            pipeline_run: payload.pipeline_run,
        };
        store.save_recommendation(&rec)?;
        return Ok(rec);
    }

    let combined = combine_workload(store, payload)?;
    let params = &session.hyperparameters;

    let seeds = build_seeds(
        &combined,
        params.num_samples,
        params.top_num_config,
        params.gpr_eps,
        rng,
    );

    model.fit(&combined.x_scaled, &combined.y_scaled)?;
    let outcome = model.optimize(
        &seeds,
        &Bounds {
            min: combined.x_min.clone(),
            max: combined.x_max.clone(),
        },
        &combined.repair,
    )?;

    let best = outcome
        .losses
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let best_scaled = outcome.configs.row(best).to_owned();

    let config = decode_configuration(&combined, &best_scaled, &session.knobs);
    info!(
        loss = outcome.losses[best],
        "selected the best candidate configuration"
    );

    let rec = Recommendation {
        config,
        status: RecommendationStatus::Good,
        info: format!("training data size {}", combined.x_scaled.nrows()),
        observation_id: payload.newest_observation_id,
        pipeline_run: payload.pipeline_run,
    };
    store.save_recommendation(&rec)?;
    Ok(rec)
}

/// Random seeds across the bounded box plus the historically best rows,
/// nudged off the training points so the optimizer does not start exactly on
/// them.
fn build_seeds<R: Rng>(
    combined: &CombinedWorkload,
    num_samples: usize,
    top_num_config: usize,
    gpr_eps: f64,
    rng: &mut R,
) -> Array2<f64> {
    let ncols = combined.x_scaled.ncols();
    let mut order: Vec<usize> = (0..combined.y_scaled.len()).collect();
    order.sort_by(|&a, &b| {
        combined.y_scaled[a]
            .partial_cmp(&combined.y_scaled[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let n_best = top_num_config.min(order.len());

    let mut seeds = Array2::zeros((num_samples + n_best, ncols));
    for i in 0..num_samples {
        for j in 0..ncols {
            let span = combined.x_max[j] - combined.x_min[j];
            seeds[[i, j]] = combined.x_min[j] + rng.random::<f64>() * span;
        }
    }
    for (i, &row) in order.iter().take(n_best).enumerate() {
        let base = combined.x_scaled.row(row);
        let dist: f64 = base
            .iter()
            .zip(combined.x_max.iter())
            .map(|(v, m)| (m - v).powi(2))
            .sum();
        let eps = if dist < UPPER_BOUND_PROXIMITY {
            -gpr_eps.abs()
        } else {
            gpr_eps.abs()
        };
        for j in 0..ncols {
            seeds[[num_samples + i, j]] = base[j] + eps;
        }
    }
    seeds
}

/// Unscale and decode the winning candidate, then clamp each knob to its
/// declared raw range and cast to its catalog type.
fn decode_configuration(
    combined: &CombinedWorkload,
    best_scaled: &Array1<f64>,
    knobs: &[Knob],
) -> HashMap<String, KnobValue> {
    let raw_encoded = combined.x_scaler.inverse_transform_row(best_scaled);
    let raw = match &combined.encoder {
        Some(encoder) => encoder.inverse_row(&raw_encoded),
        None => raw_encoded,
    };

    let mut config = HashMap::with_capacity(combined.columnlabels.len());
    for (i, label) in combined.columnlabels.iter().enumerate() {
        let knob = knobs.iter().find(|k| &k.name == label);
        let value = match knob {
            Some(k) => {
                let clamped = raw[i].clamp(k.minval, k.maxval);
                match k.vartype {
                    KnobType::Bool => KnobValue::Bool(clamped >= 0.5),
                    KnobType::Enum => {
                        let top = k.enumvals.len().saturating_sub(1) as f64;
                        KnobValue::Int(clamped.round().clamp(0.0, top) as i64)
                    }
                    KnobType::Integer => KnobValue::Int(clamped.round() as i64),
                    KnobType::Real => KnobValue::Real(clamped),
                    KnobType::String | KnobType::Timestamp => KnobValue::Str("None".into()),
                }
            }
            None => KnobValue::Real(raw[i]),
        };
        config.insert(label.clone(), value);
    }
    config
}
