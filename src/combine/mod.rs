//! Workload combination
//!
//! Merges the target's training data with the mapped workload's history into
//! a single scaled, bounded optimization problem for the recommendation
//! search. When no workload was mapped the target combines with itself,
//! which adds nothing but keeps the downstream contract uniform.


use ndarray::{Array1, Array2};
use tracing::{debug, warn};

use crate::align::align_knobs;
use crate::catalog::MetricPolarity;
use crate::mapping::{matrix_artifact, names_artifact, to_array};
use crate::pipeline::{PipelineError, Result, StagePayload};
use crate::preprocess::{combine_duplicate_rows, ConfigRepair, DummyEncoder, StandardScaler};
use crate::store::{PipelineTaskType, Store};

/// The combined, scaled, bounded training set handed to the search stage
#[derive(Debug)]
pub struct CombinedWorkload {
    /// Labels of the retained knob columns, pre-encoding
    pub columnlabels: Vec<String>,
    /// Feature scaler fitted on the (possibly encoded) knob stack
    pub x_scaler: StandardScaler,
    /// Scaled knob matrix, target rows first
    pub x_scaled: Array2<f64>,
    /// Scaled signed objective; smaller is always better
    pub y_scaled: Array1<f64>,
    /// Per-column lower bounds in scaled space
    pub x_min: Array1<f64>,
    /// Per-column upper bounds in scaled space
    pub x_max: Array1<f64>,
    /// One-hot encoder for enum knobs, when enabled
    pub encoder: Option<DummyEncoder>,
    /// Feasibility repair helper for the optimizer
    pub repair: ConfigRepair,
}

/// Combine target and mapped-workload data into one optimization problem.
pub fn combine_workload<S: Store>(store: &S, payload: &StagePayload) -> Result<CombinedWorkload> {
    let newest = store.observation(payload.newest_observation_id)?;
    let session = store.session(newest.session_id)?;
    let params = &session.hyperparameters;

    // Load the mapped workload's full history, or self-combine
    let (x_workload, mut x_columnlabels, y_workload, y_columnlabels, rowlabels_workload) =
        match &payload.mapped_workload {
            Some(mapped) => {
                let run = payload
                    .pipeline_run
                    .ok_or_else(|| PipelineError::Invalid("mapped workload without a pipeline run".into()))?;
                let knob_data = matrix_artifact(store, run, mapped.id, PipelineTaskType::KnobData)?;
                let raw_x = to_array(&knob_data.data, knob_data.columnlabels.len());
                let (x, labels) = align_knobs(&raw_x, &knob_data.columnlabels, &session);
                let metric_data =
                    matrix_artifact(store, run, mapped.id, PipelineTaskType::MetricData)?;
                let y = to_array(&metric_data.data, metric_data.columnlabels.len());
                (x, labels, y, metric_data.columnlabels, metric_data.rowlabels)
            }
            None => (
                payload.knob_matrix.clone(),
                payload.knob_labels.clone(),
                payload.metric_matrix.clone(),
                payload.metric_labels.clone(),
                payload.rowlabels.clone(),
            ),
        };

    // Any label drift between the aligned datasets is a schema fault
    if x_columnlabels != payload.knob_labels {
        return Err(PipelineError::SchemaMismatch { side: "knob" });
    }
    if y_columnlabels != payload.metric_labels {
        return Err(PipelineError::SchemaMismatch { side: "metric" });
    }

    let mut x_target = payload.knob_matrix.clone();
    let y_target_full = payload.metric_matrix.clone();
    let rowlabels_target = payload.rowlabels.clone();
    let mut x_workload = x_workload;

    // Restrict to the top ranked knobs when a mapping exists
    if let Some(mapped) = &payload.mapped_workload {
        let run = payload
            .pipeline_run
            .ok_or_else(|| PipelineError::Invalid("mapped workload without a pipeline run".into()))?;
        let ranked: Vec<String> =
            names_artifact(store, run, mapped.id, PipelineTaskType::RankedKnobs)?
                .into_iter()
                .take(params.important_knob_number)
                .collect();
        let idxs: Vec<usize> = (0..x_columnlabels.len())
            .filter(|&i| ranked.contains(&x_columnlabels[i]))
            .collect();
        x_workload = select_columns(&x_workload, &idxs);
        x_target = select_columns(&x_target, &idxs);
        x_columnlabels = idxs.iter().map(|&i| x_columnlabels[i].clone()).collect();
    }

    // Single target-objective metric column; absence or duplication is fatal
    let obj_idxs: Vec<usize> = y_columnlabels
        .iter()
        .enumerate()
        .filter(|(_, l)| **l == session.target_objective)
        .map(|(i, _)| i)
        .collect();
    match obj_idxs.len() {
        0 => {
            return Err(PipelineError::TargetObjectiveMissing(
                session.target_objective.clone(),
            ))
        }
        1 => {}
        n => {
            return Err(PipelineError::TargetObjectiveDuplicated {
                name: session.target_objective.clone(),
                count: n,
            })
        }
    }
    let y_workload = select_columns(&y_workload, &obj_idxs);
    let y_target = select_columns(&y_target_full, &obj_idxs);

    // Dedup each side, then drop workload rows already tried by the target
    let (x_workload, y_workload, _) =
        combine_duplicate_rows(&x_workload, &y_workload, &rowlabels_workload);
    let (x_target, y_target, _) = combine_duplicate_rows(&x_target, &y_target, &rowlabels_target);

    let target_rows: Vec<Vec<u64>> = x_target
        .rows()
        .into_iter()
        .map(|r| r.iter().map(|v| v.to_bits()).collect())
        .collect();
    let keep: Vec<usize> = x_workload
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| {
            let key: Vec<u64> = row.iter().map(|v| v.to_bits()).collect();
            !target_rows.contains(&key)
        })
        .map(|(i, _)| i)
        .collect();
    let x_workload = select_rows(&x_workload, &keep);
    let y_workload = select_rows(&y_workload, &keep);

    // Stack target first; row order matters to the seed selection downstream
    let x_matrix = vstack(&x_target, &x_workload);

    // Dummy encode enum knobs if enabled
    let (x_encoded, encoder, binary_cols, total_dummies) = if params.enable_dummy_encoder {
        let (encoder, binary_cols) = DummyEncoder::from_catalog(&x_columnlabels, &session.knobs);
        let encoded = encoder.transform(&x_matrix);
        let total = encoder.total_dummies();
        (encoded, Some(encoder), binary_cols, total)
    } else {
        (x_matrix, None, Vec::new(), 0)
    };

    let x_scaler = StandardScaler::fit(&x_encoded)?;
    let x_scaled = x_scaler.transform(&x_encoded);

    // Scale the objective. With too few target rows a target-only fit is not
    // trustworthy, so fit jointly; otherwise scale the sides separately and
    // fall back to the joint fit when either per-side fit fails. The workload
    // side can be empty here (self-combination, or every workload config
    // already tried by the target), which is one such failure.
    let y_scaled = if x_target.nrows() < 5 {
        joint_scale(&y_target, &y_workload)?
    } else {
        match separate_scale(&y_target, &y_workload) {
            Ok(scaled) => scaled,
            Err(err) => {
                warn!(%err, "per-side objective scaling failed, fitting jointly");
                joint_scale(&y_target, &y_workload)?
            }
        }
    };

    // The search minimizes, so negate metrics where larger is better
    let lessisbetter = session
        .target_metric()
        .map(|m| m.polarity == MetricPolarity::LessIsBetter)
        .unwrap_or_else(|| {
            warn!(objective = %session.target_objective, "target objective not in metric catalog, assuming more is better");
            false
        });
    let y_scaled = if lessisbetter { y_scaled } else { -y_scaled };

    // Bounds come from the catalog's declared ranges, mapped into scaled
    // space; dummy and binary columns are forced to [0, 1]
    let ncols = x_scaled.ncols();
    let mut x_min = Array1::zeros(ncols);
    let mut x_max = Array1::zeros(ncols);
    for i in 0..ncols {
        if i < total_dummies || binary_cols.contains(&i) {
            x_min[i] = 0.0;
            x_max[i] = 1.0;
            continue;
        }
        let mut col_min = x_scaled
            .column(i)
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let mut col_max = x_scaled
            .column(i)
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let label = match &encoder {
            Some(enc) => &x_columnlabels[enc.passthrough_input_index(i - total_dummies)],
            None => &x_columnlabels[i],
        };
        if let Some(knob) = session.knobs.iter().find(|k| &k.name == label) {
            col_min = x_scaler.transform_value(i, knob.minval);
            col_max = x_scaler.transform_value(i, knob.maxval);
        }
        x_min[i] = col_min;
        x_max[i] = col_max;
    }

    let repair = ConfigRepair::new(
        x_scaler.clone(),
        encoder.clone(),
        binary_cols,
        params.init_flip_prob,
        params.flip_prob_decay,
    );

    debug!(
        rows = x_scaled.nrows(),
        cols = x_scaled.ncols(),
        "combined target and workload data"
    );

    Ok(CombinedWorkload {
        columnlabels: x_columnlabels,
        x_scaler,
        x_scaled,
        y_scaled,
        x_min,
        x_max,
        encoder,
        repair,
    })
}

fn joint_scale(y_target: &Array2<f64>, y_workload: &Array2<f64>) -> Result<Array1<f64>> {
    let stacked = vstack(y_target, y_workload);
    let scaler = StandardScaler::fit(&stacked)?;
    Ok(scaler.transform(&stacked).column(0).to_owned())
}

fn separate_scale(
    y_target: &Array2<f64>,
    y_workload: &Array2<f64>,
) -> crate::preprocess::Result<Array1<f64>> {
    let target_scaler = StandardScaler::fit_strict(y_target)?;
    let workload_scaler = StandardScaler::fit(y_workload)?;
    let scaled = vstack(
        &target_scaler.transform(y_target),
        &workload_scaler.transform(y_workload),
    );
    Ok(scaled.column(0).to_owned())
}

fn select_columns(matrix: &Array2<f64>, idxs: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((matrix.nrows(), idxs.len()), |(r, c)| matrix[[r, idxs[c]]])
}

fn select_rows(matrix: &Array2<f64>, idxs: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((idxs.len(), matrix.ncols()), |(r, c)| matrix[[idxs[r], c]])
}

fn vstack(top: &Array2<f64>, bottom: &Array2<f64>) -> Array2<f64> {
    let ncols = top.ncols().max(bottom.ncols());
    let mut out = Array2::zeros((top.nrows() + bottom.nrows(), ncols));
    for (i, row) in top.rows().into_iter().enumerate() {
        out.row_mut(i).assign(&row);
    }
    for (i, row) in bottom.rows().into_iter().enumerate() {
        out.row_mut(top.nrows() + i).assign(&row);
    }
    out
}
