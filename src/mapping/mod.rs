//! Workload mapping
//!
//! Scores every historical workload sharing the target's execution
//! environment by how well a surrogate trained on that workload predicts the
//! target's observed metrics, then selects the best match. Predictions and
//! actuals are compared in decile-binned space, which is robust to scale.
//!
//! The ranked-knob and pruned-metric sets from the first workload encountered
//! are applied uniformly to all candidates and to the target. This is an
//! intentional global approximation carried over from the offline analysis
//! design, not a per-workload ranking.


use std::collections::HashMap;

use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::align::align_knobs;
use crate::pipeline::{MappedWorkload, PipelineError, Result, StagePayload};
use crate::preprocess::{combine_duplicate_rows, DecileBinner, StandardScaler};
use crate::store::{MatrixPayload, PipelineTaskType, Store, WorkloadId};
use crate::surrogate::MetricRegressor;

struct CandidateData {
    id: WorkloadId,
    x: Array2<f64>,
    y: Array2<f64>,
}

fn select_columns(matrix: &Array2<f64>, idxs: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((matrix.nrows(), idxs.len()), |(r, c)| matrix[[r, idxs[c]]])
}

pub(crate) fn matrix_artifact<S: Store>(
    store: &S,
    run: u64,
    workload: WorkloadId,
    task: PipelineTaskType,
) -> Result<MatrixPayload> {
    let artifact = store.pipeline_data(run, workload, task)?;
    artifact
        .as_matrix()
        .cloned()
        .ok_or_else(|| PipelineError::Invalid(format!("pipeline cache for {task:?} is not a matrix")))
}

pub(crate) fn names_artifact<S: Store>(
    store: &S,
    run: u64,
    workload: WorkloadId,
    task: PipelineTaskType,
) -> Result<Vec<String>> {
    let artifact = store.pipeline_data(run, workload, task)?;
    artifact
        .as_names()
        .map(<[String]>::to_vec)
        .ok_or_else(|| PipelineError::Invalid(format!("pipeline cache for {task:?} is not a name list")))
}

/// Map the target to its most similar historical workload.
///
/// The regressor factory yields one fresh [`MetricRegressor`] per
/// (workload, metric column) pair. On a cold-start round the stage is a
/// pass-through. If no candidate workload has usable cached data the payload
/// is returned with no mapping and the combiner falls back to
/// self-combination.
pub fn map_workload<S, M, F>(
    store: &mut S,
    mut payload: StagePayload,
    mut make_regressor: F,
) -> Result<StagePayload>
where
    S: Store,
    M: MetricRegressor,
    F: FnMut() -> M,
{
    if payload.bad {
        payload.pipeline_run = None;
        debug!("cold-start round, skipping workload mapping");
        return Ok(payload);
    }

    let run = store
        .latest_pipeline_run()?
        .ok_or_else(|| PipelineError::Invalid("no completed pipeline run".into()))?;
    payload.pipeline_run = Some(run);

    let newest = store.observation(payload.newest_observation_id)?;
    let session = store.session(newest.session_id)?;
    let target_workload = store.workload(newest.workload_id)?;

    let x_columnlabels = payload.knob_labels.clone();
    let y_columnlabels = payload.metric_labels.clone();

    let candidates = store.pipeline_workloads(
        run,
        &target_workload.dbms,
        &target_workload.hardware,
        &target_workload.project,
    )?;

    // Ranked knobs and pruned metrics come from the first workload processed
    // and are applied globally.
    let mut initialized = false;
    let mut ranked_knob_idxs: Vec<usize> = Vec::new();
    let mut pruned_metric_idxs: Vec<usize> = Vec::new();

    let mut workload_data: Vec<CandidateData> = Vec::new();
    for candidate in candidates {
        if store.observations_for_workload(candidate)?.is_empty() {
            store.delete_workload(candidate)?;
            debug!(workload = candidate, "deleted workload with no results");
            continue;
        }

        let knob_data = matrix_artifact(store, run, candidate, PipelineTaskType::KnobData)?;
        let raw_x = to_array(&knob_data.data, knob_data.columnlabels.len());
        let (x_matrix, _) = align_knobs(&raw_x, &knob_data.columnlabels, &session);
        let metric_data = matrix_artifact(store, run, candidate, PipelineTaskType::MetricData)?;
        let y_matrix = to_array(&metric_data.data, metric_data.columnlabels.len());
        let rowlabels = knob_data.rowlabels.clone();
        assert_eq!(
            rowlabels, metric_data.rowlabels,
            "knob and metric caches disagree on row labels"
        );

        if !initialized {
            let ranked: Vec<String> =
                names_artifact(store, run, candidate, PipelineTaskType::RankedKnobs)?
                    .into_iter()
                    .take(session.hyperparameters.important_knob_number)
                    .collect();
            let pruned = names_artifact(store, run, candidate, PipelineTaskType::PrunedMetrics)?;
            ranked_knob_idxs = (0..x_matrix.ncols())
                .filter(|&i| ranked.contains(&x_columnlabels[i]))
                .collect();
            pruned_metric_idxs = (0..y_matrix.ncols())
                .filter(|&i| pruned.contains(&y_columnlabels[i]))
                .collect();
            initialized = true;
        }

        let x_matrix = select_columns(&x_matrix, &ranked_knob_idxs);
        let y_matrix = select_columns(&y_matrix, &pruned_metric_idxs);
        let (x_matrix, y_matrix, _) = combine_duplicate_rows(&x_matrix, &y_matrix, &rowlabels);
        workload_data.push(CandidateData {
            id: candidate,
            x: x_matrix,
            y: y_matrix,
        });
    }

    if workload_data.is_empty() {
        payload.mapped_workload = None;
        payload.scores = None;
        debug!("no parsed workloads available, skipping workload mapping");
        return Ok(payload);
    }

    // Fit shared transforms over all candidates' stacked data
    let stacked_x = stack_rows(workload_data.iter().map(|w| &w.x));
    let stacked_y = stack_rows(workload_data.iter().map(|w| &w.y));
    let x_scaler = StandardScaler::fit(&stacked_x)?;
    let y_scaler = StandardScaler::fit(&stacked_y)?;
    // Deciles are computed over the scaled stack, the same space the
    // predictions land in
    let y_binner = DecileBinner::fit(&y_scaler.transform(&stacked_y), 1.0)?;

    // Standardize and decile-bin the target's own observations
    let x_target = x_scaler.transform(&select_columns(&payload.knob_matrix, &ranked_knob_idxs));
    let y_target_scaled =
        y_scaler.transform(&select_columns(&payload.metric_matrix, &pruned_metric_idxs));
    let y_target = y_binner.transform(&y_target_scaled);

    let mut scores: HashMap<WorkloadId, (String, f64)> = HashMap::new();
    let mut best: Option<MappedWorkload> = None;
    for entry in &workload_data {
        let x_scaled = x_scaler.transform(&entry.x);
        let y_scaled = y_scaler.transform(&entry.y);

        let mut predictions = Array2::zeros(y_target.dim());
        for j in 0..y_scaled.ncols() {
            let mut model = make_regressor();
            model.fit(&x_scaled, &y_scaled.column(j).to_owned())?;
            let preds = model.predict(&x_target)?;
            predictions.column_mut(j).assign(&preds);
        }
        let predictions = y_binner.transform(&predictions);

        let dists = Array1::from_iter(
            predictions
                .rows()
                .into_iter()
                .zip(y_target.rows())
                .map(|(p, a)| {
                    p.iter()
                        .zip(a.iter())
                        .map(|(x, y)| (x - y).powi(2))
                        .sum::<f64>()
                        .sqrt()
                }),
        );
        let score = dists.sum() / dists.len() as f64;

        let name = store.workload(entry.id)?.name;
        scores.insert(entry.id, (name.clone(), score));
        // Strict < keeps the first-seen workload on ties
        if best.as_ref().is_none_or(|b| score < b.score) {
            best = Some(MappedWorkload {
                id: entry.id,
                name,
                score,
            });
        }
    }

    info!(
        mapped = best.as_ref().map(|b| b.id),
        score = best.as_ref().map(|b| b.score),
        "finished mapping the workload"
    );
    payload.mapped_workload = best;
    payload.scores = Some(scores);
    Ok(payload)
}

pub(crate) fn to_array(rows: &[Vec<f64>], ncols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), ncols), |(r, c)| rows[r][c])
}

fn stack_rows<'a, I: Iterator<Item = &'a Array2<f64>>>(matrices: I) -> Array2<f64> {
    let collected: Vec<&Array2<f64>> = matrices.collect();
    let ncols = collected.first().map_or(0, |m| m.ncols());
    let nrows = collected.iter().map(|m| m.nrows()).sum();
    let mut out = Array2::zeros((nrows, ncols));
    let mut offset = 0;
    for m in collected {
        for row in m.rows() {
            out.row_mut(offset).assign(&row);
            offset += 1;
        }
    }
    out
}
