//! Reinforcement-learning recommendation path
//!
//! The agent observes the normalized metric vector as its state and emits a
//! normalized knob vector as its action. Training replays one transition per
//! observation with a reward shaped against the session's first and previous
//! objective values; recommendation decodes the agent's action back through
//! the catalog's knob bounds.


use std::collections::HashMap;

use ndarray::{Array1, Array2};
use tracing::{debug, info, warn};

use crate::catalog::{KnobType, KnobValue, MetricPolarity};
use crate::pipeline::{PipelineError, Result, StagePayload};
use crate::preprocess::MinMaxScaler;
use crate::store::{Observation, Recommendation, RecommendationStatus, Session, Store};
use crate::surrogate::RlAgent;

// ---------------------------------------------------------------------------
// rewards
// ---------------------------------------------------------------------------

/// Ratio of the current objective to the session's first objective, signed so
/// that larger is always better for the agent
pub fn simple_reward(current: f64, base: f64, less_is_better: bool) -> f64 {
    let ratio = current / base;
    if less_is_better {
        -ratio
    } else {
        ratio
    }
}

/// Quadratic reward shaped against both the session baseline and the previous
/// round. Improvement over the baseline earns a positive reward scaled by the
/// step taken since the previous observation; regression earns the mirrored
/// penalty.
pub fn shaped_reward(current: f64, previous: f64, base: f64, less_is_better: bool) -> f64 {
    if less_is_better {
        if current - base <= 0.0 {
            (((2.0 * base - current) / base).powi(2) - 1.0)
                * (2.0 * previous - current).abs()
                / previous
        } else {
            -((current / base).powi(2) - 1.0) * current / previous
        }
    } else if current - base > 0.0 {
        ((current / base).powi(2) - 1.0) * current / previous
    } else {
        -(((2.0 * base - current) / base).powi(2) - 1.0)
            * (2.0 * previous - current).abs()
            / previous
    }
}

// ---------------------------------------------------------------------------
// state and action encoding
// ---------------------------------------------------------------------------

fn objective_value(observation: &Observation, session: &Session) -> Result<f64> {
    observation
        .metric_values
        .get(&session.target_objective)
        .copied()
        .ok_or_else(|| PipelineError::TargetObjectiveMissing(session.target_objective.clone()))
}

fn less_is_better(session: &Session) -> bool {
    session
        .target_metric()
        .map(|m| m.polarity == MetricPolarity::LessIsBetter)
        .unwrap_or_else(|| {
            warn!(objective = %session.target_objective, "target objective not in metric catalog, assuming more is better");
            false
        })
}

/// Metric vector of one observation, normalized against itself. A single-row
/// fit degenerates to the zero vector, which keeps the state dimension stable
/// across sessions with different metric scales.
fn agent_state(observation: &Observation, session: &Session) -> Result<Array1<f64>> {
    let mut names: Vec<&str> = vec![session.target_objective.as_str()];
    names.extend(
        session
            .metric_catalog
            .iter()
            .map(|m| m.name.as_str())
            .filter(|n| *n != session.target_objective),
    );
    let raw = Array1::from_iter(
        names
            .iter()
            .map(|n| observation.metric_values.get(*n).copied().unwrap_or(0.0)),
    );
    let single = raw.clone().insert_axis(ndarray::Axis(0));
    let scaler = MinMaxScaler::fit(&single)?;
    Ok(scaler.transform_row(&raw))
}

fn knob_bounds_scaler(session: &Session) -> Result<MinMaxScaler> {
    let ncols = session.knobs.len();
    let mut bounds = Array2::zeros((2, ncols));
    for (j, knob) in session.knobs.iter().enumerate() {
        bounds[[0, j]] = knob.minval;
        bounds[[1, j]] = knob.maxval;
    }
    Ok(MinMaxScaler::fit(&bounds)?)
}

/// Knob vector of one observation in catalog order, normalized to [0, 1] by
/// the catalog's declared ranges
fn agent_action(observation: &Observation, session: &Session) -> Result<Array1<f64>> {
    let raw = Array1::from_iter(session.knobs.iter().map(|k| {
        observation
            .knob_values
            .get(&k.name)
            .copied()
            .unwrap_or_else(|| k.default_as_f64())
    }));
    Ok(knob_bounds_scaler(session)?.transform_row(&raw))
}

// ---------------------------------------------------------------------------
// training and recommendation
// ---------------------------------------------------------------------------

/// Train the session's agent on the newest observation and persist the
/// updated snapshot.
pub fn train_agent<S: Store, A: RlAgent>(
    store: &mut S,
    payload: &StagePayload,
    agent: &mut A,
) -> Result<()> {
    let newest = store.observation(payload.newest_observation_id)?;
    let mut session = store.session(newest.session_id)?;
    let params = session.hyperparameters.clone();

    let prior = store.observations_for_session_before(session.id, newest.created_at)?;
    let base = prior.first().unwrap_or(&newest);
    let prev = prior.last().unwrap_or(&newest);

    let current_obj = objective_value(&newest, &session)?;
    let base_obj = objective_value(base, &session)?;
    let prev_obj = objective_value(prev, &session)?;

    let lib = less_is_better(&session);
    let reward = if params.ddpg_simple_reward {
        simple_reward(current_obj, base_obj, lib)
    } else {
        shaped_reward(current_obj, prev_obj, base_obj, lib)
    };
    debug!(reward, current_obj, base_obj, prev_obj, "computed agent reward");

    let state = agent_state(&newest, &session)?;
    let action = agent_action(&newest, &session)?;

    if let Some(snapshot) = &session.agent_snapshot {
        agent.restore(snapshot)?;
    }
    // One-step episodes: the next state is the state itself
    agent.add_sample(&state, &action, reward, &state);
    for _ in 0..params.ddpg_update_epochs {
        agent.update()?;
    }

    session.agent_snapshot = Some(agent.snapshot()?);
    store.save_session(&session)?;
    info!(session = session.id, "trained and saved the agent");
    Ok(())
}

/// Ask the session's agent for the next configuration and persist it onto
/// the trial.
pub fn recommend_with_agent<S: Store, A: RlAgent>(
    store: &mut S,
    payload: &StagePayload,
    agent: &mut A,
) -> Result<Recommendation> {
    let newest = store.observation(payload.newest_observation_id)?;
    let session = store.session(newest.session_id)?;

    if let Some(snapshot) = &session.agent_snapshot {
        agent.restore(snapshot)?;
    }

    let state = agent_state(&newest, &session)?;
    let action = agent.choose_action(&state)?;
    if action.len() != session.knobs.len() {
        return Err(PipelineError::Invalid(format!(
            "agent action has {} entries for {} knobs",
            action.len(),
            session.knobs.len()
        )));
    }

    let raw = knob_bounds_scaler(&session)?.inverse_transform_row(&action);
    let mut config = HashMap::with_capacity(session.knobs.len());
    for (j, knob) in session.knobs.iter().enumerate() {
        let clamped = raw[j].clamp(knob.minval, knob.maxval);
        let value = match knob.vartype {
            KnobType::Bool => KnobValue::Bool(clamped >= 0.5),
            KnobType::Enum => {
                let top = knob.enumvals.len().saturating_sub(1) as f64;
                KnobValue::Int(clamped.round().clamp(0.0, top) as i64)
            }
            KnobType::Integer => KnobValue::Int(clamped.round() as i64),
            KnobType::Real => KnobValue::Real(clamped),
            KnobType::String | KnobType::Timestamp => KnobValue::Str("None".into()),
        };
        config.insert(knob.name.clone(), value);
    }

    let rec = Recommendation {
        config,
        status: RecommendationStatus::Good,
        info: "ddpg".into(),
        observation_id: payload.newest_observation_id,
        pipeline_run: payload.pipeline_run,
    };
    store.save_recommendation(&rec)?;
    Ok(rec)
}
