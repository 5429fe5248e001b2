//! Tests for pipeline description types

use super::*;

#[test]
fn test_stage_chain_for_surrogate_algorithms() {
    for algorithm in [Algorithm::Gpr, Algorithm::Dnn] {
        assert_eq!(
            stages_for(algorithm),
            &[Stage::Aggregate, Stage::MapWorkload, Stage::Recommend]
        );
    }
}

#[test]
fn test_stage_chain_for_rl_bypasses_mapping() {
    let stages = stages_for(Algorithm::Ddpg);
    assert_eq!(stages, &[Stage::TrainAgent, Stage::RecommendAgent]);
    assert!(!stages.contains(&Stage::MapWorkload));
}

#[test]
fn test_algorithm_serde_tags() {
    assert_eq!(serde_json::to_string(&Algorithm::Gpr).unwrap(), r#""GPR""#);
    assert_eq!(serde_json::to_string(&Algorithm::Dnn).unwrap(), r#""DNN""#);
    assert_eq!(serde_json::to_string(&Algorithm::Ddpg).unwrap(), r#""DDPG""#);
}

#[test]
fn test_payload_roundtrip() {
    let mut payload = StagePayload::for_observation(42);
    payload.bad = true;
    payload.knob_labels = vec!["a".into()];
    let json = serde_json::to_string(&payload).unwrap();
    let back: StagePayload = serde_json::from_str(&json).unwrap();
    assert_eq!(back.newest_observation_id, 42);
    assert!(back.bad);
    assert_eq!(back.knob_labels, vec!["a".to_string()]);
}
