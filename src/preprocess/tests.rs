//! Tests for preprocessing primitives

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2};

use super::*;
use crate::catalog::{Knob, KnobType};

fn knob(name: &str, vartype: KnobType, enumvals: Vec<&str>) -> Knob {
    Knob {
        name: name.into(),
        vartype,
        default: "0".into(),
        minval: 0.0,
        maxval: 100.0,
        enumvals: enumvals.into_iter().map(String::from).collect(),
    }
}

// ---------------------------------------------------------------------------
// StandardScaler
// ---------------------------------------------------------------------------

#[test]
fn test_standard_scaler_zero_mean_unit_variance() {
    let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
    let scaler = StandardScaler::fit(&x).unwrap();
    let scaled = scaler.transform(&x);
    for j in 0..2 {
        let mean: f64 = scaled.column(j).iter().sum::<f64>() / 3.0;
        let var: f64 = scaled.column(j).iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 3.0;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_standard_scaler_roundtrip() {
    let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
    let scaler = StandardScaler::fit(&x).unwrap();
    let row = Array1::from(vec![2.5, 17.0]);
    let back = scaler.inverse_transform_row(&scaler.transform_row(&row));
    assert_abs_diff_eq!(back[0], 2.5, epsilon = 1e-12);
    assert_abs_diff_eq!(back[1], 17.0, epsilon = 1e-12);
}

#[test]
fn test_standard_scaler_empty_fails() {
    let x = Array2::<f64>::zeros((0, 3));
    assert!(matches!(
        StandardScaler::fit(&x),
        Err(PreprocessError::EmptyMatrix)
    ));
}

#[test]
fn test_standard_scaler_constant_column_scale_one() {
    let x = array![[5.0, 1.0], [5.0, 2.0]];
    let scaler = StandardScaler::fit(&x).unwrap();
    let scaled = scaler.transform(&x);
    // constant column: mean shift only, no division blowup
    assert_abs_diff_eq!(scaled[[0, 0]], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(scaled[[1, 0]], 0.0, epsilon = 1e-12);
}

#[test]
fn test_standard_scaler_strict_rejects_zero_variance() {
    let x = array![[5.0, 1.0], [5.0, 2.0]];
    assert!(matches!(
        StandardScaler::fit_strict(&x),
        Err(PreprocessError::ZeroVariance(0))
    ));
}

// ---------------------------------------------------------------------------
// MinMaxScaler
// ---------------------------------------------------------------------------

#[test]
fn test_minmax_from_bounds_matrix() {
    // fit on a (min, max) bounds matrix, the knob-normalization pattern
    let bounds = array![[0.0, 100.0], [10.0, 200.0]];
    let scaler = MinMaxScaler::fit(&bounds).unwrap();
    let row = Array1::from(vec![5.0, 150.0]);
    let norm = scaler.transform_row(&row);
    assert_abs_diff_eq!(norm[0], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(norm[1], 0.5, epsilon = 1e-12);
    let back = scaler.inverse_transform_row(&norm);
    assert_abs_diff_eq!(back[0], 5.0, epsilon = 1e-12);
    assert_abs_diff_eq!(back[1], 150.0, epsilon = 1e-12);
}

#[test]
fn test_minmax_degenerate_column_maps_to_zero() {
    let x = array![[3.0], [3.0]];
    let scaler = MinMaxScaler::fit(&x).unwrap();
    let norm = scaler.transform_row(&Array1::from(vec![3.0]));
    assert_abs_diff_eq!(norm[0], 0.0, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// DecileBinner
// ---------------------------------------------------------------------------

#[test]
fn test_decile_binner_uniform_column() {
    let x = Array2::from_shape_vec((10, 1), (1..=10).map(f64::from).collect()).unwrap();
    let binner = DecileBinner::fit(&x, 1.0).unwrap();
    let binned = binner.transform(&x);
    // 10 equally-spaced values land in 10 distinct bins, labeled from 1
    let labels: Vec<f64> = binned.column(0).to_vec();
    assert_eq!(labels[0], 1.0);
    assert_eq!(labels[9], 10.0);
    for w in labels.windows(2) {
        assert!(w[1] >= w[0]);
    }
}

#[test]
fn test_decile_binner_out_of_range_values_clamp_to_extremes() {
    let x = Array2::from_shape_vec((10, 1), (1..=10).map(f64::from).collect()).unwrap();
    let binner = DecileBinner::fit(&x, 1.0).unwrap();
    let probe = array![[-100.0], [100.0]];
    let binned = binner.transform(&probe);
    assert_eq!(binned[[0, 0]], 1.0);
    assert_eq!(binned[[1, 0]], 10.0);
}

// ---------------------------------------------------------------------------
// DummyEncoder
// ---------------------------------------------------------------------------

fn encoder_fixture() -> (DummyEncoder, Vec<usize>, Vec<String>) {
    let labels: Vec<String> = vec!["sync_mode".into(), "fsync".into(), "work_mem".into()];
    let knobs = vec![
        knob("sync_mode", KnobType::Enum, vec!["off", "local", "remote"]),
        knob("fsync", KnobType::Bool, vec![]),
        knob("work_mem", KnobType::Integer, vec![]),
    ];
    let (enc, binary) = DummyEncoder::from_catalog(&labels, &knobs);
    (enc, binary, labels)
}

#[test]
fn test_dummy_encoder_layout() {
    let (enc, binary, _) = encoder_fixture();
    assert_eq!(enc.total_dummies(), 3);
    assert_eq!(enc.n_output(), 5);
    assert!(!enc.is_identity());
    // fsync is the first passthrough column, right after the dummies
    assert_eq!(binary, vec![3]);
}

#[test]
fn test_dummy_encoder_transform_one_hot() {
    let (enc, _, _) = encoder_fixture();
    let x = array![[1.0, 1.0, 64.0], [2.0, 0.0, 128.0]];
    let encoded = enc.transform(&x);
    assert_eq!(encoded.row(0).to_vec(), vec![0.0, 1.0, 0.0, 1.0, 64.0]);
    assert_eq!(encoded.row(1).to_vec(), vec![0.0, 0.0, 1.0, 0.0, 128.0]);
}

#[test]
fn test_dummy_encoder_inverse_roundtrip() {
    let (enc, _, _) = encoder_fixture();
    let x = array![[2.0, 1.0, 64.0]];
    let encoded = enc.transform(&x);
    let back = enc.inverse_row(&encoded.row(0).to_owned());
    assert_eq!(back.to_vec(), vec![2.0, 1.0, 64.0]);
}

// ---------------------------------------------------------------------------
// combine_duplicate_rows
// ---------------------------------------------------------------------------

#[test]
fn test_combine_duplicate_rows_keeps_first_seen() {
    let x = array![[1.0, 2.0], [3.0, 4.0], [1.0, 2.0]];
    let y = array![[10.0], [20.0], [30.0]];
    let (xd, yd, labels) = combine_duplicate_rows(&x, &y, &[7, 8, 9]);
    assert_eq!(xd.nrows(), 2);
    assert_eq!(yd.column(0).to_vec(), vec![10.0, 20.0]);
    assert_eq!(labels, vec![7, 8]);
}

#[test]
fn test_combine_duplicate_rows_no_dups_is_identity() {
    let x = array![[1.0], [2.0]];
    let y = array![[10.0], [20.0]];
    let (xd, yd, labels) = combine_duplicate_rows(&x, &y, &[1, 2]);
    assert_eq!(xd, x);
    assert_eq!(yd, y);
    assert_eq!(labels, vec![1, 2]);
}

// ---------------------------------------------------------------------------
// ConfigRepair
// ---------------------------------------------------------------------------

#[test]
fn test_config_repair_snaps_one_hot_and_binary() {
    let (enc, binary, _) = encoder_fixture();
    let raw = array![
        [1.0, 0.0, 0.0, 1.0, 64.0],
        [0.0, 1.0, 0.0, 0.0, 128.0],
        [0.0, 0.0, 1.0, 1.0, 256.0]
    ];
    let scaler = StandardScaler::fit(&raw).unwrap();
    let repair = ConfigRepair::new(scaler.clone(), Some(enc), binary, 0.3, 0.5);

    // A drifted candidate: no exclusive one-hot, binary off the grid
    let drifted_raw = Array1::from(vec![0.2, 0.9, 0.4, 0.7, 100.0]);
    let repaired_scaled = repair.repair(&scaler.transform_row(&drifted_raw));
    let repaired = scaler.inverse_transform_row(&repaired_scaled);

    assert_eq!(repaired[0], 0.0);
    assert_eq!(repaired[1], 1.0);
    assert_eq!(repaired[2], 0.0);
    assert_eq!(repaired[3], 1.0);
    assert_abs_diff_eq!(repaired[4], 100.0, epsilon = 1e-9);
}

#[test]
fn test_config_repair_flip_probability_decays() {
    let scaler = StandardScaler::fit(&array![[0.0], [1.0]]).unwrap();
    let repair = ConfigRepair::new(scaler, None, vec![], 0.3, 0.5);
    assert_abs_diff_eq!(repair.flip_probability(0), 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(repair.flip_probability(2), 0.075, epsilon = 1e-12);
}
