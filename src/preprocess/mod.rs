//! Preprocessing primitives for the recommendation pipeline
//!
//! Scalers, the equal-frequency decile binner, the one-hot encoder for enum
//! knobs, duplicate-row combination, and the feasibility repair helper handed
//! to the surrogate optimizer. All matrix work is `ndarray`-based.

#[cfg(test)]
mod tests;

use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

use crate::catalog::{Knob, KnobType};

/// Errors from preprocessing operations
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Cannot fit on an empty matrix")]
    EmptyMatrix,

    #[error("Zero variance in column {0}")]
    ZeroVariance(usize),

    #[error("Dimension mismatch: expected {expected} columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result alias for preprocessing operations
pub type Result<T> = std::result::Result<T, PreprocessError>;

// ---------------------------------------------------------------------------
// StandardScaler
// ---------------------------------------------------------------------------

/// Per-column zero-mean / unit-variance scaler
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit the scaler on a matrix. Zero-variance columns get scale 1 so that
    /// transforming them is a pure mean shift.
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PreprocessError::EmptyMatrix);
        }
        let mean = x.mean_axis(Axis(0)).ok_or(PreprocessError::EmptyMatrix)?;
        let n = x.nrows() as f64;
        let scale = Array1::from_iter((0..x.ncols()).map(|j| {
            let m = mean[j];
            let var = x.column(j).iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            if std > 0.0 {
                std
            } else {
                1.0
            }
        }));
        Ok(Self { mean, scale })
    }

    /// Fit, but fail on any zero-variance column. Used where a degenerate fit
    /// must fall back to a jointly-fitted scaler instead.
    pub fn fit_strict(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PreprocessError::EmptyMatrix);
        }
        let mean = x.mean_axis(Axis(0)).ok_or(PreprocessError::EmptyMatrix)?;
        let n = x.nrows() as f64;
        let mut scale = Array1::zeros(x.ncols());
        for j in 0..x.ncols() {
            let m = mean[j];
            let var = x.column(j).iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            if var <= 0.0 {
                return Err(PreprocessError::ZeroVariance(j));
            }
            scale[j] = var.sqrt();
        }
        Ok(Self { mean, scale })
    }

    /// Number of fitted columns
    pub fn ncols(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.rows_mut() {
            for j in 0..row.len() {
                row[j] = (row[j] - self.mean[j]) / self.scale[j];
            }
        }
        out
    }

    pub fn transform_row(&self, row: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            row.iter()
                .enumerate()
                .map(|(j, v)| (v - self.mean[j]) / self.scale[j]),
        )
    }

    pub fn inverse_transform_row(&self, row: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            row.iter()
                .enumerate()
                .map(|(j, v)| v * self.scale[j] + self.mean[j]),
        )
    }

    /// Scaled value of `raw` in column `col`
    pub fn transform_value(&self, col: usize, raw: f64) -> f64 {
        (raw - self.mean[col]) / self.scale[col]
    }
}

// ---------------------------------------------------------------------------
// MinMaxScaler
// ---------------------------------------------------------------------------

/// Per-column [0, 1] normalizer
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    range: Array1<f64>,
}

impl MinMaxScaler {
    /// Fit on a matrix whose rows span the value range. For knob data the
    /// caller fits on a two-row (min, max) bounds matrix.
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PreprocessError::EmptyMatrix);
        }
        let mut min = Array1::from_elem(x.ncols(), f64::INFINITY);
        let mut max = Array1::from_elem(x.ncols(), f64::NEG_INFINITY);
        for row in x.rows() {
            for j in 0..row.len() {
                min[j] = min[j].min(row[j]);
                max[j] = max[j].max(row[j]);
            }
        }
        let range = Array1::from_iter((0..x.ncols()).map(|j| {
            let r = max[j] - min[j];
            if r > 0.0 {
                r
            } else {
                1.0
            }
        }));
        Ok(Self { min, range })
    }

    pub fn transform_row(&self, row: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            row.iter()
                .enumerate()
                .map(|(j, v)| (v - self.min[j]) / self.range[j]),
        )
    }

    pub fn inverse_transform_row(&self, row: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            row.iter()
                .enumerate()
                .map(|(j, v)| v * self.range[j] + self.min[j]),
        )
    }
}

// ---------------------------------------------------------------------------
// DecileBinner
// ---------------------------------------------------------------------------

/// Ten equal-frequency bins per column, labels starting at `bin_start`.
///
/// Fit computes the nine interior decile edges of each column by linear
/// interpolation; transform maps a value to the count of edges at or below
/// it, offset by `bin_start`.
#[derive(Debug, Clone)]
pub struct DecileBinner {
    /// edges[col] holds the 9 interior decile boundaries for that column
    edges: Vec<Vec<f64>>,
    bin_start: f64,
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}

impl DecileBinner {
    pub fn fit(x: &Array2<f64>, bin_start: f64) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PreprocessError::EmptyMatrix);
        }
        let mut edges = Vec::with_capacity(x.ncols());
        for col in x.columns() {
            let mut sorted: Vec<f64> = col.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            edges.push((1..10).map(|d| percentile(&sorted, d as f64 * 10.0)).collect());
        }
        Ok(Self { edges, bin_start })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.rows_mut() {
            for j in 0..row.len() {
                let count = self.edges[j].iter().filter(|&&e| row[j] >= e).count();
                row[j] = count as f64 + self.bin_start;
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// DummyEncoder
// ---------------------------------------------------------------------------

/// One-hot encoder for enum knob columns.
///
/// Encoded output layout places every one-hot block first (in catalog column
/// order of the enum knobs), followed by the remaining columns in their
/// original relative order. This matches the bound-setting convention that
/// treats the leading `total_dummies()` columns as [0, 1].
#[derive(Debug, Clone)]
pub struct DummyEncoder {
    /// Cardinality per categorical input column
    n_values: Vec<usize>,
    /// Input column indices of the categorical features
    cat_idxs: Vec<usize>,
    /// Input column indices of the passthrough features
    noncat_idxs: Vec<usize>,
    /// Total input width
    n_input: usize,
}

impl DummyEncoder {
    /// Derive the encoder and the set of binary (bool knob) output columns
    /// from the column labels and the session's knob catalog.
    pub fn from_catalog(labels: &[String], knobs: &[Knob]) -> (Self, Vec<usize>) {
        let mut n_values = Vec::new();
        let mut cat_idxs = Vec::new();
        let mut noncat_idxs = Vec::new();
        let mut bool_positions = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            match knobs.iter().find(|k| &k.name == label) {
                Some(k) if k.vartype == KnobType::Enum => {
                    n_values.push(k.enumvals.len());
                    cat_idxs.push(i);
                }
                Some(k) if k.vartype == KnobType::Bool => {
                    // Bool knobs pass through; remember the passthrough slot
                    bool_positions.push(noncat_idxs.len());
                    noncat_idxs.push(i);
                }
                _ => noncat_idxs.push(i),
            }
        }
        let encoder = Self {
            n_values,
            cat_idxs,
            noncat_idxs,
            n_input: labels.len(),
        };
        let binary_cols = bool_positions
            .iter()
            .map(|pos| encoder.total_dummies() + pos)
            .collect();
        (encoder, binary_cols)
    }

    /// Total width of the one-hot blocks
    pub fn total_dummies(&self) -> usize {
        self.n_values.iter().sum()
    }

    /// Encoded output width
    pub fn n_output(&self) -> usize {
        self.total_dummies() + self.noncat_idxs.len()
    }

    /// Whether any column actually gets encoded
    pub fn is_identity(&self) -> bool {
        self.cat_idxs.is_empty()
    }

    /// Original input column index of passthrough output position `p`
    pub fn passthrough_input_index(&self, p: usize) -> usize {
        self.noncat_idxs[p]
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.n_output()));
        for (r, row) in x.rows().into_iter().enumerate() {
            let mut offset = 0;
            for (f, &col) in self.cat_idxs.iter().enumerate() {
                let card = self.n_values[f];
                let idx = (row[col].round() as usize).min(card.saturating_sub(1));
                out[[r, offset + idx]] = 1.0;
                offset += card;
            }
            for (p, &col) in self.noncat_idxs.iter().enumerate() {
                out[[r, self.total_dummies() + p]] = row[col];
            }
        }
        out
    }

    /// Collapse an encoded row back to the original column layout. Each
    /// one-hot block decodes to the argmax index.
    pub fn inverse_row(&self, row: &Array1<f64>) -> Array1<f64> {
        let mut out = Array1::zeros(self.n_input);
        let mut offset = 0;
        for (f, &col) in self.cat_idxs.iter().enumerate() {
            let card = self.n_values[f];
            let argmax = (0..card)
                .max_by(|&a, &b| {
                    row[offset + a]
                        .partial_cmp(&row[offset + b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(0);
            out[col] = argmax as f64;
            offset += card;
        }
        for (p, &col) in self.noncat_idxs.iter().enumerate() {
            out[col] = row[self.total_dummies() + p];
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Duplicate-row combination
// ---------------------------------------------------------------------------

/// Combine rows with identical knob settings.
///
/// Deterministic rule: the first-seen row wins; its metric values and row
/// label are kept, later duplicates are dropped. Row order is preserved.
pub fn combine_duplicate_rows(
    x: &Array2<f64>,
    y: &Array2<f64>,
    rowlabels: &[u64],
) -> (Array2<f64>, Array2<f64>, Vec<u64>) {
    let mut seen: Vec<Vec<u64>> = Vec::new();
    let mut keep: Vec<usize> = Vec::new();
    for (i, row) in x.rows().into_iter().enumerate() {
        let key: Vec<u64> = row.iter().map(|v| v.to_bits()).collect();
        if !seen.contains(&key) {
            seen.push(key);
            keep.push(i);
        }
    }
    let x_out = Array2::from_shape_fn((keep.len(), x.ncols()), |(r, c)| x[[keep[r], c]]);
    let y_out = Array2::from_shape_fn((keep.len(), y.ncols()), |(r, c)| y[[keep[r], c]]);
    let labels_out = keep.iter().map(|&i| rowlabels[i]).collect();
    (x_out, y_out, labels_out)
}

// ---------------------------------------------------------------------------
// ConfigRepair
// ---------------------------------------------------------------------------

/// Feasibility repair for scaled candidate configurations.
///
/// The surrogate optimizer works in scaled, possibly one-hot-encoded space
/// and can drift off the feasible manifold. Repair unscales a candidate,
/// snaps every one-hot block to an exclusive encoding, rounds binary columns
/// to {0, 1}, and rescales.
#[derive(Debug, Clone)]
pub struct ConfigRepair {
    scaler: StandardScaler,
    encoder: Option<DummyEncoder>,
    binary_cols: Vec<usize>,
    init_flip_prob: f64,
    flip_prob_decay: f64,
}

impl ConfigRepair {
    pub fn new(
        scaler: StandardScaler,
        encoder: Option<DummyEncoder>,
        binary_cols: Vec<usize>,
        init_flip_prob: f64,
        flip_prob_decay: f64,
    ) -> Self {
        Self {
            scaler,
            encoder,
            binary_cols,
            init_flip_prob,
            flip_prob_decay,
        }
    }

    /// Binary flip probability after `iteration` repair rounds
    pub fn flip_probability(&self, iteration: u32) -> f64 {
        self.init_flip_prob * self.flip_prob_decay.powi(iteration as i32)
    }

    pub fn repair(&self, scaled: &Array1<f64>) -> Array1<f64> {
        let mut raw = self.scaler.inverse_transform_row(scaled);
        if let Some(encoder) = &self.encoder {
            let mut offset = 0;
            for &card in &encoder.n_values {
                let argmax = (0..card)
                    .max_by(|&a, &b| {
                        raw[offset + a]
                            .partial_cmp(&raw[offset + b])
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                for j in 0..card {
                    raw[offset + j] = if j == argmax { 1.0 } else { 0.0 };
                }
                offset += card;
            }
        }
        for &col in &self.binary_cols {
            raw[col] = if raw[col] >= 0.5 { 1.0 } else { 0.0 };
        }
        self.scaler.transform_row(&raw)
    }
}
