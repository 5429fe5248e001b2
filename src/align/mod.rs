//! Data alignment
//!
//! Canonicalizes knob and metric matrices to a session's declared schema.
//! Every downstream stage assumes knob columns are in catalog order and that
//! the first metric column is the session's target objective; alignment is
//! what makes those invariants hold.


use ndarray::Array2;
use tracing::{debug, info};

use crate::store::Session;

/// Align a knob matrix to the session's knob catalog.
///
/// For each catalog knob present in `labels` the column is copied; missing
/// knobs get a column filled with the catalog default converted per type
/// (enum to index, bool to truthy parse, numeric to float; a conversion
/// failure substitutes 0 and logs, it never raises). Columns not in the
/// catalog are dropped.
///
/// Postcondition: the output label sequence equals the catalog order exactly.
/// A violation is an internal-consistency fault and asserts.
pub fn align_knobs(
    matrix: &Array2<f64>,
    labels: &[String],
    session: &Session,
) -> (Array2<f64>, Vec<String>) {
    let catalog: Vec<&str> = session.knobs.iter().map(|k| k.name.as_str()).collect();
    if catalog.len() == labels.len() && catalog.iter().zip(labels).all(|(c, l)| *c == l) {
        // Nothing to do
        return (matrix.clone(), labels.to_vec());
    }

    info!(
        catalog = catalog.len(),
        input = labels.len(),
        missing = catalog.iter().filter(|c| !labels.iter().any(|l| l == *c)).count(),
        extra = labels.iter().filter(|l| !catalog.contains(&l.as_str())).count(),
        "aligning knob matrix to session catalog"
    );

    let nrows = matrix.nrows();
    let mut new_labels = Vec::with_capacity(session.knobs.len());
    let mut aligned = Array2::zeros((nrows, session.knobs.len()));
    for (j, knob) in session.knobs.iter().enumerate() {
        match labels.iter().position(|l| l == &knob.name) {
            Some(idx) => {
                aligned.column_mut(j).assign(&matrix.column(idx));
            }
            None => {
                let default = knob.default_as_f64();
                aligned.column_mut(j).fill(default);
            }
        }
        new_labels.push(knob.name.clone());
    }
    debug!(rows = nrows, cols = new_labels.len(), "aligned knob matrix");

    assert_eq!(
        new_labels,
        catalog.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        "aligned knob labels must equal the session catalog order"
    );
    assert_eq!(
        aligned.dim(),
        (nrows, catalog.len()),
        "aligned knob matrix has unexpected shape"
    );

    (aligned, new_labels)
}

/// Align a metric matrix to [target objective] followed by the DBMS metric
/// catalog order. Missing columns default to 0. Always succeeds.
pub fn align_metrics(
    matrix: &Array2<f64>,
    labels: &[String],
    session: &Session,
) -> (Array2<f64>, Vec<String>) {
    let mut metric_cat = vec![session.target_objective.clone()];
    for m in &session.metric_catalog {
        metric_cat.push(m.name.clone());
    }

    let missing = metric_cat.iter().filter(|m| !labels.contains(m)).count();
    let unused = labels.iter().filter(|l| !metric_cat.contains(l)).count();
    debug!(missing, unused, "aligning metric matrix to catalog");

    let mut aligned = Array2::zeros((matrix.nrows(), metric_cat.len()));
    for (j, name) in metric_cat.iter().enumerate() {
        if let Some(idx) = labels.iter().position(|l| l == name) {
            aligned.column_mut(j).assign(&matrix.column(idx));
        }
    }
    (aligned, metric_cat)
}
