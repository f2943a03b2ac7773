//! Shift-profile comparison helpers.
//!
//! Public so workspace test suites and the CLI can score recovered motion
//! against ground truth; not intended as a general statistics toolkit.

use crate::math::{Real, Shift};

/// Pearson correlation coefficient between two equally long sequences.
///
/// Returns `None` when the sequences are shorter than two samples, have
/// mismatched lengths, or either side has zero variance (the coefficient is
/// undefined for a constant profile).
pub fn pearson(a: &[Real], b: &[Real]) -> Option<Real> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let n = a.len() as Real;
    let mean_a = a.iter().sum::<Real>() / n;
    let mean_b = b.iter().sum::<Real>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}

/// Split a shift sequence into `(dy, dx)` component profiles.
pub fn shift_components(shifts: &[Shift]) -> (Vec<Real>, Vec<Real>) {
    (
        shifts.iter().map(|s| s.dy).collect(),
        shifts.iter().map(|s| s.dx).collect(),
    )
}

/// Largest absolute deviation of a profile from its mean.
///
/// Useful for asserting that a motionless axis stays flat without resorting
/// to a correlation that is undefined for constant truth.
pub fn max_abs_deviation_from_mean(values: &[Real]) -> Real {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<Real>() / values.len() as Real;
    values
        .iter()
        .map(|v| (v - mean).abs())
        .fold(0.0, Real::max)
}
