//! Pure statistics over window snapshots.
//!
//! All functions are total: degenerate inputs (empty window, zero variance,
//! fewer than two points) yield 0.0 by convention rather than an error, so
//! callers never branch on failure.

/// Arithmetic mean of all values currently in the window. Empty window yields 0.0.
pub fn moving_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population z-score of `value` against the window.
///
/// Uses the population standard deviation (sum of squared deviations divided
/// by `n`, not `n - 1`). An empty window or zero standard deviation yields
/// 0.0 — a "no signal" convention that also guards the division.
pub fn z_score(value: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = moving_average(values);
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }
    (value - mean) / std_dev
}

/// Ordinary-least-squares slope of value vs. 1-based position index.
///
/// Closed form `(n·Σxy − Σx·Σy) / (n·Σx² − (Σx)²)` with `x = 1..n`.
/// Fewer than two points yields 0.0.
pub fn trend_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (i, v) in values.iter().enumerate() {
        let x = (i + 1) as f64;
        sum_x += x;
        sum_y += v;
        sum_xy += x * v;
        sum_xx += x * x;
    }

    let nf = n as f64;
    (nf * sum_xy - sum_x * sum_y) / (nf * sum_xx - sum_x * sum_x)
}
