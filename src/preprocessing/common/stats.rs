//! Statistics over the valid (non-nodata) cells of a band.

use ndarray::Array2;

/// Returns true when `value` marks a missing cell.
///
/// NaN is always treated as missing, whatever the declared sentinel is.
#[inline]
pub fn is_missing(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    matches!(nodata, Some(sentinel) if sentinel == value)
}

pub fn valid_values(band: &Array2<f64>, nodata: Option<f64>) -> Vec<f64> {
    band.iter()
        .copied()
        .filter(|&v| !is_missing(v, nodata))
        .collect()
}

pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (ddof = 0).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Quantile taken as the order statistic nearest to rank `p * (n - 1)`.
///
/// `sorted` must be ascending. The result is always one of the input values.
pub fn nearest_rank_quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    Some(sorted[rank.min(sorted.len() - 1)])
}
