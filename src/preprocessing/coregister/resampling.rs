use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::preprocessing::common::stats::is_missing;
use crate::preprocessing::grid::ElementType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    /// Value of the source cell containing the sample point. Never invents values,
    /// so it is the method for class data.
    Nearest,
    /// Linear interpolation between the 4 surrounding cell centres.
    Bilinear,
    /// Mitchell-Netravali cubic over the surrounding 4x4 cell centres. Falls back to
    /// bilinear when any of those cells is missing, since the kernel has negative lobes.
    #[serde(alias = "bicubic")]
    Cubic,
}

impl ResamplingMethod {
    /// Nearest for integer data, bilinear for floating point data.
    pub fn default_for(dtype: ElementType) -> Self {
        if dtype.is_integer() {
            ResamplingMethod::Nearest
        } else {
            ResamplingMethod::Bilinear
        }
    }

    /// Samples `band` at fractional pixel position `(px, py)`, where cell `(r, c)`
    /// spans `[c, c + 1) x [r, r + 1)`. Missing neighbours are left out and the
    /// remaining weights renormalized; `NaN` when nothing valid contributes.
    pub fn sample(self, band: &Array2<f64>, nodata: Option<f64>, px: f64, py: f64) -> f64 {
        let (rows, cols) = band.dim();
        if rows == 0 || cols == 0 {
            return f64::NAN;
        }
        let value_at = |row: isize, col: isize| -> Option<f64> {
            let row = row.clamp(0, rows as isize - 1) as usize;
            let col = col.clamp(0, cols as isize - 1) as usize;
            let value = band[[row, col]];
            (!is_missing(value, nodata)).then_some(value)
        };

        match self {
            ResamplingMethod::Nearest => {
                value_at(py.floor() as isize, px.floor() as isize).unwrap_or(f64::NAN)
            }
            ResamplingMethod::Bilinear => {
                // Interpolate between cell centres
                let (sx, sy) = (px - 0.5, py - 0.5);
                let (x0, y0) = (sx.floor(), sy.floor());
                let (fx, fy) = (sx - x0, sy - y0);
                let (x0, y0) = (x0 as isize, y0 as isize);
                let taps = [
                    (y0, x0, (1.0 - fx) * (1.0 - fy)),
                    (y0, x0 + 1, fx * (1.0 - fy)),
                    (y0 + 1, x0, (1.0 - fx) * fy),
                    (y0 + 1, x0 + 1, fx * fy),
                ];
                weighted(taps.into_iter(), value_at)
            }
            ResamplingMethod::Cubic => {
                let (sx, sy) = (px - 0.5, py - 0.5);
                let (x0, y0) = (sx.floor(), sy.floor());
                let (fx, fy) = (sx - x0, sy - y0);
                let (x0, y0) = (x0 as isize, y0 as isize);
                let taps = || {
                    (-1..=2isize).flat_map(move |j| {
                        let wy = cubic_weight(j as f64 - fy);
                        (-1..=2isize)
                            .map(move |i| (y0 + j, x0 + i, wy * cubic_weight(i as f64 - fx)))
                    })
                };
                if taps().any(|(row, col, weight)| weight != 0.0 && value_at(row, col).is_none()) {
                    return ResamplingMethod::Bilinear.sample(band, nodata, px, py);
                }
                weighted(taps(), value_at)
            }
        }
    }
}

fn weighted(
    taps: impl Iterator<Item = (isize, isize, f64)>,
    value_at: impl Fn(isize, isize) -> Option<f64>,
) -> f64 {
    let mut sum = 0.0;
    let mut weight_sum = 0.0;
    for (row, col, weight) in taps {
        if weight == 0.0 {
            continue;
        }
        if let Some(value) = value_at(row, col) {
            sum += value * weight;
            weight_sum += weight;
        }
    }
    if weight_sum > 0.0 {
        sum / weight_sum
    } else {
        f64::NAN
    }
}

/// Mitchell-Netravali kernel with B = C = 1/3.
fn cubic_weight(x: f64) -> f64 {
    const A0: f64 = 7.0 / 6.0;
    const A1: f64 = -2.0;
    const A2: f64 = 16.0 / 18.0;
    const B0: f64 = -7.0 / 18.0;
    const B1: f64 = 2.0;
    const B2: f64 = -10.0 / 3.0;
    const B3: f64 = 16.0 / 9.0;

    let x = x.abs();
    if x < 1.0 {
        let x2 = x * x;
        A0 * x2 * x + A1 * x2 + A2
    } else if x < 2.0 {
        let x2 = x * x;
        B0 * x2 * x + B1 * x2 + B2 * x + B3
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_nearest_picks_containing_cell() {
        let band = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(ResamplingMethod::Nearest.sample(&band, None, 1.2, 0.9), 2.0);
        assert_eq!(ResamplingMethod::Nearest.sample(&band, None, 0.5, 1.5), 3.0);
    }

    #[test]
    fn test_bilinear_between_centres() {
        let band = array![[0.0, 10.0], [20.0, 30.0]];
        let value = ResamplingMethod::Bilinear.sample(&band, None, 1.0, 1.0);
        assert!((value - 15.0).abs() < 1e-12);
        assert_eq!(ResamplingMethod::Bilinear.sample(&band, None, 0.5, 0.5), 0.0);
    }

    #[test]
    fn test_missing_neighbours_are_renormalized() {
        let band = array![[0.0, -1.0], [20.0, 30.0]];
        let value = ResamplingMethod::Bilinear.sample(&band, Some(-1.0), 1.0, 1.0);
        assert!((value - 50.0 / 3.0).abs() < 1e-12);
        let all_missing = array![[-1.0, -1.0], [-1.0, -1.0]];
        assert!(ResamplingMethod::Cubic.sample(&all_missing, Some(-1.0), 1.0, 1.0).is_nan());
    }

    #[test]
    fn test_cubic_with_missing_tap_falls_back_to_bilinear() {
        let band = array![
            [-1.0, 100.0, 0.0, 0.0],
            [100.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0]
        ];
        let cubic = ResamplingMethod::Cubic.sample(&band, Some(-1.0), 2.0, 2.0);
        let bilinear = ResamplingMethod::Bilinear.sample(&band, Some(-1.0), 2.0, 2.0);
        assert_eq!(cubic, bilinear);
        assert_eq!(cubic, 0.0);
    }

    #[test]
    fn test_cubic_preserves_constant_field() {
        let band = Array2::from_elem((5, 5), 7.0);
        let value = ResamplingMethod::Cubic.sample(&band, None, 2.3, 2.8);
        assert!((value - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_kernel_partition_of_unity() {
        for f in [0.0, 0.25, 0.5, 0.9] {
            let total: f64 = (-1..=2).map(|i| cubic_weight(i as f64 - f)).sum();
            assert!((total - 1.0).abs() < 1e-12, "f = {f}");
        }
    }

    #[test]
    fn test_default_method_by_type() {
        assert_eq!(ResamplingMethod::default_for(ElementType::UInt8), ResamplingMethod::Nearest);
        assert_eq!(ResamplingMethod::default_for(ElementType::Float32), ResamplingMethod::Bilinear);
    }
}
