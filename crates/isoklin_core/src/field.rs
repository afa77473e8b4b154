//! Sampling a slope function over a rectangular grid.
//!
//! Produces the grid, the unit direction field, the hue used to color each
//! arrow, the slope ratio `Z = V2/U2` and the isocline levels drawn over it.

use crate::error::{IsoklinError, IsoklinResult};
use crate::traits::SlopeFunction;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::f64::consts::PI;
use tracing::{debug, warn};

/// How the extremes of `Z` are taken when spacing isocline levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioExtremes {
    /// Ignore non-finite ratios.
    #[default]
    FiniteOnly,
    /// Take min/max over every point; a single NaN makes the levels NaN.
    Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// Samples per axis.
    pub resolution: usize,
    /// Evenly spaced isocline levels, before the zero level is added.
    pub num_isoclines: usize,
    /// Cyclic offset added to the arrow hue, in [0, 1).
    pub hue_shift: f64,
    pub ratio_extremes: RatioExtremes,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            x_range: (-4.0, 4.0),
            y_range: (-4.0, 4.0),
            resolution: 40,
            num_isoclines: 5,
            hue_shift: 0.0,
            ratio_extremes: RatioExtremes::FiniteOnly,
        }
    }
}

impl FieldConfig {
    pub fn validate(&self) -> IsoklinResult<()> {
        for (name, (min, max)) in [("x_range", self.x_range), ("y_range", self.y_range)] {
            if !min.is_finite() || !max.is_finite() || max <= min {
                return Err(IsoklinError::invalid_config(format!(
                    "{name} must be finite with max > min, got ({min}, {max})"
                )));
            }
        }
        if self.resolution < 2 {
            return Err(IsoklinError::invalid_config(
                "resolution needs at least 2 samples per axis",
            ));
        }
        if self.num_isoclines == 0 {
            return Err(IsoklinError::invalid_config(
                "num_isoclines must be at least 1",
            ));
        }
        if !(0.0..1.0).contains(&self.hue_shift) {
            return Err(IsoklinError::invalid_config(format!(
                "hue_shift must lie in [0, 1), got {}",
                self.hue_shift
            )));
        }
        Ok(())
    }
}

/// `samples` evenly spaced values over the closed interval `[start, stop]`.
/// The last value is exactly `stop`; a single sample is `start`.
pub fn linspace(start: f64, stop: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (stop - start) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            values[n - 1] = stop;
            values
        }
    }
}

/// Meshgrid of the sample points: row index follows `y`, column index follows `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub x: DMatrix<f64>,
    pub y: DMatrix<f64>,
}

impl Grid {
    pub fn new(config: &FieldConfig) -> Self {
        let n = config.resolution;
        let xs = linspace(config.x_range.0, config.x_range.1, n);
        let ys = linspace(config.y_range.0, config.y_range.1, n);
        Self {
            x: DMatrix::from_fn(n, n, |_, j| xs[j]),
            y: DMatrix::from_fn(n, n, |i, _| ys[i]),
        }
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.x.shape()
    }

    pub fn x_samples(&self) -> Vec<f64> {
        self.x.row(0).iter().copied().collect()
    }

    pub fn y_samples(&self) -> Vec<f64> {
        self.y.column(0).iter().copied().collect()
    }
}

/// Raw slopes and the normalized `(U2, V2)` arrows built from `(1, V)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionField {
    pub slope: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub v: DMatrix<f64>,
}

impl DirectionField {
    pub fn from_slopes(slope: DMatrix<f64>) -> Self {
        let norm = slope.map(|v| (1.0 + v * v).sqrt());
        let u = norm.map(|n| 1.0 / n);
        let v = slope.zip_map(&norm, |v, n| v / n);
        Self { slope, u, v }
    }

    /// Slope ratio `V2/U2` per point.
    pub fn ratio(&self) -> DMatrix<f64> {
        self.v.zip_map(&self.u, |v, u| v / u)
    }

    /// Hue in [0, 1) from the arrow angle, rotated by `hue_shift`.
    pub fn colors(&self, hue_shift: f64) -> DMatrix<f64> {
        self.v.zip_map(&self.u, |v, u| {
            let normalized = (v.atan2(u) + PI) / (2.0 * PI);
            (normalized + hue_shift).rem_euclid(1.0)
        })
    }
}

fn nan_last(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Isocline levels for the slope ratio field.
///
/// `num_isoclines` values evenly spaced between the extremes of `ratio`, with
/// `0` appended when absent, sorted ascending (NaN last) and without repeats.
pub fn isocline_levels<'a>(
    ratio: impl IntoIterator<Item = &'a f64>,
    num_isoclines: usize,
    extremes: RatioExtremes,
) -> Vec<f64> {
    let bounds = match extremes {
        RatioExtremes::FiniteOnly => ratio
            .into_iter()
            .copied()
            .filter(|z| z.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, z| match acc {
                None => Some((z, z)),
                Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
            }),
        RatioExtremes::Literal => {
            ratio.into_iter().copied().fold(None, |acc: Option<(f64, f64)>, z| match acc {
                None => Some((z, z)),
                Some((lo, _)) if lo.is_nan() || z.is_nan() => Some((f64::NAN, f64::NAN)),
                Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
            })
        }
    };

    let mut levels = match bounds {
        Some((lo, hi)) => linspace(lo, hi, num_isoclines),
        None => Vec::new(),
    };
    if !levels.contains(&0.0) {
        levels.push(0.0);
    }
    levels.sort_by(nan_last);
    // A constant ratio spaces every level onto the same value.
    levels.dedup_by(|a, b| a == b || (a.is_nan() && b.is_nan()));
    levels
}

/// Everything the rendering sink needs for one plot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeField {
    pub config: FieldConfig,
    pub grid: Grid,
    pub directions: DirectionField,
    pub colors: DMatrix<f64>,
    pub ratio: DMatrix<f64>,
    pub levels: Vec<f64>,
}

impl SlopeField {
    /// Grid points whose raw slope is not finite.
    pub fn singular_points(&self) -> usize {
        self.directions
            .slope
            .iter()
            .filter(|v| !v.is_finite())
            .count()
    }
}

/// Samples `slope` over the configured grid in a single array call.
pub fn evaluate_field<S: SlopeFunction + ?Sized>(
    slope: &S,
    config: &FieldConfig,
) -> IsoklinResult<SlopeField> {
    config.validate()?;
    let grid = Grid::new(config);
    let (rows, cols) = grid.shape();

    let mut raw = DMatrix::zeros(rows, cols);
    slope.slopes(grid.x.as_slice(), grid.y.as_slice(), raw.as_mut_slice());

    let directions = DirectionField::from_slopes(raw);
    let colors = directions.colors(config.hue_shift);
    let ratio = directions.ratio();
    let levels = isocline_levels(ratio.iter(), config.num_isoclines, config.ratio_extremes);

    let field = SlopeField {
        config: config.clone(),
        grid,
        directions,
        colors,
        ratio,
        levels,
    };
    let singular = field.singular_points();
    if singular > 0 {
        warn!(singular, "slope is not finite at some grid points");
    }
    debug!(
        rows,
        cols,
        levels = ?field.levels,
        "evaluated slope field"
    );
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ClosureSlope;

    fn scenario_slope() -> ClosureSlope<impl Fn(f64, f64) -> f64> {
        ClosureSlope(|x: f64, y: f64| (y - x) / (y * y + 1.0))
    }

    #[test]
    fn linspace_matches_closed_interval() {
        assert_eq!(linspace(-4.0, 4.0, 5), vec![-4.0, -2.0, 0.0, 2.0, 4.0]);
        assert_eq!(linspace(1.0, 3.0, 1), vec![1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        let xs = linspace(-4.0, 4.0, 40);
        assert_eq!(xs.len(), 40);
        assert_eq!(xs[0], -4.0);
        assert_eq!(xs[39], 4.0);
    }

    #[test]
    fn grid_is_meshgrid_ordered() {
        let config = FieldConfig {
            resolution: 3,
            x_range: (0.0, 2.0),
            y_range: (10.0, 12.0),
            ..FieldConfig::default()
        };
        let grid = Grid::new(&config);
        assert_eq!(grid.shape(), (3, 3));
        assert_eq!(grid.x[(2, 1)], 1.0);
        assert_eq!(grid.y[(2, 1)], 12.0);
        assert_eq!(grid.x_samples(), vec![0.0, 1.0, 2.0]);
        assert_eq!(grid.y_samples(), vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn unit_vector_at_point_with_zero_y() {
        let directions = DirectionField::from_slopes(DMatrix::from_element(1, 1, -2.0));
        let root5 = 5.0_f64.sqrt();
        assert!((directions.u[(0, 0)] - 1.0 / root5).abs() < 1e-12);
        assert!((directions.v[(0, 0)] + 2.0 / root5).abs() < 1e-12);
    }

    #[test]
    fn hue_shift_wraps_around() {
        let directions = DirectionField::from_slopes(DMatrix::from_element(1, 1, 0.0));
        // Horizontal arrow has angle 0, i.e. hue 0.5 before shifting.
        assert!((directions.colors(0.0)[(0, 0)] - 0.5).abs() < 1e-12);
        assert!((directions.colors(0.75)[(0, 0)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn levels_insert_zero_once_and_sort() {
        let ratio = [-3.0, 1.0, 2.0];
        let levels = isocline_levels(ratio.iter(), 5, RatioExtremes::FiniteOnly);
        assert_eq!(levels, vec![-3.0, -1.75, -0.5, 0.0, 0.75, 2.0]);

        let symmetric = [-2.0, 2.0];
        let levels = isocline_levels(symmetric.iter(), 5, RatioExtremes::FiniteOnly);
        assert_eq!(levels, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn constant_ratio_yields_each_level_once() {
        let flat = evaluate_field(&ClosureSlope(|_: f64, _: f64| 0.0), &FieldConfig::default())
            .expect("flat field should evaluate");
        assert_eq!(flat.levels, vec![0.0]);

        let constant = [2.0; 6];
        let levels = isocline_levels(constant.iter(), 5, RatioExtremes::FiniteOnly);
        assert_eq!(levels, vec![0.0, 2.0]);
    }

    #[test]
    fn non_finite_ratio_is_masked_or_propagated() {
        let ratio = [f64::NAN, -1.0, 3.0];
        let masked = isocline_levels(ratio.iter(), 3, RatioExtremes::FiniteOnly);
        assert_eq!(masked, vec![-1.0, 0.0, 1.0, 3.0]);

        let literal = isocline_levels(ratio.iter(), 3, RatioExtremes::Literal);
        assert_eq!(literal.len(), 2);
        assert_eq!(literal[0], 0.0);
        assert!(literal[1].is_nan());

        let all_nan = [f64::NAN, f64::NAN];
        assert_eq!(
            isocline_levels(all_nan.iter(), 4, RatioExtremes::FiniteOnly),
            vec![0.0]
        );
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let bad = [
            FieldConfig {
                x_range: (1.0, 1.0),
                ..FieldConfig::default()
            },
            FieldConfig {
                resolution: 1,
                ..FieldConfig::default()
            },
            FieldConfig {
                num_isoclines: 0,
                ..FieldConfig::default()
            },
            FieldConfig {
                hue_shift: 1.0,
                ..FieldConfig::default()
            },
            FieldConfig {
                y_range: (f64::NAN, 1.0),
                ..FieldConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(IsoklinError::InvalidConfig { .. })
            ));
        }
        assert!(FieldConfig::default().validate().is_ok());
    }

    #[test]
    fn evaluate_field_default_grid() {
        let config = FieldConfig {
            hue_shift: 0.2,
            ..FieldConfig::default()
        };
        let field = evaluate_field(&scenario_slope(), &config).expect("field should evaluate");
        assert_eq!(field.grid.shape(), (40, 40));
        assert_eq!(field.singular_points(), 0);
        assert_eq!(field.levels.iter().filter(|l| **l == 0.0).count(), 1);
        assert!(field.levels.windows(2).all(|w| w[0] <= w[1]));
        assert!(field.levels.len() == 5 || field.levels.len() == 6);
    }

    #[test]
    fn singular_slopes_pass_through_as_non_finite() {
        let slope = ClosureSlope(|x: f64, _y: f64| 1.0 / x);
        let config = FieldConfig {
            resolution: 3,
            x_range: (-1.0, 1.0),
            ..FieldConfig::default()
        };
        let field = evaluate_field(&slope, &config).expect("field should evaluate");
        // Middle column sits on x = 0.
        assert_eq!(field.singular_points(), 3);
        assert!(field.directions.v[(0, 1)].is_nan());
        assert!(field.levels.iter().all(|l| l.is_finite()));
    }
}
