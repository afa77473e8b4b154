use crate::field::{Grid, SlopeField};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Contour of the slope ratio at one level, as independent line segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsoclineContour {
    pub level: f64,
    /// Flat `[x0, y0, x1, y1, ...]` vertex coordinates.
    pub points: Vec<f64>,
    /// Pairs of vertex indices into `points`.
    pub segments: Vec<u32>,
    /// Where an inline level label goes: midpoint of the longest segment.
    pub label_anchor: Option<[f64; 2]>,
}

impl IsoclineContour {
    pub fn segment_count(&self) -> usize {
        self.segments.len() / 2
    }

    pub fn vertex(&self, index: u32) -> [f64; 2] {
        let i = index as usize * 2;
        [self.points[i], self.points[i + 1]]
    }
}

/// One contour per level of the field.
pub fn compute_contours(field: &SlopeField) -> Vec<IsoclineContour> {
    field
        .levels
        .iter()
        .map(|&level| contour_segments(&field.grid, &field.ratio, level))
        .collect()
}

/// Marching squares over the grid cells for `values == level`.
///
/// Cells with a non-finite corner are skipped, as is a non-finite level.
pub fn contour_segments(grid: &Grid, values: &DMatrix<f64>, level: f64) -> IsoclineContour {
    let mut points = Vec::new();
    let mut segments = Vec::new();
    if !level.is_finite() {
        return IsoclineContour {
            level,
            points,
            segments,
            label_anchor: None,
        };
    }

    let (ny, nx) = values.shape();
    let xs = grid.x_samples();
    let ys = grid.y_samples();
    let mut point_count = 0u32;
    let mut longest: Option<(f64, [f64; 2])> = None;

    for iy in 0..ny.saturating_sub(1) {
        for ix in 0..nx.saturating_sub(1) {
            let cell = Cell {
                x0: xs[ix],
                x1: xs[ix + 1],
                y0: ys[iy],
                y1: ys[iy + 1],
                v: [
                    values[(iy, ix)] - level,
                    values[(iy, ix + 1)] - level,
                    values[(iy + 1, ix + 1)] - level,
                    values[(iy + 1, ix)] - level,
                ],
            };
            if cell.v.iter().any(|v| !v.is_finite()) {
                continue;
            }

            let mut case_index = 0u8;
            for (corner, value) in cell.v.iter().enumerate() {
                if *value >= 0.0 {
                    case_index |= 1 << corner;
                }
            }

            for (edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                let (ax, ay) = cell.interpolate_edge(*edge_a);
                let (bx, by) = cell.interpolate_edge(*edge_b);
                points.extend([ax, ay, bx, by]);
                segments.push(point_count);
                segments.push(point_count + 1);
                point_count += 2;

                let length = (bx - ax).hypot(by - ay);
                if longest.map_or(true, |(best, _)| length > best) {
                    longest = Some((length, [(ax + bx) / 2.0, (ay + by) / 2.0]));
                }
            }
        }
    }

    IsoclineContour {
        level,
        points,
        segments,
        label_anchor: longest.map(|(_, anchor)| anchor),
    }
}

/// Corner values are ordered (x0,y0), (x1,y0), (x1,y1), (x0,y1).
struct Cell {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    v: [f64; 4],
}

impl Cell {
    fn interpolate_edge(&self, edge: u8) -> (f64, f64) {
        let [v0, v1, v2, v3] = self.v;
        let (x0, x1, y0, y1) = (self.x0, self.x1, self.y0, self.y1);
        match edge {
            0 => {
                let t = interpolate_factor(v0, v1);
                (x0 + (x1 - x0) * t, y0)
            }
            1 => {
                let t = interpolate_factor(v1, v2);
                (x1, y0 + (y1 - y0) * t)
            }
            2 => {
                let t = interpolate_factor(v2, v3);
                (x1 + (x0 - x1) * t, y1)
            }
            3 => {
                let t = interpolate_factor(v3, v0);
                (x0, y1 + (y0 - y1) * t)
            }
            _ => (x0, y0),
        }
    }
}

fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        0 | 15 => &[],
        1 => &[(3, 0)],
        2 => &[(0, 1)],
        3 => &[(3, 1)],
        4 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 => &[(0, 2)],
        7 => &[(3, 2)],
        8 => &[(2, 3)],
        9 => &[(0, 2)],
        10 => &[(0, 3), (1, 2)],
        11 => &[(1, 2)],
        12 => &[(1, 3)],
        13 => &[(0, 1)],
        14 => &[(3, 0)],
        _ => &[],
    }
}

fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}
