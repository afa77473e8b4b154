//! Hand-off from the evaluator to whatever draws the plot.

use crate::error::IsoklinResult;
use crate::field::SlopeField;
use crate::isocline::IsoclineContour;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "Slope Field with Customizable Isoclines";
pub const DEFAULT_COLORMAP: &str = "hsv";
pub const COLORBAR_LABEL: &str = "Direction (angle in radians)";

/// Everything a renderer receives for one figure.
#[derive(Debug, Clone)]
pub struct PlotRequest<'a> {
    pub field: &'a SlopeField,
    pub contours: &'a [IsoclineContour],
    pub colormap: &'a str,
    pub title: &'a str,
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub colorbar_label: &'a str,
    /// Draw the level value next to each contour.
    pub label_contours: bool,
}

impl<'a> PlotRequest<'a> {
    pub fn new(field: &'a SlopeField, contours: &'a [IsoclineContour]) -> Self {
        Self {
            field,
            contours,
            colormap: DEFAULT_COLORMAP,
            title: DEFAULT_TITLE,
            x_label: "x",
            y_label: "y",
            colorbar_label: COLORBAR_LABEL,
            label_contours: true,
        }
    }
}

/// A renderer for slope field plots.
pub trait FieldSink {
    type Output;

    fn render(&mut self, request: &PlotRequest<'_>) -> IsoklinResult<Self::Output>;
}

/// Row-major matrix with its shape, as handed across serialization boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixData {
    pub rows: usize,
    pub cols: usize,
    /// `values[row * cols + col]`; non-finite entries serialize as `null` in JSON.
    pub values: Vec<f64>,
}

impl From<&DMatrix<f64>> for MatrixData {
    fn from(matrix: &DMatrix<f64>) -> Self {
        let (rows, cols) = matrix.shape();
        Self {
            rows,
            cols,
            values: matrix.transpose().as_slice().to_vec(),
        }
    }
}

/// Serializable copy of a plot request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub colormap: String,
    pub colorbar_label: String,
    pub x_samples: Vec<f64>,
    pub y_samples: Vec<f64>,
    pub u: MatrixData,
    pub v: MatrixData,
    pub colors: MatrixData,
    pub levels: Vec<f64>,
    pub label_contours: bool,
    pub contours: Vec<IsoclineContour>,
}

impl From<&PlotRequest<'_>> for FieldSnapshot {
    fn from(request: &PlotRequest<'_>) -> Self {
        let field = request.field;
        Self {
            title: request.title.to_string(),
            x_label: request.x_label.to_string(),
            y_label: request.y_label.to_string(),
            colormap: request.colormap.to_string(),
            colorbar_label: request.colorbar_label.to_string(),
            x_samples: field.grid.x_samples(),
            y_samples: field.grid.y_samples(),
            u: MatrixData::from(&field.directions.u),
            v: MatrixData::from(&field.directions.v),
            colors: MatrixData::from(&field.colors),
            levels: field.levels.clone(),
            label_contours: request.label_contours,
            contours: request.contours.to_vec(),
        }
    }
}

/// Sink that captures the request as a [`FieldSnapshot`] for an external renderer.
#[derive(Debug, Default)]
pub struct SnapshotSink;

impl FieldSink for SnapshotSink {
    type Output = FieldSnapshot;

    fn render(&mut self, request: &PlotRequest<'_>) -> IsoklinResult<FieldSnapshot> {
        Ok(FieldSnapshot::from(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_data_is_row_major() {
        let matrix = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let data = MatrixData::from(&matrix);
        assert_eq!((data.rows, data.cols), (2, 3));
        assert_eq!(data.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
