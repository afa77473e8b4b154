//! Stateful slope field handle exposing typed arrays to JS.

use crate::{js_error, parse_spec};
use anyhow::Context;
use isoklin_core::plot::{build_plot, Plot};
use isoklin_core::sink::MatrixData;
use js_sys::Float64Array;
use nalgebra::DMatrix;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmSlopeField {
    plot: Plot,
}

impl WasmSlopeField {
    pub(crate) fn from_json(spec_json: &str) -> anyhow::Result<Self> {
        let spec = parse_spec(spec_json)?;
        let plot = build_plot(&spec).with_context(|| format!("cannot plot '{}'", spec.equation))?;
        Ok(Self { plot })
    }

    fn row_major(matrix: &DMatrix<f64>) -> Float64Array {
        Float64Array::from(MatrixData::from(matrix).values.as_slice())
    }
}

#[wasm_bindgen]
impl WasmSlopeField {
    #[wasm_bindgen(constructor)]
    pub fn new(spec_json: &str) -> Result<WasmSlopeField, JsValue> {
        console_error_panic_hook::set_once();
        Self::from_json(spec_json).map_err(js_error)
    }

    /// Solved and simplified right-hand side of `dy/dx`.
    pub fn derivative(&self) -> String {
        self.plot.derivative.to_string()
    }

    pub fn title(&self) -> String {
        self.plot.title.clone()
    }

    pub fn rows(&self) -> usize {
        self.plot.field.grid.shape().0
    }

    pub fn cols(&self) -> usize {
        self.plot.field.grid.shape().1
    }

    pub fn x_samples(&self) -> Float64Array {
        Float64Array::from(self.plot.field.grid.x_samples().as_slice())
    }

    pub fn y_samples(&self) -> Float64Array {
        Float64Array::from(self.plot.field.grid.y_samples().as_slice())
    }

    pub fn u(&self) -> Float64Array {
        Self::row_major(&self.plot.field.directions.u)
    }

    pub fn v(&self) -> Float64Array {
        Self::row_major(&self.plot.field.directions.v)
    }

    pub fn colors(&self) -> Float64Array {
        Self::row_major(&self.plot.field.colors)
    }

    pub fn levels(&self) -> Float64Array {
        Float64Array::from(self.plot.field.levels.as_slice())
    }

    pub fn singular_points(&self) -> usize {
        self.plot.field.singular_points()
    }

    pub fn contours(&self) -> Result<JsValue, JsValue> {
        to_value(&self.plot.contours)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_keeps_plot_state() {
        let field = WasmSlopeField::from_json(
            r#"{"equation": "y*(dy + x) - 1 = 0", "form": "implicit", "field": {"resolution": 8}}"#,
        )
        .expect("spec should evaluate");
        assert_eq!((field.rows(), field.cols()), (8, 8));
        assert_eq!(field.derivative(), "(1 - y*x)/y");
        assert_eq!(field.singular_points(), 0);
    }
}
