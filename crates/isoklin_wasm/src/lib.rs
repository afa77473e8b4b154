//! JS hand-off for the slope field evaluator.

mod field;

pub use field::WasmSlopeField;

use anyhow::{Context, Result};
use isoklin_core::equation_engine::parse_equation;
use isoklin_core::implicit::{solve_for_derivative, Solutions, Symbols};
use isoklin_core::plot::{build_plot, PlotSpec};
use isoklin_core::sink::{FieldSnapshot, SnapshotSink};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

/// Result of solving an implicit equation, as handed to JS.
#[derive(Debug, Serialize)]
pub struct SolveReport {
    pub equation: String,
    pub roots: Vec<String>,
    /// Why the solution set is empty, if it is.
    pub empty_reason: Option<String>,
}

pub(crate) fn parse_spec(spec_json: &str) -> Result<PlotSpec> {
    serde_json::from_str(spec_json).context("invalid plot spec")
}

fn field_snapshot(spec_json: &str) -> Result<FieldSnapshot> {
    let spec = parse_spec(spec_json)?;
    let plot = build_plot(&spec).with_context(|| format!("cannot plot '{}'", spec.equation))?;
    Ok(plot.render(&mut SnapshotSink)?)
}

fn solve_report(equation: &str, symbols: &Symbols) -> Result<SolveReport> {
    let parsed = parse_equation(equation)?;
    let solutions = solve_for_derivative(&parsed, symbols)?;
    let empty_reason = match &solutions {
        Solutions::Empty(reason) => Some(reason.to_string()),
        Solutions::Roots(_) => None,
    };
    Ok(SolveReport {
        equation: parsed.to_string(),
        roots: solutions.roots().iter().map(ToString::to_string).collect(),
        empty_reason,
    })
}

pub(crate) fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", err))
}

/// Evaluates a JSON plot spec and returns the field snapshot.
#[wasm_bindgen]
pub fn compute_slope_field(spec_json: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let snapshot = field_snapshot(spec_json).map_err(js_error)?;
    to_value(&snapshot).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Solves `F(x, y, dy) = 0` for `dy` and lists every root.
#[wasm_bindgen]
pub fn solve_implicit(equation: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let report = solve_report(equation, &Symbols::default()).map_err(js_error)?;
    to_value(&report).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
