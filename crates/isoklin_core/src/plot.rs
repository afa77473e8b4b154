use crate::equation_engine::{parse, parse_equation, Expr};
use crate::error::IsoklinResult;
use crate::field::{evaluate_field, FieldConfig, SlopeField};
use crate::implicit::{explicit_derivative, RootPolicy, Symbols};
use crate::isocline::{compute_contours, IsoclineContour};
use crate::sink::{FieldSink, PlotRequest, DEFAULT_TITLE};
use crate::slope::SlopeExpression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationForm {
    /// `equation` is the right-hand side `f(x, y)` of `dy/dx = f(x, y)`.
    #[default]
    Explicit,
    /// `equation` is `F(x, y, dy) = 0` (or `lhs = rhs`) to be solved for `dy`.
    Implicit,
}

/// A complete plot description, as read from a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSpec {
    pub equation: String,
    pub form: EquationForm,
    pub symbols: Symbols,
    pub params: BTreeMap<String, f64>,
    pub root_policy: RootPolicy,
    pub field: FieldConfig,
    pub title: Option<String>,
    pub label_contours: bool,
}

impl Default for PlotSpec {
    fn default() -> Self {
        Self {
            equation: "(y - x)/(y^2 + 1)".to_string(),
            form: EquationForm::Explicit,
            symbols: Symbols::default(),
            params: BTreeMap::new(),
            root_policy: RootPolicy::First,
            field: FieldConfig::default(),
            title: None,
            label_contours: true,
        }
    }
}

impl PlotSpec {
    /// Explicit derivative for this spec, solving the implicit form if needed.
    pub fn derivative(&self) -> IsoklinResult<Expr> {
        match self.form {
            EquationForm::Explicit => parse(&self.equation),
            EquationForm::Implicit => {
                let equation = parse_equation(&self.equation)?;
                explicit_derivative(&equation, &self.symbols, self.root_policy)
            }
        }
    }

    pub fn compile(&self) -> IsoklinResult<SlopeExpression> {
        SlopeExpression::compile(&self.derivative()?, &self.symbols, &self.params)
    }
}

/// Result of evaluating a [`PlotSpec`].
#[derive(Debug, Clone)]
pub struct Plot {
    pub title: String,
    pub derivative: Expr,
    pub field: SlopeField,
    pub contours: Vec<IsoclineContour>,
    pub label_contours: bool,
}

impl Plot {
    pub fn request(&self) -> PlotRequest<'_> {
        let mut request = PlotRequest::new(&self.field, &self.contours);
        request.title = &self.title;
        request.label_contours = self.label_contours;
        request
    }

    pub fn render<S: FieldSink>(&self, sink: &mut S) -> IsoklinResult<S::Output> {
        sink.render(&self.request())
    }
}

/// Solves (if needed), compiles and evaluates `spec`.
pub fn build_plot(spec: &PlotSpec) -> IsoklinResult<Plot> {
    spec.field.validate()?;
    let slope = spec.compile()?;
    info!(derivative = %slope.expr(), "slope function ready");
    let field = evaluate_field(&slope, &spec.field)?;
    let contours = compute_contours(&field);
    Ok(Plot {
        title: spec.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        derivative: slope.expr().clone(),
        field,
        contours,
        label_contours: spec.label_contours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IsoklinError;
    use crate::sink::SnapshotSink;

    #[test]
    fn default_spec_builds_and_renders_snapshot() {
        let plot = build_plot(&PlotSpec::default()).expect("default plot should build");
        let snapshot = plot
            .render(&mut SnapshotSink)
            .expect("snapshot sink never fails");
        assert_eq!(snapshot.title, DEFAULT_TITLE);
        assert_eq!(snapshot.colormap, "hsv");
        assert_eq!(snapshot.u.rows, 40);
        assert_eq!(snapshot.contours.len(), snapshot.levels.len());
    }

    #[test]
    fn implicit_spec_is_solved_before_compilation() {
        let spec = PlotSpec {
            equation: "y*(dy + x) - 1 = 0".to_string(),
            form: EquationForm::Implicit,
            ..PlotSpec::default()
        };
        let slope = spec.compile().expect("implicit spec should compile");
        assert!((slope.eval(1.0, 2.0) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn unsolvable_spec_surfaces_error() {
        let spec = PlotSpec {
            equation: "dy^2 + x^2 + 1 = 0".to_string(),
            form: EquationForm::Implicit,
            ..PlotSpec::default()
        };
        // Discriminant -4(x^2 + 1) is symbolic, so roots exist but are NaN on the grid.
        assert!(spec.compile().is_ok());

        let spec = PlotSpec {
            equation: "x*y = 3".to_string(),
            form: EquationForm::Implicit,
            ..PlotSpec::default()
        };
        assert!(matches!(
            build_plot(&spec),
            Err(IsoklinError::UnsolvableEquation { .. })
        ));
    }

    #[test]
    fn parameters_flow_into_compiled_slope() {
        let mut params = BTreeMap::new();
        params.insert("k".to_string(), 3.0);
        let spec = PlotSpec {
            equation: "k*y".to_string(),
            params,
            ..PlotSpec::default()
        };
        let slope = spec.compile().expect("parametrized spec should compile");
        assert_eq!(slope.eval(0.0, 2.0), 6.0);
    }

    #[test]
    fn invalid_field_config_is_rejected_before_solving() {
        let spec = PlotSpec {
            field: FieldConfig {
                hue_shift: 1.5,
                ..FieldConfig::default()
            },
            ..PlotSpec::default()
        };
        assert!(matches!(
            build_plot(&spec),
            Err(IsoklinError::InvalidConfig { .. })
        ));
    }
}
