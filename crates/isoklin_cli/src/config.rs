use anyhow::{Context, Result};
use isoklin_core::field::RatioExtremes;
use isoklin_core::implicit::RootPolicy;
use isoklin_core::plot::{EquationForm, PlotSpec};
use std::fs;
use std::path::Path;

pub fn load_spec(path: &Path) -> Result<PlotSpec> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_spec(&text).with_context(|| format!("invalid config {}", path.display()))
}

pub fn parse_spec(text: &str) -> Result<PlotSpec> {
    Ok(serde_yaml::from_str(text)?)
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct SpecOverrides {
    pub equation: Option<String>,
    pub implicit: bool,
    pub x_range: Option<(f64, f64)>,
    pub y_range: Option<(f64, f64)>,
    pub resolution: Option<usize>,
    pub num_isoclines: Option<usize>,
    pub hue_shift: Option<f64>,
    pub ratio_extremes: Option<RatioExtremes>,
    pub params: Vec<(String, f64)>,
    pub root: Option<usize>,
    pub title: Option<String>,
    pub no_labels: bool,
}

impl SpecOverrides {
    pub fn apply(self, spec: &mut PlotSpec) {
        if let Some(equation) = self.equation {
            spec.equation = equation;
        }
        if self.implicit {
            spec.form = EquationForm::Implicit;
        }
        if let Some(range) = self.x_range {
            spec.field.x_range = range;
        }
        if let Some(range) = self.y_range {
            spec.field.y_range = range;
        }
        if let Some(resolution) = self.resolution {
            spec.field.resolution = resolution;
        }
        if let Some(num) = self.num_isoclines {
            spec.field.num_isoclines = num;
        }
        if let Some(shift) = self.hue_shift {
            spec.field.hue_shift = shift;
        }
        if let Some(extremes) = self.ratio_extremes {
            spec.field.ratio_extremes = extremes;
        }
        spec.params.extend(self.params);
        if let Some(index) = self.root {
            spec.root_policy = RootPolicy::Index(index);
        }
        if self.title.is_some() {
            spec.title = self.title;
        }
        if self.no_labels {
            spec.label_contours = false;
        }
    }
}

/// Parses `min,max`.
pub fn parse_range(text: &str) -> Result<(f64, f64), String> {
    let (min, max) = text
        .split_once(',')
        .ok_or_else(|| format!("expected 'min,max', got '{text}'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|err| format!("invalid bound '{}': {err}", s.trim()))
    };
    Ok((parse(min)?, parse(max)?))
}

/// Parses `name=value`.
pub fn parse_param(text: &str) -> Result<(String, f64), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected 'name=value', got '{text}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{text}'"));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid value for '{name}': {err}"))?;
    Ok((name.to_string(), value))
}

pub fn parse_ratio_extremes(text: &str) -> Result<RatioExtremes, String> {
    match text {
        "finite_only" | "finite-only" => Ok(RatioExtremes::FiniteOnly),
        "literal" => Ok(RatioExtremes::Literal),
        other => Err(format!(
            "unknown ratio extremes mode '{other}' (expected finite_only or literal)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_spec_uses_defaults_for_missing_fields() {
        let spec = parse_spec(
            r#"
equation: "y*(dy + x) - 1 = 0"
form: implicit
field:
  resolution: 12
  x_range: [-2, 3]
"#,
        )
        .expect("yaml should parse");
        assert_eq!(spec.form, EquationForm::Implicit);
        assert_eq!(spec.field.resolution, 12);
        assert_eq!(spec.field.x_range, (-2.0, 3.0));
        assert_eq!(spec.field.y_range, (-4.0, 4.0));
        assert_eq!(spec.field.num_isoclines, 5);
        assert_eq!(spec.root_policy, RootPolicy::First);
        assert!(spec.label_contours);
    }

    #[test]
    fn demo_specs_load_and_build() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos");
        let demos = [
            "reference_field.yaml",
            "implicit_field.yaml",
            "damped_field.yaml",
        ];

        for name in demos {
            let spec = load_spec(&root.join(name))
                .unwrap_or_else(|e| panic!("Failed to load {}: {:#}", name, e));
            isoklin_core::plot::build_plot(&spec)
                .unwrap_or_else(|e| panic!("Failed to build {}: {}", name, e));
        }
    }

    #[test]
    fn unknown_form_is_rejected() {
        assert!(parse_spec("form: sideways\n").is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut spec = PlotSpec::default();
        SpecOverrides {
            equation: Some("x*dy - y".to_string()),
            implicit: true,
            y_range: Some((-1.0, 1.0)),
            params: vec![("k".to_string(), 2.5)],
            root: Some(1),
            no_labels: true,
            ..SpecOverrides::default()
        }
        .apply(&mut spec);

        assert_eq!(spec.equation, "x*dy - y");
        assert_eq!(spec.form, EquationForm::Implicit);
        assert_eq!(spec.field.y_range, (-1.0, 1.0));
        assert_eq!(spec.field.x_range, (-4.0, 4.0));
        assert_eq!(spec.params.get("k"), Some(&2.5));
        assert_eq!(spec.root_policy, RootPolicy::Index(1));
        assert!(!spec.label_contours);
    }

    #[test]
    fn range_and_param_parsing() {
        assert_eq!(parse_range("-4,4"), Ok((-4.0, 4.0)));
        assert_eq!(parse_range(" -1.5 , 2e1 "), Ok((-1.5, 20.0)));
        assert!(parse_range("4").is_err());
        assert!(parse_range("a,1").is_err());

        assert_eq!(parse_param("k=3"), Ok(("k".to_string(), 3.0)));
        assert!(parse_param("=3").is_err());
        assert!(parse_param("k").is_err());

        assert_eq!(parse_ratio_extremes("literal"), Ok(RatioExtremes::Literal));
        assert!(parse_ratio_extremes("max").is_err());
    }
}
