use isoklin_core::equation_engine::parse_equation;
use isoklin_core::field::{evaluate_field, FieldConfig};
use isoklin_core::implicit::{explicit_derivative, solve_for_derivative, RootPolicy, Symbols};
use isoklin_core::slope::SlopeExpression;
use isoklin_core::traits::ClosureSlope;
use isoklin_core::IsoklinError;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn reference_slope(x: f64, y: f64) -> f64 {
    (y - x) / (y * y + 1.0)
}

#[test]
fn direct_slope_function_field() {
    let config = FieldConfig {
        num_isoclines: 5,
        hue_shift: 0.2,
        ..FieldConfig::default()
    };
    let field = evaluate_field(&ClosureSlope(reference_slope), &config).expect("field");

    assert_eq!(field.grid.shape(), (40, 40));
    assert_eq!(field.levels.iter().filter(|l| **l == 0.0).count(), 1);
    assert!(field.levels.windows(2).all(|w| w[0] <= w[1]));
    assert!(matches!(field.levels.len(), 5 | 6));
    assert!(field.colors.iter().all(|c| (0.0..1.0).contains(c)));
}

#[test]
fn implicit_equation_solves_to_known_derivative() {
    let equation = parse_equation("y*(dy + x) - 1 = 0").expect("parse");
    let symbols = Symbols::default();
    let derivative =
        explicit_derivative(&equation, &symbols, RootPolicy::First).expect("solvable");
    let slope =
        SlopeExpression::compile(&derivative, &symbols, &BTreeMap::new()).expect("compile");

    assert!((slope.eval(1.0, 2.0) + 0.5).abs() < 1e-12);
    for (x, y) in [(0.0, 1.0), (-2.0, 3.0), (1.5, -0.25)] {
        assert!((slope.eval(x, y) - (1.0 / y - x)).abs() < 1e-12);
    }
}

#[test]
fn empty_solution_set_is_reported() {
    let equation = parse_equation("dy^2 + 1 = 0").expect("parse");
    let symbols = Symbols::default();
    assert!(solve_for_derivative(&equation, &symbols)
        .expect("solve")
        .is_empty());
    assert!(matches!(
        explicit_derivative(&equation, &symbols, RootPolicy::First),
        Err(IsoklinError::UnsolvableEquation { .. })
    ));
}

#[test]
fn unit_vector_where_y_is_zero() {
    // x samples -4, -2, 0, 2, 4 put (2, 0) at row 2, column 3.
    let config = FieldConfig {
        resolution: 5,
        ..FieldConfig::default()
    };
    let field = evaluate_field(&ClosureSlope(reference_slope), &config).expect("field");
    assert_eq!(field.grid.x[(2, 3)], 2.0);
    assert_eq!(field.grid.y[(2, 3)], 0.0);
    assert_eq!(field.directions.slope[(2, 3)], -2.0);

    let root5 = 5.0_f64.sqrt();
    assert!((field.directions.u[(2, 3)] - 1.0 / root5).abs() < 1e-12);
    assert!((field.directions.v[(2, 3)] + 2.0 / root5).abs() < 1e-12);
}

#[test]
fn compiled_and_closure_fields_agree() {
    let config = FieldConfig::default();
    let compiled =
        SlopeExpression::parse("(y - x)/(y^2 + 1)", &Symbols::default(), &BTreeMap::new())
            .expect("compile");
    let a = evaluate_field(&compiled, &config).expect("field");
    let b = evaluate_field(&ClosureSlope(reference_slope), &config).expect("field");
    for (p, q) in a.directions.v.iter().zip(b.directions.v.iter()) {
        assert!((p - q).abs() < 1e-12);
    }
}

proptest! {
    #[test]
    fn direction_vectors_have_unit_length(
        a in -5.0_f64..5.0,
        b in -5.0_f64..5.0,
        resolution in 2_usize..20,
    ) {
        let slope = ClosureSlope(move |x: f64, y: f64| a * x * x - b * y);
        let config = FieldConfig { resolution, ..FieldConfig::default() };
        let field = evaluate_field(&slope, &config).expect("field");
        for (u, v) in field.directions.u.iter().zip(field.directions.v.iter()) {
            prop_assert!((u * u + v * v - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn colors_stay_in_unit_interval(hue_shift in 0.0_f64..1.0, k in -50.0_f64..50.0) {
        let slope = ClosureSlope(move |x: f64, y: f64| k * (x - y));
        let config = FieldConfig { hue_shift, resolution: 12, ..FieldConfig::default() };
        let field = evaluate_field(&slope, &config).expect("field");
        for c in field.colors.iter() {
            prop_assert!((0.0..1.0).contains(c), "color {} out of range", c);
        }
    }

    #[test]
    fn levels_are_sorted_and_contain_zero_once(
        num_isoclines in 1_usize..12,
        offset in -3.0_f64..3.0,
    ) {
        let slope = ClosureSlope(move |x: f64, y: f64| x + y + offset);
        let config = FieldConfig { num_isoclines, resolution: 9, ..FieldConfig::default() };
        let field = evaluate_field(&slope, &config).expect("field");
        prop_assert_eq!(field.levels.iter().filter(|l| **l == 0.0).count(), 1);
        prop_assert!(field.levels.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(
            field.levels.len() == num_isoclines || field.levels.len() == num_isoclines + 1
        );
    }

    #[test]
    fn constant_slopes_give_distinct_levels(c in prop_oneof![Just(0.0), -10.0_f64..10.0]) {
        let slope = ClosureSlope(move |_: f64, _: f64| c);
        let config = FieldConfig { resolution: 7, ..FieldConfig::default() };
        let field = evaluate_field(&slope, &config).expect("field");
        prop_assert_eq!(field.levels.iter().filter(|l| **l == 0.0).count(), 1);
        prop_assert!(field.levels.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(field.levels.len() <= 2);
    }
}
