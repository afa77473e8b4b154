//! Solving implicit first-order equations `F(x, y, dy) = 0` for `dy`.
//!
//! `F` is brought into the form `N(dy) / D(dy)` where `N` and `D` are
//! polynomials in the derivative symbol with coefficients that are arbitrary
//! expressions in the remaining symbols. The roots of `N` up to degree two are
//! written down in closed form.

use crate::equation_engine::{collect_symbols, Compiler, Equation, Expr, Function, VM};
use crate::error::{IsoklinError, IsoklinResult};
use crate::symbolic::{self, add, call, contains_symbol, div, is_zero, mul, neg, num, pow, sub};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const MAX_INTEGER_POWER: u64 = 16;
const MAX_SOLVABLE_DEGREE: usize = 2;
/// Bound on intermediate degrees in the derivative while `F` is expanded.
const MAX_RUNNING_DEGREE: usize = MAX_INTEGER_POWER as usize;
/// Coefficients whose magnitude stays below this at every sample point are zero.
const ZERO_TOLERANCE: f64 = 1e-9;
const SAMPLE_POINTS: usize = 7;

/// Names of the independent variable, the dependent variable and the derivative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Symbols {
    pub independent: String,
    pub dependent: String,
    pub derivative: String,
}

impl Default for Symbols {
    fn default() -> Self {
        Self {
            independent: "x".to_string(),
            dependent: "y".to_string(),
            derivative: "dy".to_string(),
        }
    }
}

impl Symbols {
    /// Variable order expected by compiled slope expressions.
    pub fn field_variables(&self) -> Vec<String> {
        vec![self.independent.clone(), self.dependent.clone()]
    }
}

/// Which root to keep when the equation has several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootPolicy {
    /// The first root in solver order (`-` branch before `+` branch).
    #[default]
    First,
    /// The root at the given position in solver order.
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// The equation does not constrain `dy` at all.
    Independent,
    /// The discriminant of the quadratic is a negative constant.
    NegativeDiscriminant,
    /// Every candidate root zeroes the denominator of `F`.
    ExcludedByDenominator,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Independent => "the equation does not depend on the derivative",
            Self::NegativeDiscriminant => "the discriminant is negative, there is no real root",
            Self::ExcludedByDenominator => "every root makes the denominator vanish",
        };
        f.write_str(text)
    }
}

/// Solution set of an implicit equation for the derivative.
#[derive(Debug, Clone, PartialEq)]
pub enum Solutions {
    Empty(EmptyReason),
    Roots(Vec<Expr>),
}

impl Solutions {
    pub fn roots(&self) -> &[Expr] {
        match self {
            Self::Empty(_) => &[],
            Self::Roots(roots) => roots,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots().is_empty()
    }

    pub fn select(&self, policy: RootPolicy) -> Option<&Expr> {
        match policy {
            RootPolicy::First => self.roots().first(),
            RootPolicy::Index(index) => self.roots().get(index),
        }
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.lhs, self.rhs)
    }
}

/// Polynomial in the derivative symbol; `coeffs[k]` multiplies `dy^k`.
#[derive(Debug, Clone, PartialEq)]
struct Poly {
    coeffs: Vec<Expr>,
}

impl Poly {
    fn constant(value: Expr) -> Self {
        Self {
            coeffs: vec![value],
        }
    }

    fn monomial() -> Self {
        Self {
            coeffs: vec![num(0.0), num(1.0)],
        }
    }

    fn is_one(&self) -> bool {
        matches!(self.coeffs.as_slice(), [Expr::Number(n)] if *n == 1.0)
    }

    fn is_zero(&self) -> bool {
        self.coeffs.iter().all(is_zero)
    }

    fn trimmed(mut self) -> Self {
        while self.coeffs.len() > 1 && self.coeffs.last().is_some_and(is_zero) {
            self.coeffs.pop();
        }
        self
    }

    fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    fn combine(&self, other: &Self, op: fn(Expr, Expr) -> Expr) -> Self {
        let len = self.coeffs.len().max(other.coeffs.len());
        let coeffs = (0..len)
            .map(|k| {
                let a = self.coeffs.get(k).cloned().unwrap_or(num(0.0));
                let b = other.coeffs.get(k).cloned().unwrap_or(num(0.0));
                op(a, b)
            })
            .collect();
        Self { coeffs }.trimmed()
    }

    fn add(&self, other: &Self) -> Self {
        self.combine(other, add)
    }

    fn sub(&self, other: &Self) -> Self {
        self.combine(other, sub)
    }

    fn mul(&self, other: &Self) -> Self {
        if self.is_one() {
            return other.clone();
        }
        if other.is_one() {
            return self.clone();
        }
        let mut coeffs = vec![num(0.0); self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                let term = mul(a.clone(), b.clone());
                coeffs[i + j] = add(coeffs[i + j].clone(), term);
            }
        }
        Self { coeffs }.trimmed()
    }

    fn neg(&self) -> Self {
        Self {
            coeffs: self.coeffs.iter().cloned().map(neg).collect(),
        }
    }

    /// Horner evaluation at a symbolic point.
    fn eval_at(&self, point: &Expr) -> Expr {
        self.coeffs
            .iter()
            .rev()
            .fold(num(0.0), |acc, c| add(mul(acc, point.clone()), c.clone()))
    }
}

/// `num / den`, both polynomials in the derivative symbol.
#[derive(Debug, Clone)]
struct Rational {
    num: Poly,
    den: Poly,
}

impl Rational {
    fn constant(value: Expr) -> Self {
        Self {
            num: Poly::constant(value),
            den: Poly::constant(num(1.0)),
        }
    }

    fn add(self, other: Self) -> Self {
        if self.den == other.den {
            return Self {
                num: self.num.add(&other.num),
                den: self.den,
            };
        }
        Self {
            num: self.num.mul(&other.den).add(&other.num.mul(&self.den)),
            den: self.den.mul(&other.den),
        }
    }

    fn sub(self, other: Self) -> Self {
        self.add(other.neg())
    }

    fn neg(self) -> Self {
        Self {
            num: self.num.neg(),
            den: self.den,
        }
    }

    fn mul(self, other: Self) -> Self {
        Self {
            num: self.num.mul(&other.num),
            den: self.den.mul(&other.den),
        }
    }

    fn div(self, other: Self) -> Result<Self, String> {
        if other.num.is_zero() {
            return Err("division by an expression that is identically zero".to_string());
        }
        Ok(Self {
            num: self.num.mul(&other.den),
            den: self.den.mul(&other.num),
        })
    }

    /// Rejects expansions whose degree in the derivative grows past
    /// [`MAX_RUNNING_DEGREE`], before the coefficient trees blow up.
    fn bounded(self) -> Result<Self, String> {
        let degree = self.num.degree().max(self.den.degree());
        if degree > MAX_RUNNING_DEGREE {
            return Err(format!(
                "expanding the equation reaches degree {degree} in the derivative (limit {MAX_RUNNING_DEGREE})"
            ));
        }
        Ok(self)
    }

    fn powi(self, exponent: i64) -> Result<Self, String> {
        if exponent.unsigned_abs() > MAX_INTEGER_POWER {
            return Err(format!("power {exponent} of the derivative is too large"));
        }
        let base_degree = self.num.degree().max(self.den.degree()) as u64;
        if base_degree * exponent.unsigned_abs() > MAX_RUNNING_DEGREE as u64 {
            return Err(format!(
                "expanding the power {exponent} exceeds degree {MAX_RUNNING_DEGREE} in the derivative"
            ));
        }
        let mut result = Rational::constant(num(1.0));
        for _ in 0..exponent.unsigned_abs() {
            result = result.mul(self.clone());
        }
        if exponent < 0 {
            Rational::constant(num(1.0)).div(result)
        } else {
            Ok(result)
        }
    }
}

fn to_rational(expr: &Expr, derivative: &str) -> Result<Rational, String> {
    if !contains_symbol(expr, derivative) {
        return Ok(Rational::constant(symbolic::simplify(expr)));
    }
    match expr {
        Expr::Variable(_) => Ok(Rational {
            num: Poly::monomial(),
            den: Poly::constant(num(1.0)),
        }),
        Expr::Unary(_, operand) => Ok(to_rational(operand, derivative)?.neg()),
        Expr::Binary(left, '^', right) => {
            if contains_symbol(right, derivative) {
                return Err("the derivative appears in an exponent".to_string());
            }
            match symbolic::simplify(right) {
                Expr::Number(e) if e.is_finite() && e.fract() == 0.0 => {
                    if e.abs() > MAX_INTEGER_POWER as f64 {
                        return Err(format!("power {e} of the derivative is too large"));
                    }
                    to_rational(left, derivative)?.powi(e as i64)
                }
                other => Err(format!(
                    "the derivative is raised to the non-integer power {other}"
                )),
            }
        }
        Expr::Binary(left, op, right) => {
            let l = to_rational(left, derivative)?;
            let r = to_rational(right, derivative)?;
            let combined = match op {
                '+' => l.add(r),
                '-' => l.sub(r),
                '*' => l.mul(r),
                '/' => l.div(r)?,
                other => return Err(format!("unknown operator {other}")),
            };
            combined.bounded()
        }
        Expr::Call(func, _) => Err(format!(
            "the derivative appears inside {}()",
            func.name()
        )),
        Expr::Number(_) => Ok(Rational::constant(symbolic::simplify(expr))),
    }
}

/// Whether `expr` is identically zero, including coefficients like
/// `y*x - x*y` that cancel numerically but not structurally.
///
/// Every free symbol is sampled at a few scattered points; the expression
/// vanishes when it is within [`ZERO_TOLERANCE`] of zero wherever it is
/// defined, and defined at two points at least.
fn vanishes(expr: &Expr) -> bool {
    if let Expr::Number(n) = expr {
        return *n == 0.0;
    }
    let mut symbols = Vec::new();
    collect_symbols(expr, &mut symbols);
    symbols.sort_unstable();
    symbols.dedup();
    let names: Vec<String> = symbols.into_iter().map(str::to_string).collect();
    let Ok(code) = Compiler::new(&names, &[]).compile(expr) else {
        return false;
    };

    let mut stack = Vec::new();
    let mut values = vec![0.0; names.len()];
    let mut defined = 0;
    for k in 0..SAMPLE_POINTS {
        for (i, value) in values.iter_mut().enumerate() {
            let t = 0.61 + 0.73 * k as f64 + 0.29 * i as f64;
            *value = if (k + i) % 2 == 0 { t } else { -t };
        }
        let result = VM::execute(&code, &values, &[], &mut stack);
        if result.is_finite() {
            if result.abs() > ZERO_TOLERANCE {
                return false;
            }
            defined += 1;
        }
    }
    defined >= 2
}

/// Drops leading coefficients that vanish identically.
fn trim_vanishing(mut poly: Poly) -> Poly {
    while poly.coeffs.len() > 1 && poly.coeffs.last().is_some_and(vanishes) {
        poly.coeffs.pop();
    }
    poly
}

fn quadratic_roots(a: Expr, b: Expr, c: Expr) -> Result<Vec<Expr>, EmptyReason> {
    let discriminant = sub(pow(b.clone(), num(2.0)), mul(mul(num(4.0), a.clone()), c));
    let two_a = mul(num(2.0), a);
    let minus_b = neg(b);
    match discriminant {
        Expr::Number(d) if d < 0.0 => Err(EmptyReason::NegativeDiscriminant),
        Expr::Number(d) if d == 0.0 => Ok(vec![div(minus_b, two_a)]),
        discriminant => {
            let root = call(Function::Sqrt, discriminant);
            Ok(vec![
                div(sub(minus_b.clone(), root.clone()), two_a.clone()),
                div(add(minus_b, root), two_a),
            ])
        }
    }
}

/// Solves `equation` for the derivative symbol.
///
/// Roots are returned in a fixed order: the single root of a linear equation,
/// or the `-` branch before the `+` branch of a quadratic.
pub fn solve_for_derivative(equation: &Equation, symbols: &Symbols) -> IsoklinResult<Solutions> {
    let derivative = symbols.derivative.as_str();
    let residual = symbolic::simplify(&sub(equation.lhs.clone(), equation.rhs.clone()));
    let rational =
        to_rational(&residual, derivative).map_err(|reason| IsoklinError::UnsupportedEquation {
            equation: equation.to_string(),
            reason,
        })?;
    let numerator = trim_vanishing(rational.num);

    let candidates = match numerator.degree() {
        0 => return Ok(Solutions::Empty(EmptyReason::Independent)),
        1 => vec![div(neg(numerator.coeffs[0].clone()), numerator.coeffs[1].clone())],
        2 => {
            let [c, b, a]: [Expr; 3] = numerator
                .coeffs
                .try_into()
                .map_err(|_| IsoklinError::UnsupportedEquation {
                    equation: equation.to_string(),
                    reason: "malformed quadratic".to_string(),
                })?;
            match quadratic_roots(a, b, c) {
                Ok(roots) => roots,
                Err(reason) => return Ok(Solutions::Empty(reason)),
            }
        }
        degree => {
            return Err(IsoklinError::UnsupportedEquation {
                equation: equation.to_string(),
                reason: format!(
                    "polynomial of degree {degree} in the derivative (at most {MAX_SOLVABLE_DEGREE} is supported)"
                ),
            })
        }
    };

    let denominator = rational.den.trimmed();
    let roots: Vec<Expr> = candidates
        .into_iter()
        .filter(|root| denominator.is_one() || !vanishes(&denominator.eval_at(root)))
        .collect();
    debug!(equation = %equation, roots = roots.len(), "solved implicit equation");

    if roots.is_empty() {
        return Ok(Solutions::Empty(EmptyReason::ExcludedByDenominator));
    }
    Ok(Solutions::Roots(roots))
}

/// Solves `equation` and keeps one root according to `policy`.
///
/// An empty solution set is an [`IsoklinError::UnsolvableEquation`]; no
/// placeholder slope is ever substituted.
pub fn explicit_derivative(
    equation: &Equation,
    symbols: &Symbols,
    policy: RootPolicy,
) -> IsoklinResult<Expr> {
    let solutions = solve_for_derivative(equation, symbols)?;
    match (&solutions, solutions.select(policy)) {
        (_, Some(root)) => Ok(root.clone()),
        (Solutions::Empty(reason), None) => Err(IsoklinError::UnsolvableEquation {
            equation: equation.to_string(),
            reason: reason.to_string(),
        }),
        (Solutions::Roots(roots), None) => Err(IsoklinError::invalid_config(format!(
            "root policy {policy:?} selects past the {} available root(s)",
            roots.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::{compile_scalar_expression, parse_equation, VM};

    fn solve(input: &str) -> IsoklinResult<Solutions> {
        let equation = parse_equation(input).expect("equation should parse");
        solve_for_derivative(&equation, &Symbols::default())
    }

    fn eval_at(expr: &Expr, x: f64, y: f64) -> f64 {
        let vars = Symbols::default().field_variables();
        let code = compile_scalar_expression(&expr.to_string(), &vars, &[])
            .expect("root should compile");
        VM::execute(&code, &[x, y], &[], &mut Vec::new())
    }

    #[test]
    fn linear_equation_matches_closed_form() {
        let solutions = solve("y*(dy + x) - 1 = 0").expect("equation should solve");
        let root = solutions.select(RootPolicy::First).expect("one root");
        assert_eq!(solutions.roots().len(), 1);
        assert!(!contains_symbol(root, "dy"));
        for (x, y) in [(1.0, 2.0), (-3.0, 0.5), (0.25, -1.5), (2.0, 4.0)] {
            let expected = 1.0 / y - x;
            assert!((eval_at(root, x, y) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn explicit_form_is_solved_trivially() {
        let solutions = solve("dy = (y - x)/(y^2 + 1)").expect("equation should solve");
        let root = solutions.select(RootPolicy::First).expect("one root");
        assert!((eval_at(root, 2.0, 0.0) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn quadratic_roots_come_minus_branch_first() {
        let solutions = solve("dy^2 = x^2 + y^2").expect("equation should solve");
        assert_eq!(solutions.roots().len(), 2);
        let first = solutions.select(RootPolicy::First).expect("first root");
        let second = solutions.select(RootPolicy::Index(1)).expect("second root");
        assert!((eval_at(first, 3.0, 4.0) + 5.0).abs() < 1e-12);
        assert!((eval_at(second, 3.0, 4.0) - 5.0).abs() < 1e-12);
        assert!(solutions.select(RootPolicy::Index(2)).is_none());
    }

    #[test]
    fn repeated_root_is_reported_once() {
        let solutions = solve("dy^2 - 2*dy + 1 = 0").expect("equation should solve");
        assert_eq!(solutions.roots(), &[num(1.0)]);
    }

    #[test]
    fn negative_discriminant_has_no_solution() {
        let solutions = solve("dy^2 + 1 = 0").expect("equation should solve");
        assert_eq!(solutions, Solutions::Empty(EmptyReason::NegativeDiscriminant));
    }

    #[test]
    fn equation_without_derivative_has_no_solution() {
        assert_eq!(
            solve("x = 1").expect("equation should solve"),
            Solutions::Empty(EmptyReason::Independent)
        );
        assert_eq!(
            solve("dy - dy + 1 = 0").expect("equation should solve"),
            Solutions::Empty(EmptyReason::Independent)
        );
    }

    #[test]
    fn rational_equation_clears_denominator() {
        let solutions = solve("1/dy = x").expect("equation should solve");
        let root = solutions.select(RootPolicy::First).expect("one root");
        assert!((eval_at(root, 4.0, 0.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn root_zeroing_constant_denominator_is_dropped() {
        // (dy^2 - 1)/(dy - 1) = 0 has the removable root dy = 1.
        let solutions = solve("(dy^2 - 1)/(dy - 1) = 0").expect("equation should solve");
        assert_eq!(solutions.roots(), &[num(-1.0)]);
    }

    #[test]
    fn unsupported_forms_are_errors() {
        assert!(matches!(
            solve("sin(dy) = x"),
            Err(IsoklinError::UnsupportedEquation { .. })
        ));
        assert!(matches!(
            solve("dy^3 = x"),
            Err(IsoklinError::UnsupportedEquation { .. })
        ));
        assert!(matches!(
            solve("x^dy = 2"),
            Err(IsoklinError::UnsupportedEquation { .. })
        ));
    }

    #[test]
    fn huge_and_nested_powers_are_rejected() {
        for input in [
            "dy^(-1e19) = x",
            "dy^1e19 = x",
            "dy^17 = x",
            "((dy + x)^16)^16 = 0",
            "(dy^4)^5 = y",
        ] {
            match solve(input) {
                Err(IsoklinError::UnsupportedEquation { reason, .. }) => {
                    assert!(reason.contains("power") || reason.contains("degree"), "{reason}")
                }
                other => panic!("{input}: expected unsupported equation, got {other:?}"),
            }
        }
    }

    #[test]
    fn coefficients_that_cancel_lower_the_degree() {
        let solutions = solve("y*x*dy^2 - x*y*dy^2 + dy = x").expect("equation should solve");
        assert_eq!(solutions.roots().len(), 1);
        let root = solutions.select(RootPolicy::First).expect("one root");
        assert_eq!(eval_at(root, 1.0, 2.0), 1.0);
        assert_eq!(eval_at(root, -3.0, 0.5), -3.0);

        assert_eq!(
            solve("y*x*dy - x*y*dy = 1").expect("equation should solve"),
            Solutions::Empty(EmptyReason::Independent)
        );
    }

    #[test]
    fn explicit_derivative_reports_unsolvable_equation() {
        let equation = parse_equation("dy^2 + 1 = 0").expect("equation should parse");
        let err = explicit_derivative(&equation, &Symbols::default(), RootPolicy::First)
            .expect_err("no real root");
        match err {
            IsoklinError::UnsolvableEquation { equation, reason } => {
                assert_eq!(equation, "dy^2 + 1 = 0");
                assert!(reason.contains("discriminant"));
            }
            other => panic!("expected unsolvable equation, got {other:?}"),
        }
    }

    #[test]
    fn custom_symbol_names_are_respected() {
        let symbols = Symbols {
            independent: "t".to_string(),
            dependent: "u".to_string(),
            derivative: "du".to_string(),
        };
        let equation = parse_equation("du + u*t = 0").expect("equation should parse");
        let root = explicit_derivative(&equation, &symbols, RootPolicy::First)
            .expect("equation should solve");
        let code = compile_scalar_expression(&root.to_string(), &symbols.field_variables(), &[])
            .expect("root should compile");
        assert!((VM::execute(&code, &[2.0_f64, 3.0], &[], &mut Vec::new()) + 6.0).abs() < 1e-12);
    }
}
