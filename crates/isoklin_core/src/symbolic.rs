//! Symbolic manipulation of equation-engine expressions.
//!
//! The builders below fold constants and drop neutral elements as they go, so
//! coefficients produced by the implicit solver stay readable and a vanishing
//! coefficient shows up as a literal `Number(0.0)`.

use crate::equation_engine::{Expr, Function};
use std::fmt;

pub fn num(value: f64) -> Expr {
    Expr::Number(value)
}

pub fn var(name: &str) -> Expr {
    Expr::Variable(name.to_string())
}

pub fn is_zero(expr: &Expr) -> bool {
    matches!(expr, Expr::Number(n) if *n == 0.0)
}

fn is_value(expr: &Expr, value: f64) -> bool {
    matches!(expr, Expr::Number(n) if *n == value)
}

fn binary(left: Expr, op: char, right: Expr) -> Expr {
    Expr::Binary(Box::new(left), op, Box::new(right))
}

pub fn add(a: Expr, b: Expr) -> Expr {
    match (a, b) {
        (Expr::Number(x), Expr::Number(y)) => num(x + y),
        (a, b) if is_zero(&a) => b,
        (a, b) if is_zero(&b) => a,
        (a, Expr::Unary(_, negated)) => sub(a, *negated),
        (a, Expr::Number(y)) if y < 0.0 => sub(a, num(-y)),
        (a, b) => binary(a, '+', b),
    }
}

pub fn sub(a: Expr, b: Expr) -> Expr {
    match (a, b) {
        (Expr::Number(x), Expr::Number(y)) => num(x - y),
        (a, b) if is_zero(&b) => a,
        (a, b) if is_zero(&a) => neg(b),
        (a, b) if a == b => num(0.0),
        (a, Expr::Unary(_, negated)) => add(a, *negated),
        (a, Expr::Number(y)) if y < 0.0 => add(a, num(-y)),
        (a, b) => binary(a, '-', b),
    }
}

pub fn mul(a: Expr, b: Expr) -> Expr {
    match (a, b) {
        (Expr::Number(x), Expr::Number(y)) => num(x * y),
        (a, b) if is_zero(&a) || is_zero(&b) => num(0.0),
        (a, b) if is_value(&a, 1.0) => b,
        (a, b) if is_value(&b, 1.0) => a,
        (a, b) if is_value(&a, -1.0) => neg(b),
        (a, b) if is_value(&b, -1.0) => neg(a),
        (Expr::Unary(_, p), Expr::Unary(_, q)) => mul(*p, *q),
        (Expr::Unary(_, p), b) => neg(mul(*p, b)),
        (a, Expr::Unary(_, q)) => neg(mul(a, *q)),
        (a, b) => binary(a, '*', b),
    }
}

pub fn div(a: Expr, b: Expr) -> Expr {
    match (a, b) {
        (Expr::Number(x), Expr::Number(y)) if y != 0.0 => num(x / y),
        (a, b) if is_zero(&a) && !is_zero(&b) => num(0.0),
        (a, b) if is_value(&b, 1.0) => a,
        (a, b) if is_value(&b, -1.0) => neg(a),
        (a, b) if a == b && !is_zero(&a) => num(1.0),
        (Expr::Unary(_, p), Expr::Unary(_, q)) => div(*p, *q),
        (Expr::Unary(_, p), b) => neg(div(*p, b)),
        (a, Expr::Unary(_, q)) => neg(div(a, *q)),
        (a, b) => binary(a, '/', b),
    }
}

pub fn pow(base: Expr, exponent: Expr) -> Expr {
    match (base, exponent) {
        (Expr::Number(x), Expr::Number(y)) if x.powf(y).is_finite() => num(x.powf(y)),
        (_, e) if is_zero(&e) => num(1.0),
        (b, e) if is_value(&e, 1.0) => b,
        (b, _) if is_value(&b, 1.0) => num(1.0),
        (b, e) => binary(b, '^', e),
    }
}

pub fn neg(a: Expr) -> Expr {
    match a {
        Expr::Number(x) => num(-x),
        Expr::Unary(_, inner) => *inner,
        Expr::Binary(left, '-', right) => sub(*right, *left),
        Expr::Binary(left, op @ ('*' | '/'), right) if matches!(*left, Expr::Number(n) if n < 0.0) => {
            binary(neg(*left), op, *right)
        }
        other => Expr::Unary('-', Box::new(other)),
    }
}

pub fn call(func: Function, arg: Expr) -> Expr {
    if let Expr::Number(x) = arg {
        let value = func.apply(x);
        if value.is_finite() {
            return num(value);
        }
    }
    Expr::Call(func, Box::new(arg))
}

/// Rebuilds `expr` bottom-up through the folding builders.
pub fn simplify(expr: &Expr) -> Expr {
    match expr {
        Expr::Number(n) => num(*n),
        Expr::Variable(name) => var(name),
        Expr::Unary(_, operand) => neg(simplify(operand)),
        Expr::Call(func, arg) => call(*func, simplify(arg)),
        Expr::Binary(left, op, right) => {
            let (l, r) = (simplify(left), simplify(right));
            match op {
                '+' => add(l, r),
                '-' => sub(l, r),
                '*' => mul(l, r),
                '/' => div(l, r),
                '^' => pow(l, r),
                other => binary(l, *other, r),
            }
        }
    }
}

pub fn contains_symbol(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Number(_) => false,
        Expr::Variable(v) => v == name,
        Expr::Binary(left, _, right) => contains_symbol(left, name) || contains_symbol(right, name),
        Expr::Unary(_, operand) | Expr::Call(_, operand) => contains_symbol(operand, name),
    }
}

/// Replaces every occurrence of `name` with `replacement`, simplifying the result.
pub fn substitute(expr: &Expr, name: &str, replacement: &Expr) -> Expr {
    match expr {
        Expr::Variable(v) if v == name => replacement.clone(),
        Expr::Number(_) | Expr::Variable(_) => expr.clone(),
        Expr::Unary(_, operand) => neg(substitute(operand, name, replacement)),
        Expr::Call(func, arg) => call(*func, substitute(arg, name, replacement)),
        Expr::Binary(left, op, right) => simplify(&binary(
            substitute(left, name, replacement),
            *op,
            substitute(right, name, replacement),
        )),
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary(_, '+' | '-', _) => 1,
        Expr::Binary(_, '*' | '/', _) => 2,
        Expr::Unary(..) => 3,
        Expr::Number(n) if *n < 0.0 => 3,
        Expr::Binary(_, '^', _) => 4,
        _ => 5,
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Variable(name) => f.write_str(name),
            Expr::Call(func, arg) => write!(f, "{}({arg})", func.name()),
            Expr::Unary(_, operand) => {
                f.write_str("-")?;
                write_operand(f, operand, precedence(operand) <= 3)
            }
            Expr::Binary(left, op, right) => {
                let own = precedence(self);
                let (lp, rp) = (precedence(left), precedence(right));
                let (left_parens, right_parens) = if *op == '^' {
                    (lp <= own, rp < own)
                } else {
                    (lp < own, rp < own || (rp == own && matches!(op, '-' | '/')))
                };
                write_operand(f, left, left_parens)?;
                match op {
                    '+' | '-' => write!(f, " {op} ")?,
                    _ => write!(f, "{op}")?,
                }
                write_operand(f, right, right_parens)
            }
        }
    }
}
