use crate::equation_engine::{parse, validate_expression_symbols, Bytecode, Compiler, Expr, VM};
use crate::error::IsoklinResult;
use crate::implicit::Symbols;
use crate::traits::SlopeFunction;
use std::collections::BTreeMap;
use tracing::debug;

/// An explicit derivative `dy/dx = f(x, y)` compiled once for array evaluation.
#[derive(Debug, Clone)]
pub struct SlopeExpression {
    expr: Expr,
    bytecode: Bytecode,
    params: Vec<f64>,
}

impl SlopeExpression {
    /// Compiles `expr` with variables `[independent, dependent]` and the given
    /// named parameters. Any other identifier, including the derivative
    /// symbol, is rejected.
    pub fn compile(
        expr: &Expr,
        symbols: &Symbols,
        params: &BTreeMap<String, f64>,
    ) -> IsoklinResult<Self> {
        let var_names = symbols.field_variables();
        let param_names: Vec<String> = params.keys().cloned().collect();
        validate_expression_symbols(expr, &var_names, &param_names)?;
        let bytecode = Compiler::new(&var_names, &param_names).compile(expr)?;
        debug!(expression = %expr, ops = bytecode.ops().len(), "compiled slope expression");
        Ok(Self {
            expr: expr.clone(),
            bytecode,
            params: params.values().copied().collect(),
        })
    }

    pub fn parse(
        text: &str,
        symbols: &Symbols,
        params: &BTreeMap<String, f64>,
    ) -> IsoklinResult<Self> {
        Self::compile(&parse(text)?, symbols, params)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Slope at a single point.
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let mut stack = Vec::with_capacity(16);
        VM::execute(&self.bytecode, &[x, y], &self.params, &mut stack)
    }
}

impl SlopeFunction for SlopeExpression {
    fn slopes(&self, x: &[f64], y: &[f64], out: &mut [f64]) {
        VM::execute_columns(&self.bytecode, &[x, y], &self.params, out);
    }
}
