use crate::error::{IsoklinError, IsoklinResult};
use crate::traits::Scalar;
use std::collections::{HashMap, HashSet};

/// Elementary functions understood by the parser, the simplifier and the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Sqrt,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "exp" => Self::Exp,
            "ln" | "log" => Self::Ln,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
        }
    }

    pub fn apply<T: Scalar>(self, a: T) -> T {
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Sinh => a.sinh(),
            Self::Cosh => a.cosh(),
            Self::Tanh => a.tanh(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
        }
    }
}

/// OpCodes for the Stack-based Virtual Machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index) onto the stack.
    /// Indices correspond to the order variables were defined (e.g., 0=x, 1=y).
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Func(Function),
}

/// Represents a compiled sequence of operations.
///
/// Only the [`Compiler`] builds bytecode, so every sequence leaves exactly one
/// value on the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }
}

fn apply_binary<T: Scalar>(op: OpCode, a: T, b: T) -> T {
    match op {
        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Pow => a.powf(b),
        _ => T::nan(),
    }
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; every entry point takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Variable values (read-only).
/// - `params`: Parameter vector (read-only).
pub struct VM;

impl VM {
    /// Evaluates the bytecode at a single point.
    ///
    /// `stack` is a scratch buffer for intermediate values; it is cleared on entry.
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        params: &[T],
        stack: &mut Vec<T>,
    ) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(T::from_f64(val).unwrap_or_else(T::nan)),
                OpCode::LoadVar(idx) => stack.push(vars[idx]),
                OpCode::LoadParam(idx) => stack.push(params[idx]),
                OpCode::Neg => {
                    let a = stack.pop().unwrap_or_else(T::nan);
                    stack.push(-a);
                }
                OpCode::Func(func) => {
                    let a = stack.pop().unwrap_or_else(T::nan);
                    stack.push(func.apply(a));
                }
                binary => {
                    let b = stack.pop().unwrap_or_else(T::nan);
                    let a = stack.pop().unwrap_or_else(T::nan);
                    stack.push(apply_binary(binary, a, b));
                }
            }
        }

        stack.pop().unwrap_or_else(T::nan)
    }

    /// Evaluates the bytecode over whole columns at once.
    ///
    /// Every opcode is applied to a full column before the next one runs, so a
    /// grid of any size costs one pass over the instruction list.
    /// `columns[i]` holds the values of variable `i`; each column must be at
    /// least `out.len()` long.
    pub fn execute_columns(
        bytecode: &Bytecode,
        columns: &[&[f64]],
        params: &[f64],
        out: &mut [f64],
    ) {
        let len = out.len();
        let mut stack: Vec<Vec<f64>> = Vec::new();
        let mut spare: Vec<Vec<f64>> = Vec::new();
        let take = |spare: &mut Vec<Vec<f64>>| {
            let mut buf = spare.pop().unwrap_or_else(|| Vec::with_capacity(len));
            buf.clear();
            buf
        };

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => {
                    let mut buf = take(&mut spare);
                    buf.resize(len, val);
                    stack.push(buf);
                }
                OpCode::LoadParam(idx) => {
                    let mut buf = take(&mut spare);
                    buf.resize(len, params[idx]);
                    stack.push(buf);
                }
                OpCode::LoadVar(idx) => {
                    let mut buf = take(&mut spare);
                    buf.extend_from_slice(&columns[idx][..len]);
                    stack.push(buf);
                }
                OpCode::Neg => {
                    if let Some(a) = stack.last_mut() {
                        a.iter_mut().for_each(|v| *v = -*v);
                    }
                }
                OpCode::Func(func) => {
                    if let Some(a) = stack.last_mut() {
                        a.iter_mut().for_each(|v| *v = func.apply(*v));
                    }
                }
                binary => {
                    let (Some(b), Some(a)) = (stack.pop(), stack.last_mut()) else {
                        out.fill(f64::NAN);
                        return;
                    };
                    for (ai, bi) in a.iter_mut().zip(&b) {
                        *ai = apply_binary(binary, *ai, *bi);
                    }
                    spare.push(b);
                }
            }
        }

        match stack.pop() {
            Some(result) => out.copy_from_slice(&result),
            None => out.fill(f64::NAN),
        }
    }
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // only '-'
    Call(Function, Box<Expr>),
}

/// `lhs = rhs` as written by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let mut var_map = HashMap::new();
        for (i, name) in var_names.iter().enumerate() {
            var_map.insert(name.clone(), i);
        }

        let mut param_map = HashMap::new();
        for (i, name) in param_names.iter().enumerate() {
            param_map.insert(name.clone(), i);
        }

        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> IsoklinResult<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> IsoklinResult<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    return Err(IsoklinError::UnknownSymbol(name.clone()));
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                let code = match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    other => {
                        return Err(IsoklinError::Parse {
                            position: 0,
                            message: format!("Unknown binary operator: {other}"),
                        })
                    }
                };
                ops.push(code);
            }
            Expr::Unary(_, operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Func(*func));
            }
        }
        Ok(())
    }
}

/// Parses, validates and compiles a scalar expression in one go.
pub fn compile_scalar_expression(
    expression: &str,
    var_names: &[String],
    param_names: &[String],
) -> IsoklinResult<Bytecode> {
    let parsed = parse(expression)?;
    validate_expression_symbols(&parsed, var_names, param_names)?;
    Compiler::new(var_names, param_names).compile(&parsed)
}

/// Rejects identifiers that are neither variables nor parameters.
pub fn validate_expression_symbols(
    expr: &Expr,
    var_names: &[String],
    param_names: &[String],
) -> IsoklinResult<()> {
    let known: HashSet<&str> = var_names
        .iter()
        .chain(param_names)
        .map(String::as_str)
        .collect();
    let mut names = Vec::new();
    collect_symbols(expr, &mut names);
    match names.into_iter().find(|name| !known.contains(name)) {
        Some(name) => Err(IsoklinError::UnknownSymbol(name.to_string())),
        None => Ok(()),
    }
}

/// Collects every identifier in `expr`, in order of appearance.
pub fn collect_symbols<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Variable(name) => out.push(name.as_str()),
        Expr::Binary(left, _, right) => {
            collect_symbols(left, out);
            collect_symbols(right, out);
        }
        Expr::Unary(_, operand) | Expr::Call(_, operand) => collect_symbols(operand, out),
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> IsoklinResult<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count(),
    };
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses `lhs = rhs`. Input without `=` is read as `expr = 0`.
pub fn parse_equation(input: &str) -> IsoklinResult<Equation> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count(),
    };
    let lhs = parser.parse_expression()?;
    let rhs = if matches!(parser.peek(), Some(Token::Equals)) {
        parser.consume();
        parser.parse_expression()?
    } else {
        Expr::Number(0.0)
    };
    parser.expect_end()?;
    Ok(Equation { lhs, rhs })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Equals,
}

fn tokenize(input: &str) -> IsoklinResult<Vec<(Token, usize)>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent only when followed by digits, so `2e` stays an error.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| IsoklinError::Parse {
                position: start,
                message: format!("Invalid number '{text}'"),
            })?;
            tokens.push((Token::Number(value), start));
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((Token::Identifier(chars[start..i].iter().collect()), start));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '=' => Token::Equals,
                other => {
                    return Err(IsoklinError::Parse {
                        position: start,
                        message: format!("Unexpected character '{other}'"),
                    })
                }
            };
            tokens.push((token, start));
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, position)| *position)
            .unwrap_or(self.end)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> IsoklinError {
        IsoklinError::Parse {
            position: self.position(),
            message: message.into(),
        }
    }

    fn expect_end(&self) -> IsoklinResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("Unexpected trailing token {token:?}"))),
        }
    }

    fn expect_rparen(&mut self) -> IsoklinResult<()> {
        match self.peek() {
            Some(Token::RParen) => {
                self.consume();
                Ok(())
            }
            _ => Err(self.error("Expected ')'")),
        }
    }

    fn parse_expression(&mut self) -> IsoklinResult<Expr> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> IsoklinResult<Expr> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> IsoklinResult<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> IsoklinResult<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary('-', Box::new(expr)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // Right associative: a^b^c = a^(b^c); the exponent may carry its own sign.
    fn parse_power(&mut self) -> IsoklinResult<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> IsoklinResult<Expr> {
        let position = self.position();
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let func = Function::from_name(&name)
                        .ok_or_else(|| IsoklinError::UnknownFunction(name.clone()))?;
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(func, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(token) => Err(IsoklinError::Parse {
                position,
                message: format!("Unexpected token {token:?}"),
            }),
            None => Err(IsoklinError::Parse {
                position,
                message: "Unexpected end of input".to_string(),
            }),
        }
    }
}
