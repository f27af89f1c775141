use crate::error::EvaluationError;
use crate::traits::{BoundExpression, Evaluator};
use std::cell::RefCell;
use std::f64::consts::{E, PI};

/// Name of the single free variable every expression is written in.
pub const VARIABLE: &str = "x";

/// Named functions understood by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    /// Natural logarithm; both `ln` and `log` resolve here.
    Ln,
    Sqrt,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "tan" => Some(Self::Tan),
            "exp" => Some(Self::Exp),
            "ln" | "log" => Some(Self::Ln),
            "sqrt" => Some(Self::Sqrt),
            "abs" => Some(Self::Abs),
            _ => None,
        }
    }

    fn apply(self, a: f64) -> f64 {
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(f64),
    /// Pushes the value of `x` onto the stack.
    LoadVar,
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
    Call(Function),
}

/// A compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based virtual machine.
///
/// The VM is stateless; `execute` receives the bytecode, the value of `x`
/// and a scratch stack owned by the caller so sampling loops do not
/// allocate per point.
pub struct VM;

impl VM {
    pub fn execute(bytecode: &Bytecode, x: f64, stack: &mut Vec<f64>) -> f64 {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(val),
                OpCode::LoadVar => stack.push(x),
                OpCode::Add => Self::binary(stack, |a, b| a + b),
                OpCode::Sub => Self::binary(stack, |a, b| a - b),
                OpCode::Mul => Self::binary(stack, |a, b| a * b),
                OpCode::Div => Self::binary(stack, |a, b| a / b),
                OpCode::Pow => Self::binary(stack, f64::powf),
                OpCode::Neg => Self::unary(stack, |a| -a),
                OpCode::Call(func) => Self::unary(stack, |a| func.apply(a)),
            }
        }

        // Compiled bytecode always leaves exactly one value behind.
        stack.pop().unwrap_or(f64::NAN)
    }

    fn binary(stack: &mut Vec<f64>, f: impl Fn(f64, f64) -> f64) {
        let b = stack.pop().unwrap_or(f64::NAN);
        let a = stack.pop().unwrap_or(f64::NAN);
        stack.push(f(a, b));
    }

    fn unary(stack: &mut Vec<f64>, f: impl Fn(f64) -> f64) {
        let a = stack.pop().unwrap_or(f64::NAN);
        stack.push(f(a));
    }
}

// --- AST & Compiler ---

/// Abstract syntax tree of a parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Compiles an AST into `Bytecode`, resolving names against the single
/// free variable and the built-in constants `e` and `pi`.
pub struct Compiler;

impl Compiler {
    pub fn compile(expr: &Expr) -> Result<Bytecode, EvaluationError> {
        let mut ops = Vec::new();
        Self::compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), EvaluationError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => match name.as_str() {
                VARIABLE => ops.push(OpCode::LoadVar),
                "e" => ops.push(OpCode::LoadConst(E)),
                "pi" => ops.push(OpCode::LoadConst(PI)),
                _ => return Err(EvaluationError::UnknownVariable(name.clone())),
            },
            Expr::Binary(left, op, right) => {
                Self::compile_recursive(left, ops)?;
                Self::compile_recursive(right, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Expr::Neg(operand) => {
                Self::compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(name, arg) => {
                let func = Function::from_name(name)
                    .ok_or_else(|| EvaluationError::UnknownFunction(name.clone()))?;
                Self::compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(func));
            }
        }
        Ok(())
    }
}

// --- Parser ---

/// Parses a string expression into an AST.
///
/// Precedence, loosest first: `+ -`, `* /`, unary minus, `^`. Exponentiation
/// is right-associative and its exponent may carry a sign, so `x^-1` and
/// `2^3^2` parse as expected while `-x^2` means `-(x^2)`.
pub fn parse(input: &str) -> Result<Expr, EvaluationError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count(),
        depth: 0,
    };
    if parser.tokens.is_empty() {
        return Err(EvaluationError::parse("Empty expression", 0));
    }
    let expr = parser.parse_expression()?;
    if let Some((token, at)) = parser.peek() {
        return Err(EvaluationError::parse(
            format!("Unexpected token {token:?}"),
            at,
        ));
    }
    Ok(expr)
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
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, EvaluationError> {
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
            // Scientific notation only when digits follow, so `2e` stays a
            // number followed by the identifier `e`.
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
            let literal: String = chars[start..i].iter().collect();
            let value = literal.parse::<f64>().map_err(|_| {
                EvaluationError::parse(format!("Invalid number '{literal}'"), start)
            })?;
            tokens.push((Token::Number(value), start));
        } else if c.is_alphabetic() {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            tokens.push((Token::Identifier(ident), start));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => {
                    return Err(EvaluationError::parse(
                        format!("Unexpected character '{c}'"),
                        start,
                    ))
                }
            };
            tokens.push((token, start));
            i += 1;
        }
    }
    Ok(tokens)
}

/// Deepest AST the parser will build. Nested parentheses, unary signs,
/// exponents and chained operators each count one level.
const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<(Token, usize)> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, at)| *at)
    }

    fn descend(&mut self) -> Result<(), EvaluationError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvaluationError::parse(
                "Expression nested too deeply",
                self.position(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn expect_rparen(&mut self) -> Result<(), EvaluationError> {
        let at = self.position();
        match self.consume() {
            Some((Token::RParen, _)) => Ok(()),
            _ => Err(EvaluationError::parse("Expected ')'", at)),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, EvaluationError> {
        let depth = self.depth;
        let mut left = self.parse_term()?;

        while let Some((token, _)) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvaluationError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;

        while let Some((token, _)) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            self.descend()?;
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    // Every recursive path passes through here, so the depth check bounds
    // both the parser's own stack and the AST handed to later passes.
    fn parse_unary(&mut self) -> Result<Expr, EvaluationError> {
        self.descend()?;
        let expr = match self.peek() {
            Some((Token::Minus, _)) => {
                self.consume();
                Expr::Neg(Box::new(self.parse_unary()?))
            }
            Some((Token::Plus, _)) => {
                self.consume();
                self.parse_unary()?
            }
            _ => self.parse_power()?,
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_power(&mut self) -> Result<Expr, EvaluationError> {
        let base = self.parse_primary()?;
        if let Some((Token::Caret, _)) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(
                Box::new(base),
                BinaryOp::Pow,
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvaluationError> {
        let at = self.position();
        match self.consume() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Identifier(name), _)) => {
                if let Some((Token::LParen, _)) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some((Token::LParen, _)) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some((token, _)) => Err(EvaluationError::parse(
                format!("Unexpected token {token:?}"),
                at,
            )),
            None => Err(EvaluationError::parse("Unexpected end of input", at)),
        }
    }
}

/// Parses and compiles `expression` in one step.
pub fn compile_expression(expression: &str) -> Result<CompiledExpression, EvaluationError> {
    let parsed = parse(expression)?;
    let bytecode = Compiler::compile(&parsed)?;
    Ok(CompiledExpression::new(bytecode))
}

/// Bytecode plus the scratch stack it runs on.
pub struct CompiledExpression {
    pub bytecode: Bytecode,
    // Interior mutability for the VM stack to avoid allocation per sample.
    // This makes the expression !Sync; bind one per thread.
    stack: RefCell<Vec<f64>>,
}

impl CompiledExpression {
    pub fn new(bytecode: Bytecode) -> Self {
        Self {
            bytecode,
            stack: RefCell::new(Vec::with_capacity(16)),
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, x, &mut stack)
    }
}

/// The built-in [`Evaluator`]: parse, compile to bytecode, run on the VM.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmEvaluator;

impl Evaluator for VmEvaluator {
    fn evaluate(&self, expression: &str, x: f64) -> Result<f64, EvaluationError> {
        Ok(compile_expression(expression)?.eval(x))
    }

    fn bind<'a>(&'a self, expression: &'a str) -> BoundExpression<'a> {
        match compile_expression(expression) {
            Ok(compiled) => Box::new(move |x| Ok(compiled.eval(x))),
            Err(err) => Box::new(move |_| Err(err.clone())),
        }
    }
}
