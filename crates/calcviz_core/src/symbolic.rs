//! Closed-form derivatives and antiderivatives for a fixed table of
//! single-variable patterns.
//!
//! Expressions are parsed with the equation engine and matched on the AST,
//! so `x^(-1)`, `x ^ -1` and `X^-1` all classify the same way. Anything
//! outside the table degrades to a tagged [`SymbolicResult`] rather than an
//! error.

use crate::equation_engine::{parse, BinaryOp, Expr, VARIABLE};
use log::debug;
use std::fmt;

/// Classification of an expression against the pattern table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pattern {
    /// A signed numeric literal `c`.
    Constant(f64),
    /// Exactly `x`.
    Identity,
    /// `x^n`.
    Power(f64),
    /// `a*x`.
    Linear(f64),
    /// `a*x^n`.
    ScaledPower { coefficient: f64, exponent: f64 },
    Sin,
    Cos,
    /// `e^x` or `exp(x)`.
    Exp,
    /// `ln(x)` or `log(x)`.
    Ln,
    /// `1/x`.
    Reciprocal,
    Unrecognized,
}

/// Outcome of a symbolic derivative or antiderivative request.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolicResult {
    /// An exact expression, safe to evaluate.
    Closed(String),
    /// No closed-form derivative; evaluate the original expression's
    /// derivative numerically instead.
    Numeric(String),
    /// No closed-form antiderivative. Display only.
    Unknown(String),
}

impl SymbolicResult {
    /// The closed-form expression, or the original expression for the
    /// fallback variants.
    pub fn expression(&self) -> &str {
        match self {
            Self::Closed(expr) | Self::Numeric(expr) | Self::Unknown(expr) => expr,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl fmt::Display for SymbolicResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(expr) => write!(f, "{expr}"),
            Self::Numeric(original) => write!(f, "derivative({original})"),
            Self::Unknown(original) => write!(f, "antiderivative({original}) + C"),
        }
    }
}

/// Trims and lowercases an expression before classification.
pub fn normalize(expression: &str) -> String {
    expression.trim().to_lowercase()
}

/// Formats a coefficient or exponent the way it appears in output
/// expressions: shortest round-trip decimal, never `-0`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else {
        format!("{value}")
    }
}

/// Classifies `expression` against the pattern table.
pub fn classify(expression: &str) -> Pattern {
    match parse(&normalize(expression)) {
        Ok(expr) => classify_expr(&expr),
        Err(_) => Pattern::Unrecognized,
    }
}

fn classify_expr(expr: &Expr) -> Pattern {
    if let Some(c) = signed_number(expr) {
        return Pattern::Constant(c);
    }
    if is_variable(expr, VARIABLE) {
        return Pattern::Identity;
    }

    match expr {
        Expr::Binary(base, BinaryOp::Pow, exponent) if is_variable(base, VARIABLE) => {
            signed_number(exponent).map_or(Pattern::Unrecognized, Pattern::Power)
        }
        Expr::Binary(base, BinaryOp::Pow, exponent)
            if is_variable(base, "e") && is_variable(exponent, VARIABLE) =>
        {
            Pattern::Exp
        }
        Expr::Binary(coefficient, BinaryOp::Mul, rest) => {
            let Some(a) = signed_number(coefficient) else {
                return Pattern::Unrecognized;
            };
            match &**rest {
                r if is_variable(r, VARIABLE) => Pattern::Linear(a),
                Expr::Binary(base, BinaryOp::Pow, exponent) if is_variable(base, VARIABLE) => {
                    signed_number(exponent).map_or(Pattern::Unrecognized, |n| {
                        Pattern::ScaledPower {
                            coefficient: a,
                            exponent: n,
                        }
                    })
                }
                _ => Pattern::Unrecognized,
            }
        }
        Expr::Binary(numerator, BinaryOp::Div, denominator)
            if signed_number(numerator) == Some(1.0) && is_variable(denominator, VARIABLE) =>
        {
            Pattern::Reciprocal
        }
        Expr::Call(name, arg) if is_variable(arg, VARIABLE) => match name.as_str() {
            "sin" => Pattern::Sin,
            "cos" => Pattern::Cos,
            "exp" => Pattern::Exp,
            "ln" | "log" => Pattern::Ln,
            _ => Pattern::Unrecognized,
        },
        _ => Pattern::Unrecognized,
    }
}

fn signed_number(expr: &Expr) -> Option<f64> {
    let value = match expr {
        Expr::Number(n) => *n,
        Expr::Neg(inner) => match &**inner {
            Expr::Number(n) => -*n,
            _ => return None,
        },
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn is_variable(expr: &Expr, name: &str) -> bool {
    matches!(expr, Expr::Variable(v) if v == name)
}

impl Pattern {
    /// Closed-form derivative, if the pattern table has one.
    ///
    /// `normalized` is the trimmed, lowercased source and is returned as-is
    /// for self-derivative patterns.
    pub fn derivative(self, normalized: &str) -> Option<String> {
        let expr = match self {
            Self::Constant(_) => "0".to_string(),
            Self::Identity => "1".to_string(),
            Self::Power(n) if n == 0.0 => "0".to_string(),
            Self::Power(n) if n == 1.0 => "1".to_string(),
            Self::Power(n) if n == 2.0 => "2*x".to_string(),
            Self::Power(n) => format!("{}*x^{}", format_number(n), format_number(n - 1.0)),
            Self::Linear(a) => format_number(a),
            Self::ScaledPower { exponent, .. } if exponent == 0.0 => "0".to_string(),
            Self::ScaledPower {
                coefficient,
                exponent,
            } if exponent == 1.0 => format_number(coefficient),
            Self::ScaledPower {
                coefficient,
                exponent,
            } => format!(
                "{}*x^{}",
                format_number(coefficient * exponent),
                format_number(exponent - 1.0)
            ),
            Self::Sin => "cos(x)".to_string(),
            Self::Cos => "-sin(x)".to_string(),
            Self::Exp => normalized.to_string(),
            Self::Ln => "1/x".to_string(),
            Self::Reciprocal | Self::Unrecognized => return None,
        };
        Some(expr)
    }

    /// Closed-form antiderivative (without the constant of integration), if
    /// the pattern table has one.
    pub fn antiderivative(self, normalized: &str) -> Option<String> {
        let expr = match self {
            Self::Constant(c) => format!("{}*x", format_number(c)),
            Self::Identity => "x^2/2".to_string(),
            Self::Power(n) if n == -1.0 => "ln(abs(x))".to_string(),
            Self::Power(n) => {
                let m = format_number(n + 1.0);
                format!("x^{m}/{m}")
            }
            Self::Linear(a) => format!("{}*x^2/2", format_number(a)),
            Self::ScaledPower {
                coefficient,
                exponent,
            } if exponent == -1.0 => format!("{}*ln(abs(x))", format_number(coefficient)),
            Self::ScaledPower {
                coefficient,
                exponent,
            } => {
                let m = format_number(exponent + 1.0);
                format!("{}*x^{m}/{m}", format_number(coefficient))
            }
            Self::Sin => "-cos(x)".to_string(),
            Self::Cos => "sin(x)".to_string(),
            Self::Exp => normalized.to_string(),
            Self::Reciprocal => "ln(abs(x))".to_string(),
            Self::Ln | Self::Unrecognized => return None,
        };
        Some(expr)
    }
}

/// Symbolic derivative of `expression`.
///
/// Never fails: expressions outside the pattern table come back as
/// [`SymbolicResult::Numeric`].
pub fn differentiate(expression: &str) -> SymbolicResult {
    let normalized = normalize(expression);
    match classify(&normalized).derivative(&normalized) {
        Some(expr) => SymbolicResult::Closed(expr),
        None => {
            debug!("no closed-form derivative for '{normalized}', falling back to numeric");
            SymbolicResult::Numeric(expression.trim().to_string())
        }
    }
}

/// Symbolic antiderivative of `expression`.
///
/// Never fails: expressions outside the pattern table come back as
/// [`SymbolicResult::Unknown`], which must not be evaluated.
pub fn antiderivative(expression: &str) -> SymbolicResult {
    let normalized = normalize(expression);
    match classify(&normalized).antiderivative(&normalized) {
        Some(expr) => SymbolicResult::Closed(expr),
        None => {
            debug!("no closed-form antiderivative for '{normalized}'");
            SymbolicResult::Unknown(expression.trim().to_string())
        }
    }
}
