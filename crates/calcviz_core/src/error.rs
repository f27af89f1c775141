use thiserror::Error;

/// Failure raised by an [`Evaluator`](crate::traits::Evaluator).
///
/// Only structural problems are errors. Arithmetic that leaves the reals
/// (`1/0`, `ln(-1)`, `sqrt(-4)`) evaluates to `NaN` or an infinity instead,
/// and callers are expected to check `is_finite` before using a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Parse error at position {position}: {message}")]
    Parse { message: String, position: usize },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// The expression is a display-only placeholder (an antiderivative with
    /// no closed form) and must not be evaluated.
    #[error("Expression is not evaluable: {0}")]
    NotEvaluable(String),
}

impl EvaluationError {
    pub(crate) fn parse(message: impl Into<String>, position: usize) -> Self {
        Self::Parse {
            message: message.into(),
            position,
        }
    }
}
