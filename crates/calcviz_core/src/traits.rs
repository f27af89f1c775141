use crate::error::EvaluationError;

/// A reusable `x -> f(x)` closure produced by [`Evaluator::bind`].
pub type BoundExpression<'a> = Box<dyn Fn(f64) -> Result<f64, EvaluationError> + 'a>;

/// Capability that evaluates a single-variable expression string at a point.
///
/// The numerical routines receive an implementation of this trait instead of
/// reaching for a shared function registry, so tests can inject a mock and
/// several engines with different evaluators can coexist.
pub trait Evaluator {
    /// Evaluates `expression` with the free variable `x` bound to `x`.
    ///
    /// Must be deterministic: the same inputs always give the same output.
    fn evaluate(&self, expression: &str, x: f64) -> Result<f64, EvaluationError>;

    /// Prepares `expression` for repeated evaluation.
    ///
    /// Sampling loops call this once and then invoke the closure per sample.
    /// The default re-evaluates the string every time; implementations that
    /// can compile ahead of time should override it.
    fn bind<'a>(&'a self, expression: &'a str) -> BoundExpression<'a> {
        Box::new(move |x| self.evaluate(expression, x))
    }
}

impl<E: Evaluator + ?Sized> Evaluator for &E {
    fn evaluate(&self, expression: &str, x: f64) -> Result<f64, EvaluationError> {
        (**self).evaluate(expression, x)
    }

    fn bind<'a>(&'a self, expression: &'a str) -> BoundExpression<'a> {
        (**self).bind(expression)
    }
}
