use crate::equation_engine::VmEvaluator;
use crate::error::EvaluationError;
use crate::symbolic::{self, SymbolicResult};
use crate::traits::Evaluator;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Side(s) a limit is approached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitDirection {
    Left,
    Right,
    #[default]
    Both,
}

impl LimitDirection {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    fn includes_left(self) -> bool {
        matches!(self, Self::Left | Self::Both)
    }

    fn includes_right(self) -> bool {
        matches!(self, Self::Right | Self::Both)
    }
}

/// Tunables for the numerical routines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculusSettings {
    /// Central-difference step `h`.
    pub derivative_step: f64,
    /// Simpson subintervals. Must be even.
    pub integral_intervals: usize,
    /// Approach steps `h = 10^-1 ..= 10^-limit_steps`.
    pub limit_steps: u32,
    /// How many trailing approach samples the convergence test looks at.
    pub limit_tail: usize,
    /// Maximum distance of each tail sample from the tail mean.
    pub limit_tolerance: f64,
}

impl Default for CalculusSettings {
    fn default() -> Self {
        Self {
            derivative_step: 1e-4,
            integral_intervals: 1000,
            limit_steps: 15,
            limit_tail: 5,
            limit_tolerance: 1e-10,
        }
    }
}

/// The calculus engine: symbolic tables plus numerical routines over an
/// injected [`Evaluator`].
///
/// Every method is a pure function of its arguments. Numerical routines
/// never propagate evaluation failures; they return `NaN`, so callers must
/// check `is_finite` before trusting a value.
#[derive(Debug, Clone, Default)]
pub struct Calculus<E: Evaluator = VmEvaluator> {
    evaluator: E,
    settings: CalculusSettings,
}

impl<E: Evaluator> Calculus<E> {
    pub fn new(evaluator: E) -> Self {
        Self::with_settings(evaluator, CalculusSettings::default())
    }

    pub fn with_settings(evaluator: E, settings: CalculusSettings) -> Self {
        Self {
            evaluator,
            settings,
        }
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn settings(&self) -> &CalculusSettings {
        &self.settings
    }

    pub fn evaluate(&self, expression: &str, x: f64) -> Result<f64, EvaluationError> {
        self.evaluator.evaluate(expression, x)
    }

    pub fn differentiate(&self, expression: &str) -> SymbolicResult {
        symbolic::differentiate(expression)
    }

    pub fn antiderivative(&self, expression: &str) -> SymbolicResult {
        symbolic::antiderivative(expression)
    }

    /// Evaluates a symbolic result at `x`.
    ///
    /// `Numeric` results run the central-difference derivative of the
    /// original expression; `Unknown` results are display-only.
    pub fn evaluate_symbolic(
        &self,
        result: &SymbolicResult,
        x: f64,
    ) -> Result<f64, EvaluationError> {
        match result {
            SymbolicResult::Closed(expr) => self.evaluate(expr, x),
            SymbolicResult::Numeric(original) => Ok(self.numerical_derivative(original, x)),
            SymbolicResult::Unknown(_) => Err(EvaluationError::NotEvaluable(result.to_string())),
        }
    }

    /// Central difference with the configured step.
    pub fn numerical_derivative(&self, expression: &str, x: f64) -> f64 {
        self.numerical_derivative_with_step(expression, x, self.settings.derivative_step)
    }

    /// `(f(x+h) - f(x-h)) / 2h`, or `NaN` if either evaluation fails.
    pub fn numerical_derivative_with_step(&self, expression: &str, x: f64, h: f64) -> f64 {
        let f = self.evaluator.bind(expression);
        match (f(x + h), f(x - h)) {
            (Ok(forward), Ok(backward)) => (forward - backward) / (2.0 * h),
            (Err(err), _) | (_, Err(err)) => {
                debug!("numerical derivative of '{expression}' at {x} failed: {err}");
                f64::NAN
            }
        }
    }

    /// Simpson's rule with the configured number of subintervals.
    pub fn definite_integral(&self, expression: &str, a: f64, b: f64) -> f64 {
        self.definite_integral_with_intervals(expression, a, b, self.settings.integral_intervals)
    }

    /// Composite Simpson's rule over `n` subintervals.
    ///
    /// `n` must be even; odd values are not rejected but weight the last
    /// panel asymmetrically, and `n = 0` gives `NaN`. Reversed bounds flip
    /// the sign and equal bounds give exactly `0`.
    ///
    /// Samples that evaluate to `NaN` or an infinity contribute `0` instead
    /// of poisoning the sum, so an integrable singularity sitting on a grid
    /// point (and a non-integrable one, silently) still yields a finite
    /// value. A malformed expression yields `NaN`.
    pub fn definite_integral_with_intervals(
        &self,
        expression: &str,
        a: f64,
        b: f64,
        n: usize,
    ) -> f64 {
        if a == b {
            return 0.0;
        }
        if n == 0 {
            debug!("integral of '{expression}' on [{a}, {b}] needs at least one subinterval");
            return f64::NAN;
        }
        if a > b {
            return -self.definite_integral_with_intervals(expression, b, a, n);
        }

        let f = self.evaluator.bind(expression);
        let h = (b - a) / n as f64;
        let mut sum = 0.0;
        let mut dropped = 0usize;
        for i in 0..=n {
            let (x, weight) = if i == 0 {
                (a, 1.0)
            } else if i == n {
                (b, 1.0)
            } else if i % 2 == 0 {
                (a + i as f64 * h, 2.0)
            } else {
                (a + i as f64 * h, 4.0)
            };
            match f(x) {
                Ok(y) if y.is_finite() => sum += weight * y,
                Ok(_) => dropped += 1,
                Err(err) => {
                    debug!("integral of '{expression}' on [{a}, {b}] failed: {err}");
                    return f64::NAN;
                }
            }
        }

        if dropped > 0 {
            trace!("integral of '{expression}' on [{a}, {b}] zeroed {dropped} non-finite samples");
        }
        sum * h / 3.0
    }

    /// Numerical limit of `expression` as `x` approaches `point`.
    ///
    /// Returns the direct value when it is finite. Otherwise samples at
    /// `point ∓ 10^-k` for `k = 1..=limit_steps` and returns the mean of the
    /// last `limit_tail` finite samples if they all lie within
    /// `limit_tolerance` of it, else `NaN`.
    ///
    /// `Both` pools left and right samples into one tail and does not check
    /// that the one-sided limits agree.
    pub fn limit(&self, expression: &str, point: f64, direction: LimitDirection) -> f64 {
        let f = self.evaluator.bind(expression);
        if let Ok(value) = f(point) {
            if value.is_finite() {
                return value;
            }
        }

        let mut samples = Vec::new();
        for k in 1..=self.settings.limit_steps {
            let h = 10f64.powi(-(k as i32));
            if direction.includes_left() {
                if let Ok(value) = f(point - h) {
                    if value.is_finite() {
                        samples.push(value);
                    }
                }
            }
            if direction.includes_right() {
                if let Ok(value) = f(point + h) {
                    if value.is_finite() {
                        samples.push(value);
                    }
                }
            }
        }

        match converged_mean(&samples, self.settings.limit_tail, self.settings.limit_tolerance) {
            Some(mean) => mean,
            None => {
                debug!("limit of '{expression}' at {point} ({direction:?}) did not converge");
                f64::NAN
            }
        }
    }
}

/// Mean of the last `tail` samples, if every one of them lies within
/// `tolerance` of it.
fn converged_mean(samples: &[f64], tail: usize, tolerance: f64) -> Option<f64> {
    let count = tail.min(samples.len());
    if count == 0 {
        return None;
    }
    let last = &samples[samples.len() - count..];
    let mean = last.iter().sum::<f64>() / count as f64;
    last.iter()
        .all(|value| (value - mean).abs() < tolerance)
        .then_some(mean)
}
