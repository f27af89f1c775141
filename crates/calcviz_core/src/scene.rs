//! Sampling of a function and its calculus overlays for the 3D view.
//!
//! The renderer consumes a [`Scene`]: the curve itself plus whichever
//! derivative, tangent, integral, antiderivative and limit layers the
//! [`VisualizationOptions`] switch on. Failed samples stay in place as
//! `y: None` so the renderer can break the line there.

use crate::numerical::{Calculus, LimitDirection};
use crate::symbolic::SymbolicResult;
use crate::traits::Evaluator;
use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Overlay switches sent by the UI whenever a control changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualizationOptions {
    pub show_derivative: bool,
    pub show_tangent_line: bool,
    pub tangent_point: f64,
    pub show_integral: bool,
    pub integral_range: [f64; 2],
    pub show_antiderivative: bool,
    pub limit_point: Option<f64>,
    pub limit_direction: LimitDirection,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self {
            show_derivative: false,
            show_tangent_line: false,
            tangent_point: 0.0,
            show_integral: false,
            integral_range: [0.0, 1.0],
            show_antiderivative: false,
            limit_point: None,
            limit_direction: LimitDirection::Both,
        }
    }
}

/// Upper bound on `SamplingSettings::samples` and on any curve sampled
/// for the UI.
pub const MAX_SAMPLES: usize = 100_000;

/// Horizontal extent and resolution of every sampled layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingSettings {
    pub x_min: f64,
    pub x_max: f64,
    pub samples: usize,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            x_min: -5.0,
            x_max: 5.0,
            samples: 201,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub x: f64,
    /// `None` when evaluation failed or produced a non-finite value.
    pub y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub label: String,
    pub closed_form: bool,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TangentLine {
    pub point: f64,
    pub value: f64,
    pub slope: f64,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegralRegion {
    pub lower: f64,
    pub upper: f64,
    /// Signed Simpson value over `[lower, upper]` in the order given.
    pub value: Option<f64>,
    /// Curve samples between the smaller and larger bound, for shading.
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitMarker {
    pub point: f64,
    pub direction: LimitDirection,
    /// `None` when the approach sequence did not converge.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub expression: String,
    pub curve: Vec<Sample>,
    pub derivative: Option<Layer>,
    pub tangent: Option<TangentLine>,
    pub integral: Option<IntegralRegion>,
    pub antiderivative: Option<Layer>,
    pub limit: Option<LimitMarker>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// `samples` evenly spaced abscissae over `[x_min, x_max]`, both ends
/// included exactly.
pub fn sample_points(x_min: f64, x_max: f64, samples: usize) -> impl Iterator<Item = f64> {
    let last = samples.saturating_sub(1);
    let step = if last == 0 {
        0.0
    } else {
        (x_max - x_min) / last as f64
    };
    (0..samples).map(move |i| if i == last { x_max } else { x_min + i as f64 * step })
}

fn sample_with(
    x_min: f64,
    x_max: f64,
    samples: usize,
    mut f: impl FnMut(f64) -> Option<f64>,
) -> Vec<Sample> {
    sample_points(x_min, x_max, samples)
        .map(|x| Sample { x, y: f(x) })
        .collect()
}

/// Samples `expression` over `[x_min, x_max]`.
///
/// Allocates all `samples` points up front; callers taking the count from
/// the UI should hold it to [`MAX_SAMPLES`].
pub fn sample_curve<E: Evaluator>(
    calculus: &Calculus<E>,
    expression: &str,
    x_min: f64,
    x_max: f64,
    samples: usize,
) -> Vec<Sample> {
    let f = calculus.evaluator().bind(expression);
    sample_with(x_min, x_max, samples, |x| f(x).ok().and_then(finite))
}

fn sample_symbolic<E: Evaluator>(
    calculus: &Calculus<E>,
    result: &SymbolicResult,
    sampling: &SamplingSettings,
) -> Vec<Sample> {
    let SamplingSettings {
        x_min,
        x_max,
        samples,
    } = *sampling;
    match result {
        SymbolicResult::Closed(expr) => sample_curve(calculus, expr, x_min, x_max, samples),
        SymbolicResult::Numeric(original) => sample_with(x_min, x_max, samples, |x| {
            finite(calculus.numerical_derivative(original, x))
        }),
        SymbolicResult::Unknown(_) => Vec::new(),
    }
}

fn validate(options: &VisualizationOptions, sampling: &SamplingSettings) -> Result<()> {
    if !sampling.x_min.is_finite() || !sampling.x_max.is_finite() || sampling.x_max <= sampling.x_min
    {
        bail!("Sampling range must be finite with x_max > x_min.");
    }
    if sampling.samples < 2 {
        bail!("Sampling needs at least 2 samples.");
    }
    if sampling.samples > MAX_SAMPLES {
        bail!("Sampling is limited to {MAX_SAMPLES} samples.");
    }
    if options.show_tangent_line && !options.tangent_point.is_finite() {
        bail!("Tangent point must be finite.");
    }
    if options.show_integral && options.integral_range.iter().any(|b| !b.is_finite()) {
        bail!("Integral bounds must be finite.");
    }
    if let Some(point) = options.limit_point {
        if !point.is_finite() {
            bail!("Limit point must be finite.");
        }
    }
    Ok(())
}

/// Builds every layer `options` asks for.
///
/// Fails only on invalid input: a malformed expression, a bad sampling
/// range or non-finite control values. Numerical trouble inside a layer
/// (no convergence, non-finite tangent) shows up as `None` values instead.
pub fn build_scene<E: Evaluator>(
    calculus: &Calculus<E>,
    expression: &str,
    options: &VisualizationOptions,
    sampling: &SamplingSettings,
) -> Result<Scene> {
    validate(options, sampling)?;
    let midpoint = 0.5 * (sampling.x_min + sampling.x_max);
    calculus
        .evaluate(expression, midpoint)
        .with_context(|| format!("Invalid expression '{expression}'"))?;

    let curve = sample_curve(
        calculus,
        expression,
        sampling.x_min,
        sampling.x_max,
        sampling.samples,
    );

    let derivative_result = (options.show_derivative || options.show_tangent_line)
        .then(|| calculus.differentiate(expression));

    let derivative = match &derivative_result {
        Some(result) if options.show_derivative => Some(Layer {
            label: result.to_string(),
            closed_form: result.is_closed(),
            samples: sample_symbolic(calculus, result, sampling),
        }),
        _ => None,
    };

    let tangent = match &derivative_result {
        Some(result) if options.show_tangent_line => {
            tangent_line(calculus, expression, result, options.tangent_point, sampling)
        }
        _ => None,
    };

    let integral = options.show_integral.then(|| {
        let [lower, upper] = options.integral_range;
        IntegralRegion {
            lower,
            upper,
            value: finite(calculus.definite_integral(expression, lower, upper)),
            samples: sample_curve(
                calculus,
                expression,
                lower.min(upper),
                lower.max(upper),
                sampling.samples,
            ),
        }
    });

    let antiderivative = options.show_antiderivative.then(|| {
        let result = calculus.antiderivative(expression);
        Layer {
            label: result.to_string(),
            closed_form: result.is_closed(),
            samples: sample_symbolic(calculus, &result, sampling),
        }
    });

    let limit = options.limit_point.map(|point| LimitMarker {
        point,
        direction: options.limit_direction,
        value: finite(calculus.limit(expression, point, options.limit_direction)),
    });

    Ok(Scene {
        expression: expression.to_string(),
        curve,
        derivative,
        tangent,
        integral,
        antiderivative,
        limit,
    })
}

fn tangent_line<E: Evaluator>(
    calculus: &Calculus<E>,
    expression: &str,
    derivative: &SymbolicResult,
    point: f64,
    sampling: &SamplingSettings,
) -> Option<TangentLine> {
    let value = calculus.evaluate(expression, point).ok().and_then(finite);
    let slope = calculus
        .evaluate_symbolic(derivative, point)
        .ok()
        .and_then(finite);
    let (Some(value), Some(slope)) = (value, slope) else {
        debug!("no tangent for '{expression}' at {point}");
        return None;
    };
    Some(TangentLine {
        point,
        value,
        slope,
        samples: sample_with(sampling.x_min, sampling.x_max, sampling.samples, |x| {
            finite(value + slope * (x - point))
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn calculus() -> Calculus {
        Calculus::default()
    }

    fn small_range() -> SamplingSettings {
        SamplingSettings {
            x_min: -2.0,
            x_max: 2.0,
            samples: 5,
        }
    }

    #[test]
    fn sample_points_hit_both_ends() {
        let xs: Vec<f64> = sample_points(-1.0, 1.0, 3).collect();
        assert_eq!(xs, vec![-1.0, 0.0, 1.0]);
        let xs: Vec<f64> = sample_points(0.0, 0.3, 4).collect();
        assert_eq!(xs.len(), 4);
        assert_eq!(xs[3], 0.3);
    }

    #[test]
    fn curve_marks_failed_samples() {
        let calculus = calculus();
        let curve = sample_curve(&calculus, "1/x", -1.0, 1.0, 3);
        assert_eq!(curve[0].y, Some(-1.0));
        assert_eq!(curve[1].y, None);
        assert_eq!(curve[2].y, Some(1.0));
    }

    #[test]
    fn default_options_render_only_the_curve() {
        let calculus = calculus();
        let scene = build_scene(
            &calculus,
            "x^2",
            &VisualizationOptions::default(),
            &small_range(),
        )
        .expect("scene should build");
        assert_eq!(scene.curve.len(), 5);
        assert_eq!(scene.curve[0].y, Some(4.0));
        assert!(scene.derivative.is_none());
        assert!(scene.tangent.is_none());
        assert!(scene.integral.is_none());
        assert!(scene.antiderivative.is_none());
        assert!(scene.limit.is_none());
    }

    #[test]
    fn enabled_layers_are_populated() {
        let calculus = calculus();
        let options = VisualizationOptions {
            show_derivative: true,
            show_tangent_line: true,
            tangent_point: 1.0,
            show_integral: true,
            integral_range: [3.0, 0.0],
            show_antiderivative: true,
            limit_point: Some(2.0),
            limit_direction: LimitDirection::Left,
        };
        let scene =
            build_scene(&calculus, "x^2", &options, &small_range()).expect("scene should build");

        let derivative = scene.derivative.expect("derivative layer");
        assert_eq!(derivative.label, "2*x");
        assert!(derivative.closed_form);
        assert_eq!(derivative.samples[4].y, Some(4.0));

        let tangent = scene.tangent.expect("tangent layer");
        assert_eq!(tangent.value, 1.0);
        assert_eq!(tangent.slope, 2.0);
        assert_eq!(tangent.samples[0].y, Some(-5.0));

        let integral = scene.integral.expect("integral layer");
        assert!((integral.value.expect("finite integral") + 9.0).abs() < 1e-6);
        assert_eq!(integral.samples[0].x, 0.0);
        assert_eq!(integral.samples[4].x, 3.0);

        let antiderivative = scene.antiderivative.expect("antiderivative layer");
        assert_eq!(antiderivative.label, "x^3/3");
        assert_eq!(antiderivative.samples.len(), 5);

        let limit = scene.limit.expect("limit marker");
        assert_eq!(limit.value, Some(4.0));
        assert_eq!(limit.direction, LimitDirection::Left);
    }

    #[test]
    fn fallback_layers_stay_renderable() {
        let calculus = calculus();
        let options = VisualizationOptions {
            show_derivative: true,
            show_antiderivative: true,
            limit_point: Some(0.0),
            ..VisualizationOptions::default()
        };
        let scene = build_scene(&calculus, "x^2 + x", &options, &small_range())
            .expect("scene should build");

        let derivative = scene.derivative.expect("derivative layer");
        assert_eq!(derivative.label, "derivative(x^2 + x)");
        assert!(!derivative.closed_form);
        let slope = derivative.samples[2].y.expect("numeric slope at 0");
        assert!((slope - 1.0).abs() < 1e-6);

        let antiderivative = scene.antiderivative.expect("antiderivative layer");
        assert_eq!(antiderivative.label, "antiderivative(x^2 + x) + C");
        assert!(antiderivative.samples.is_empty());

        assert_eq!(scene.limit.expect("limit marker").value, Some(0.0));
    }

    #[test]
    fn divergent_limit_and_missing_tangent_are_none() {
        let calculus = calculus();
        let options = VisualizationOptions {
            show_tangent_line: true,
            tangent_point: 0.0,
            limit_point: Some(0.0),
            ..VisualizationOptions::default()
        };
        let scene =
            build_scene(&calculus, "1/x", &options, &small_range()).expect("scene should build");
        assert!(scene.tangent.is_none());
        assert_eq!(scene.limit.expect("limit marker").value, None);
    }

    #[test]
    fn invalid_input_is_rejected() {
        let calculus = calculus();
        let options = VisualizationOptions::default();
        assert_err_contains(
            build_scene(&calculus, "x +", &options, &small_range()),
            "Invalid expression 'x +'",
        );
        assert_err_contains(
            build_scene(&calculus, "y", &options, &small_range()),
            "Unknown variable: y",
        );

        let reversed = SamplingSettings {
            x_min: 1.0,
            x_max: -1.0,
            samples: 10,
        };
        assert_err_contains(
            build_scene(&calculus, "x", &options, &reversed),
            "x_max > x_min",
        );

        let sparse = SamplingSettings {
            samples: 1,
            ..small_range()
        };
        assert_err_contains(
            build_scene(&calculus, "x", &options, &sparse),
            "at least 2 samples",
        );

        for samples in [MAX_SAMPLES + 1, usize::MAX / 2, usize::MAX] {
            let dense = SamplingSettings {
                samples,
                ..small_range()
            };
            assert_err_contains(
                build_scene(&calculus, "x", &options, &dense),
                "limited to 100000 samples",
            );
        }

        let bad_integral = VisualizationOptions {
            show_integral: true,
            integral_range: [0.0, f64::INFINITY],
            ..options
        };
        assert_err_contains(
            build_scene(&calculus, "x", &bad_integral, &small_range()),
            "Integral bounds",
        );

        let bad_limit = VisualizationOptions {
            limit_point: Some(f64::NAN),
            ..options
        };
        assert_err_contains(
            build_scene(&calculus, "x", &bad_limit, &small_range()),
            "Limit point",
        );
    }
}
