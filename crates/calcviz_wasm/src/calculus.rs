//! Core WASM calculus wrapper.

use calcviz_core::numerical::{Calculus, CalculusSettings, LimitDirection};
use calcviz_core::scene::{sample_curve, MAX_SAMPLES};
use calcviz_core::symbolic::SymbolicResult;
use calcviz_core::VmEvaluator;
use js_sys::Float64Array;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmCalculus {
    pub(crate) calculus: Calculus<VmEvaluator>,
}

/// Decodes an optional settings object; `undefined`/`null` give defaults.
pub(crate) fn decode_or_default<T: DeserializeOwned + Default>(
    value: JsValue,
    what: &str,
) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", what, e)))
}

pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn sample_count(samples: u32) -> anyhow::Result<usize> {
    let samples = samples as usize;
    if samples > MAX_SAMPLES {
        anyhow::bail!("Sampling is limited to {} samples.", MAX_SAMPLES);
    }
    Ok(samples)
}

/// Symbolic result as the UI sees it.
#[derive(Serialize)]
struct SymbolicPayload {
    kind: &'static str,
    expression: String,
    display: String,
}

impl From<&SymbolicResult> for SymbolicPayload {
    fn from(result: &SymbolicResult) -> Self {
        let kind = match result {
            SymbolicResult::Closed(_) => "closed",
            SymbolicResult::Numeric(_) => "numeric",
            SymbolicResult::Unknown(_) => "unknown",
        };
        Self {
            kind,
            expression: result.expression().to_string(),
            display: result.to_string(),
        }
    }
}

#[wasm_bindgen]
impl WasmCalculus {
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue) -> Result<WasmCalculus, JsValue> {
        console_error_panic_hook::set_once();

        let settings: CalculusSettings = decode_or_default(settings, "calculus settings")?;
        Ok(WasmCalculus {
            calculus: Calculus::with_settings(VmEvaluator, settings),
        })
    }

    pub fn evaluate(&self, expression: &str, x: f64) -> Result<f64, JsValue> {
        self.calculus
            .evaluate(expression, x)
            .map_err(|e| JsValue::from_str(&format!("Evaluation failed: {}", e)))
    }

    pub fn differentiate(&self, expression: &str) -> Result<JsValue, JsValue> {
        let result = self.calculus.differentiate(expression);
        serialize(&SymbolicPayload::from(&result))
    }

    pub fn antiderivative(&self, expression: &str) -> Result<JsValue, JsValue> {
        let result = self.calculus.antiderivative(expression);
        serialize(&SymbolicPayload::from(&result))
    }

    /// Central difference; `h` defaults to the configured step. NaN on failure.
    pub fn numerical_derivative(&self, expression: &str, x: f64, h: Option<f64>) -> f64 {
        match h {
            Some(h) => self.calculus.numerical_derivative_with_step(expression, x, h),
            None => self.calculus.numerical_derivative(expression, x),
        }
    }

    /// Simpson's rule; `n` defaults to the configured interval count. NaN on failure.
    pub fn definite_integral(&self, expression: &str, a: f64, b: f64, n: Option<u32>) -> f64 {
        match n {
            Some(n) => self
                .calculus
                .definite_integral_with_intervals(expression, a, b, n as usize),
            None => self.calculus.definite_integral(expression, a, b),
        }
    }

    pub fn limit(&self, expression: &str, point: f64, direction: &str) -> Result<f64, JsValue> {
        let direction = LimitDirection::parse(direction)
            .ok_or_else(|| JsValue::from_str("Unknown limit direction"))?;
        Ok(self.calculus.limit(expression, point, direction))
    }

    /// Flat `y` values over `[x_min, x_max]`; failed samples are NaN.
    pub fn sample_curve(
        &self,
        expression: &str,
        x_min: f64,
        x_max: f64,
        samples: u32,
    ) -> Result<Float64Array, JsValue> {
        let samples = sample_count(samples)
            .map_err(|e| JsValue::from_str(&format!("Sampling failed: {}", e)))?;
        let ys: Vec<f64> = sample_curve(&self.calculus, expression, x_min, x_max, samples)
            .into_iter()
            .map(|sample| sample.y.unwrap_or(f64::NAN))
            .collect();
        Ok(Float64Array::from(ys.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn calculus() -> WasmCalculus {
        WasmCalculus::new(JsValue::UNDEFINED).expect("default settings")
    }

    fn field(value: &JsValue, name: &str) -> JsValue {
        js_sys::Reflect::get(value, &JsValue::from_str(name)).expect("field")
    }

    #[wasm_bindgen_test]
    fn evaluate_reports_malformed_expression() {
        let calc = calculus();
        assert_eq!(calc.evaluate("x^2", 3.0).expect("evaluates"), 9.0);

        let message = calc
            .evaluate("x +", 0.0)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Evaluation failed"));
    }

    #[wasm_bindgen_test]
    fn symbolic_payload_carries_kind_and_display() {
        let calc = calculus();
        let closed = calc.differentiate("x^3").expect("payload");
        assert_eq!(field(&closed, "kind").as_string().as_deref(), Some("closed"));
        assert_eq!(field(&closed, "expression").as_string().as_deref(), Some("3*x^2"));

        let unknown = calc.antiderivative("ln(x)").expect("payload");
        assert_eq!(field(&unknown, "kind").as_string().as_deref(), Some("unknown"));
        assert_eq!(
            field(&unknown, "display").as_string().as_deref(),
            Some("antiderivative(ln(x)) + C")
        );
    }

    #[wasm_bindgen_test]
    fn numerical_entry_points_use_optional_arguments() {
        let calc = calculus();
        assert!((calc.numerical_derivative("x^3", 2.0, None) - 12.0).abs() < 1e-3);
        assert!((calc.numerical_derivative("x^3", 2.0, Some(1e-3)) - 12.0).abs() < 1e-3);
        assert!((calc.definite_integral("x^2", 0.0, 3.0, None) - 9.0).abs() < 1e-6);
        assert!((calc.definite_integral("x^2", 3.0, 0.0, Some(10)) + 9.0).abs() < 1e-9);
    }

    #[wasm_bindgen_test]
    fn limit_rejects_unknown_direction() {
        let calc = calculus();
        assert_eq!(calc.limit("x^2", 3.0, "both").expect("limit"), 9.0);
        assert!(calc.limit("1/x", 0.0, "right").expect("limit").is_nan());

        let message = calc
            .limit("x", 0.0, "sideways")
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Unknown limit direction"));
    }

    #[wasm_bindgen_test]
    fn sample_curve_uses_nan_for_failed_samples() {
        let ys = calculus()
            .sample_curve("1/x", -1.0, 1.0, 3)
            .expect("samples")
            .to_vec();
        assert_eq!(ys[0], -1.0);
        assert!(ys[1].is_nan());
        assert_eq!(ys[2], 1.0);
    }

    #[wasm_bindgen_test]
    fn sample_curve_rejects_oversized_requests() {
        let message = calculus()
            .sample_curve("x", 0.0, 1.0, u32::MAX)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Sampling failed"));
        assert!(message.contains("limited to 100000 samples"));
    }

    #[wasm_bindgen_test]
    fn sample_count_is_capped() {
        assert_eq!(sample_count(201).expect("within cap"), 201);
        assert_eq!(sample_count(MAX_SAMPLES as u32).expect("at cap"), MAX_SAMPLES);
        let err = sample_count(MAX_SAMPLES as u32 + 1).expect_err("over cap");
        assert!(err.to_string().contains("limited to"));
    }
}
