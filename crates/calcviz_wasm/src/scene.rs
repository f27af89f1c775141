//! Scene building for the live 3D view.

use crate::calculus::{decode_or_default, serialize, WasmCalculus};
use calcviz_core::scene::{build_scene as core_build_scene, SamplingSettings, VisualizationOptions};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
impl WasmCalculus {
    /// Samples `expression` and every overlay `options` enables.
    ///
    /// `options` and `sampling` are plain objects using the UI's camelCase
    /// field names; missing fields fall back to defaults.
    pub fn build_scene(
        &self,
        expression: &str,
        options: JsValue,
        sampling: JsValue,
    ) -> Result<JsValue, JsValue> {
        let options: VisualizationOptions = decode_or_default(options, "visualization options")?;
        let sampling: SamplingSettings = decode_or_default(sampling, "sampling settings")?;

        let scene = core_build_scene(&self.calculus, expression, &options, &sampling)
            .map_err(|e| JsValue::from_str(&format!("Scene build failed: {:#}", e)))?;

        serialize(&scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_wasm_bindgen::to_value;
    use wasm_bindgen_test::wasm_bindgen_test;

    fn calculus() -> WasmCalculus {
        WasmCalculus::new(JsValue::UNDEFINED).expect("default settings")
    }

    fn sampling_value(x_min: f64, x_max: f64, samples: usize) -> JsValue {
        let sampling = SamplingSettings {
            x_min,
            x_max,
            samples,
        };
        to_value(&sampling).expect("sampling")
    }

    fn error_message(result: Result<JsValue, JsValue>) -> String {
        result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default()
    }

    #[wasm_bindgen_test]
    fn build_scene_accepts_missing_options() {
        let scene = calculus()
            .build_scene("x^2", JsValue::UNDEFINED, sampling_value(-1.0, 1.0, 3))
            .expect("scene");
        let curve = js_sys::Reflect::get(&scene, &JsValue::from_str("curve")).expect("curve");
        assert_eq!(js_sys::Array::from(&curve).length(), 3);
    }

    #[wasm_bindgen_test]
    fn build_scene_includes_enabled_layers() {
        let options = VisualizationOptions {
            show_integral: true,
            integral_range: [0.0, 3.0],
            ..VisualizationOptions::default()
        };
        let scene = calculus()
            .build_scene(
                "x^2",
                to_value(&options).expect("options"),
                JsValue::UNDEFINED,
            )
            .expect("scene");
        let integral =
            js_sys::Reflect::get(&scene, &JsValue::from_str("integral")).expect("integral");
        let value = js_sys::Reflect::get(&integral, &JsValue::from_str("value"))
            .expect("value")
            .as_f64()
            .expect("number");
        assert!((value - 9.0).abs() < 1e-6);
    }

    #[wasm_bindgen_test]
    fn build_scene_rejects_invalid_input() {
        let calc = calculus();
        let message = error_message(calc.build_scene(
            "x",
            JsValue::UNDEFINED,
            sampling_value(1.0, -1.0, 10),
        ));
        assert!(message.contains("Scene build failed"));
        assert!(message.contains("x_max > x_min"));

        let message = error_message(calc.build_scene(
            "sin(",
            JsValue::UNDEFINED,
            JsValue::UNDEFINED,
        ));
        assert!(message.contains("Invalid expression 'sin('"));

        let message = error_message(calc.build_scene(
            "x",
            JsValue::from_str("not an object"),
            JsValue::UNDEFINED,
        ));
        assert!(message.contains("Invalid visualization options"));
    }
}
