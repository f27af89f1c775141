//! WASM bridge between the visualizer UI and `calcviz_core`.
//!
//! The UI constructs one `WasmCalculus` and calls into it on every control
//! change; all math lives in the core crate.
mod calculus;
mod scene;

pub use calculus::WasmCalculus;
