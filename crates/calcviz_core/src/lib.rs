//! The `calcviz_core` crate is the numerical engine behind the calculus
//! visualizer. The UI hands it an expression string in `x` plus numeric
//! controls and gets back numbers, derived expressions or sampled scenes.
//!
//! Key components:
//! - **Equation Engine**: tokenizer, parser, bytecode compiler and stack VM;
//!   `VmEvaluator` is the default `Evaluator`.
//! - **Symbolic**: pattern-table derivatives and antiderivatives with tagged
//!   fallbacks (`SymbolicResult`).
//! - **Numerical**: `Calculus`, holding an injected evaluator; central
//!   differences, Simpson quadrature and numerical limits.
//! - **Scene**: curve and overlay sampling for the 3D view.
pub mod equation_engine;
pub mod error;
pub mod numerical;
pub mod scene;
pub mod symbolic;
pub mod traits;

pub use equation_engine::VmEvaluator;
pub use error::EvaluationError;
pub use numerical::{Calculus, CalculusSettings, LimitDirection};
pub use scene::{build_scene, SamplingSettings, Scene, VisualizationOptions};
pub use symbolic::SymbolicResult;
pub use traits::Evaluator;
