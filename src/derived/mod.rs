//! The derived data engine: derived properties recomputed from the nodes they read.

pub mod definition;
pub mod dependency;
pub mod engine;
pub mod function;

pub use definition::{load_definitions, DerivativeDefinition};
pub use dependency::DependencyIndex;
pub use engine::{DerivedDataEngine, DerivedReport};
pub use function::{DerivedFunction, DerivedInput, FunctionRegistry, Parameters};
