//! Deterministic Mealy machines over generic symbol types, together with the
//! pieces needed to treat one as a black box: a [`SystemUnderLearning`]
//! interface with a reference simulator, a builder for concisely setting up
//! machines in tests, and import/export for the Graphviz DOT dialect used by
//! the benchmark models.

pub mod builder;
pub mod dot;
pub mod machine;
pub mod sul;

pub use builder::MealyBuilder;
pub use machine::{MealyMachine, MealyState, StateIndex, Symbol};
pub use sul::{MealySul, SystemUnderLearning};
