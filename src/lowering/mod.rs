//! Built-in lowering passes that run after macro expansion.

pub mod defer;
pub mod operators;

pub use defer::{lower_defers, lower_function_body, DeferState};
pub use operators::{lower_operators, OperatorTable};
