//! Kiln: a compile-time macro engine.
//!
//! Source files are parsed into a small JavaScript-like tree. Functions
//! marked `macro` register transform and check hooks that rewrite their use
//! sites; classes chain through the derive macros they list; `defer`
//! statements and configured binary operators are lowered afterwards. See
//! [`session::CompilationSession`] for the entry points.

pub mod ast;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod lowering;
pub mod macros;
pub mod matchers;
pub mod metaprogram;
pub mod patcher;
pub mod rewrite;
pub mod session;
pub mod syntax;

pub use errors::{KilnError, MacroLoadError, Result};
pub use session::CompilationSession;
