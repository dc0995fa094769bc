//! Kiln surface syntax: the pest grammar, the tree builder and the printer.

pub mod parser;
pub mod printer;

pub use parser::parse;
pub use printer::{print, print_expr, print_stmt, quote};
