//! Node classification.
//!
//! Pure predicates that sort tree nodes into the categories the engine acts
//! on. None of them consult the registry: "is a macro call" means "has the
//! shape of one", not "is bound to a declaration".

use crate::ast::{Expr, ExprKind, FunctionDecl, MacroKind, Stmt, StmtKind};

/// Module specifier of the authoring API, erased from emitted code.
pub const COMPILER_MODULE: &str = "compiler";

/// A function carrying the `macro` modifier. An anonymous one only declares
/// a macro as the initializer of a variable, which supplies the name.
pub fn is_macro_declaration(function: &FunctionDecl) -> bool {
    function.macro_kind.is_some()
}

/// The declared macro kind of a statement, if it declares one directly.
pub fn macro_declaration_kind(stmt: &Stmt) -> Option<MacroKind> {
    match &stmt.kind {
        StmtKind::Function(function) if is_macro_declaration(function) => function.macro_kind,
        StmtKind::Variable(var) => match var.init.as_ref().map(|init| &init.kind) {
            Some(ExprKind::Function(function)) if is_macro_declaration(function) => function.macro_kind,
            _ => None,
        },
        _ => None,
    }
}

/// The kind and name of a `name!(...)` or `` name`...` `` site.
pub fn macro_use_site(expr: &Expr) -> Option<(MacroKind, &str)> {
    match &expr.kind {
        ExprKind::MacroCall { name, .. } => Some((MacroKind::Function, name)),
        ExprKind::TaggedTemplate { tag, .. } => Some((MacroKind::TaggedTemplate, tag)),
        _ => None,
    }
}

/// A class declaration with a non-empty `derives` list.
pub fn is_derived_class(stmt: &Stmt) -> bool {
    stmt.as_class()
        .is_some_and(|class| !class.derives.is_empty())
}

pub fn is_defer_statement(stmt: &Stmt) -> bool {
    matches!(stmt.kind, StmtKind::Defer(_))
}

pub fn is_import_statement(stmt: &Stmt) -> bool {
    matches!(stmt.kind, StmtKind::Import(_))
}

/// `import { ... } from "compiler";`
pub fn is_compiler_import(stmt: &Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::Import(import) if import.source == COMPILER_MODULE)
}

pub fn is_return_statement(stmt: &Stmt) -> bool {
    matches!(stmt.kind, StmtKind::Return(_))
}
