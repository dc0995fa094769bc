//! Standard macros.
//!
//! The implementations live in one [`MacroModule`]. The CLI installs it as the
//! loader's fallback module, so a file that declares, say,
//! `macro function stringify() {}` gets the standard implementation without
//! providing one of its own.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ast::{ClassDecl, MacroKind, Node, NodeFactory, StmtKind};
use crate::macros::check::{CheckApi, DiagnosticKind, IntrinsicType, TypeDefinition};
use crate::macros::hooks::MacroRegistrationApi;
use crate::macros::loader::MacroModule;
use crate::macros::transform::TransformApi;
use crate::matchers::is_import_statement;
use crate::syntax::print_expr;

// ===================================================================================================
// REGISTRY: Standard Macro Registration
// ===================================================================================================

/// One entry of the standard macro table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardMacro {
    pub name: &'static str,
    pub kind: MacroKind,
    pub summary: &'static str,
}

/// Every standard macro, alphabetical.
pub const STANDARD_MACROS: &[StandardMacro] = &[
    StandardMacro {
        name: "Clone",
        kind: MacroKind::Derive,
        summary: "adds a clone() method that copies own fields",
    },
    StandardMacro {
        name: "Fields",
        kind: MacroKind::Derive,
        summary: "adds a fields() method listing field names",
    },
    StandardMacro {
        name: "dedent",
        kind: MacroKind::TaggedTemplate,
        summary: "strips common indentation from a template",
    },
    StandardMacro {
        name: "env",
        kind: MacroKind::Function,
        summary: "inlines a compile-time environment variable",
    },
    StandardMacro {
        name: "hoist",
        kind: MacroKind::Function,
        summary: "evaluates an expression once at module level",
    },
    StandardMacro {
        name: "stringify",
        kind: MacroKind::Function,
        summary: "turns its argument into source text",
    },
];

/// Builds the standard macro module.
pub fn std_module() -> MacroModule {
    MacroModule::new()
        .export("Clone", register_clone)
        .export("Fields", register_fields)
        .export("dedent", register_dedent)
        .export("env", register_env)
        .export("hoist", register_hoist())
        .export("stringify", register_stringify)
}

fn string_type(api: &CheckApi<'_>) -> Option<TypeDefinition> {
    Some(api.factory.create_intrinsic(IntrinsicType::String))
}

// ===================================================================================================
// FUNCTION MACROS
// ===================================================================================================

fn register_stringify(api: &mut MacroRegistrationApi<'_>) {
    api.transform(|api| {
        let Some(arg) = api.node.macro_args().and_then(|args| args.first()) else {
            return;
        };
        let text = print_expr(arg);
        api.node.replace(api.factory.string(text));
    });
    api.check(|api| string_type(api));
}

fn env_name(node: &Node) -> Option<&str> {
    node.macro_args()?.first()?.as_str_literal()
}

fn register_env(api: &mut MacroRegistrationApi<'_>) {
    api.transform(|api| {
        let Some(name) = env_name(&api.node) else {
            return;
        };
        let value = std::env::var(name).unwrap_or_default();
        api.node.replace(api.factory.string(value));
    });
    api.check(|api| {
        let Some(name) = env_name(api.node) else {
            api.diagnostic(DiagnosticKind::Error, "env! expects a string literal");
            return None;
        };
        if std::env::var_os(name).is_none() {
            let message = format!("environment variable {name} is not set; env! expands to \"\"");
            api.diagnostic(DiagnosticKind::Suggestion, message);
        }
        string_type(api)
    });
}

fn register_hoist() -> impl Fn(&mut MacroRegistrationApi<'_>) + Send + Sync + 'static {
    let counter = Arc::new(AtomicUsize::new(0));
    move |api: &mut MacroRegistrationApi<'_>| {
        let counter = Arc::clone(&counter);
        api.transform(move |api| hoist(api, &counter));
    }
}

fn hoist(api: &mut TransformApi<'_>, counter: &AtomicUsize) {
    let Some(value) = api.node.macro_args().and_then(|args| args.first()).cloned() else {
        return;
    };
    let name = format!("__hoisted_{}", counter.fetch_add(1, Ordering::Relaxed));
    let binding = api.factory.const_decl(name.clone(), value);

    let first_import = api
        .source_file
        .statements()
        .iter()
        .find(|stmt| is_import_statement(stmt))
        .map(|stmt| stmt.id);
    match first_import {
        Some(anchor) => api
            .source_file
            .insert_statement_after(binding, move |stmt| stmt.id == anchor),
        None => api.source_file.prepend_statement(binding),
    }
    api.node.replace(api.factory.ident(name));
}

// ===================================================================================================
// TEMPLATE MACROS
// ===================================================================================================

fn register_dedent(api: &mut MacroRegistrationApi<'_>) {
    api.transform(|api| {
        let Some(raw) = api.node.template_raw() else {
            return;
        };
        let text = dedent(raw);
        api.node.replace(api.factory.string(text));
    });
    api.check(|api| string_type(api));
}

/// Removes the indentation shared by every non-blank line.
///
/// A leading line break and trailing whitespace-only line are dropped, so
///
/// ```text
/// dedent`
///     a
///       b
/// `
/// ```
///
/// yields `"a\n  b"`.
pub fn dedent(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.split('\n').collect();
    if lines.first().is_some_and(|line| line.trim().is_empty()) && lines.len() > 1 {
        lines.remove(0);
    }
    if lines.last().is_some_and(|line| line.trim().is_empty()) && lines.len() > 1 {
        lines.pop();
    }

    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ===================================================================================================
// DERIVE MACROS
// ===================================================================================================

/// Replaces the class at the site with a copy that `edit` has changed.
fn edit_class(api: &mut TransformApi<'_>, edit: impl FnOnce(&mut ClassDecl, &NodeFactory)) {
    let Some(mut stmt) = api.node.as_stmt().cloned() else {
        return;
    };
    let StmtKind::Class(class) = &mut stmt.kind else {
        return;
    };
    edit(class, api.factory);
    api.node.replace(stmt);
}

fn register_clone(api: &mut MacroRegistrationApi<'_>) {
    api.transform(|api| {
        edit_class(api, |class, f| {
            let prototype = f.member(f.ident(class.name.clone()), "prototype");
            let copy = f.call(
                f.path("Object.assign"),
                vec![f.call(f.path("Object.create"), vec![prototype]), f.this()],
            );
            let body = f.block(vec![f.return_stmt(Some(copy))]);
            class.members.push(f.method("clone", Vec::new(), body));
        });
    });
}

fn register_fields(api: &mut MacroRegistrationApi<'_>) {
    api.transform(|api| {
        edit_class(api, |class, f| {
            let names = class.field_names().map(|name| f.string(name)).collect();
            let body = f.block(vec![f.return_stmt(Some(f.array(names)))]);
            class.members.push(f.method("fields", Vec::new(), body));
        });
    });
}
