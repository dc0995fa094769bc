//! Declaration classification and use-site binding.
//!
//! Binding runs in two passes over every input file before any hook
//! executes. Pass one records each macro declaration; pass two resolves every
//! `name!(...)` and `` name`...` `` site against the declarations visible in
//! its file. After that the bindings are read-only.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::ast::visit::{walk_expr, walk_stmt, Visit};
use crate::ast::{
    Export, Expr, ExprKind, FunctionDecl, MacroKind, NodeId, SourceFile, Span, Stmt, StmtKind,
};
use crate::errors::{named_source, to_source_span, KilnError, Result};
use crate::macros::registry::MacroRegistry;
use crate::macros::{DeclarationShape, MacroDeclaration};
use crate::matchers::{is_macro_declaration, macro_use_site};

// ============================================================================
// PASS 1: DECLARATIONS
// ============================================================================

/// Records every macro declaration in `file`, replacing whatever an earlier
/// registration of the same path declared.
///
/// A `macro` function expression must be the direct initializer of a named
/// variable; anywhere else it is a binding error.
pub fn collect_declarations(registry: &mut MacroRegistry, file: &SourceFile) -> Result<usize> {
    let mut collector = DeclarationCollector {
        path: &file.path,
        text: &file.text,
        found: Vec::new(),
        error: None,
    };
    collector.visit_file(file);

    if let Some(error) = collector.error {
        return Err(error);
    }

    registry.forget_file(&file.path);
    let count = collector.found.len();
    for declaration in collector.found {
        registry.declare(declaration);
    }
    Ok(count)
}

struct DeclarationCollector<'a> {
    path: &'a Path,
    text: &'a str,
    found: Vec<MacroDeclaration>,
    error: Option<KilnError>,
}

impl DeclarationCollector<'_> {
    fn declare(
        &mut self,
        function: &FunctionDecl,
        id: NodeId,
        span: Span,
        shape: DeclarationShape,
        fallback_name: Option<&str>,
    ) {
        let Some(kind) = function.macro_kind else {
            return;
        };
        let Some(name) = function.name.as_deref().or(fallback_name) else {
            return;
        };
        self.found.push(MacroDeclaration {
            id,
            kind,
            name: name.to_string(),
            shape,
            file: self.path.to_path_buf(),
            span,
        });
    }
}

impl Visit for DeclarationCollector<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.error.is_some() {
            return;
        }
        match &stmt.kind {
            StmtKind::Function(function) if is_macro_declaration(function) => {
                let shape = DeclarationShape::Function {
                    default_export: function.export == Export::Default,
                };
                self.declare(function, stmt.id, stmt.span, shape, None);
                self.visit_function(function);
            }
            StmtKind::Variable(var) => match &var.init {
                Some(Expr {
                    id,
                    span,
                    kind: ExprKind::Function(function),
                }) if is_macro_declaration(function) => {
                    let shape = DeclarationShape::BoundExpression {
                        variable: var.name.clone(),
                    };
                    self.declare(function, *id, *span, shape, Some(&var.name));
                    self.visit_function(function);
                }
                _ => walk_stmt(self, stmt),
            },
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if self.error.is_some() {
            return;
        }
        if let ExprKind::Function(function) = &expr.kind {
            if is_macro_declaration(function) {
                self.error = Some(KilnError::MacroBinding {
                    path: self.path.to_path_buf(),
                    reason: format!(
                        "macro function expression{} is not bound to a variable",
                        function
                            .name
                            .as_deref()
                            .map(|name| format!(" '{name}'"))
                            .unwrap_or_default()
                    ),
                    src: named_source(self.path, self.text),
                    span: to_source_span(expr.span),
                });
                return;
            }
        }
        walk_expr(self, expr);
    }
}

// ============================================================================
// PASS 2: USE SITES
// ============================================================================

/// Binds every macro use site in `file`: same-file declarations first, then
/// declarations in files the file imports. Returns the number of sites bound.
pub fn bind_use_sites(registry: &mut MacroRegistry, file: &SourceFile) -> usize {
    let scope = visible_declarations(registry, file);
    let mut binder = SiteBinder {
        scope: &scope,
        bound: Vec::new(),
    };
    binder.visit_file(file);

    let count = binder.bound.len();
    for (kind, declaration, site) in binder.bound {
        registry.bind_macro(kind, &declaration, site);
    }
    debug!(file = %file.path.display(), sites = count, "bound use sites");
    count
}

type Scope = HashMap<(MacroKind, String), Arc<MacroDeclaration>>;

fn visible_declarations(registry: &MacroRegistry, file: &SourceFile) -> Scope {
    let mut scope = Scope::new();

    for declaration in registry.declarations_in_file(&file.path) {
        scope
            .entry((declaration.kind, local_name(declaration).to_string()))
            .or_insert_with(|| Arc::clone(declaration));
    }

    let base = file.path.parent().unwrap_or_else(|| Path::new(""));
    for stmt in &file.statements {
        let StmtKind::Import(import) = &stmt.kind else {
            continue;
        };
        if !import.source.starts_with('.') {
            continue;
        }
        let target = module_key(&base.join(&import.source));
        for declaration in registry.get_macro_declarations() {
            if module_key(&declaration.file) != target {
                continue;
            }
            let name = local_name(declaration);
            if import.names.iter().any(|imported| imported == name) {
                scope
                    .entry((declaration.kind, name.to_string()))
                    .or_insert_with(|| Arc::clone(declaration));
            }
        }
    }

    scope
}

/// Adds to the metaprogram set every input file that a file already in the
/// set imports, transitively. Returns the number of files added.
pub fn collect_metaprogram_dependencies(registry: &mut MacroRegistry, files: &[SourceFile]) -> usize {
    let mut pending = registry.get_metaprogram_source_files();
    let mut added = 0;
    while let Some(path) = pending.pop() {
        let Some(file) = files.iter().find(|file| file.path == path) else {
            continue;
        };
        let base = file.path.parent().unwrap_or_else(|| Path::new(""));
        for stmt in &file.statements {
            let StmtKind::Import(import) = &stmt.kind else {
                continue;
            };
            if !import.source.starts_with('.') {
                continue;
            }
            let target = module_key(&base.join(&import.source));
            for dependency in files.iter().filter(|file| module_key(&file.path) == target) {
                if registry.add_metaprogram_source_file(dependency.path.clone()) {
                    debug!(file = %dependency.path.display(), "metaprogram dependency");
                    pending.push(dependency.path.clone());
                    added += 1;
                }
            }
        }
    }
    added
}

/// The name a declaration is in scope under in its own file.
fn local_name(declaration: &MacroDeclaration) -> &str {
    match &declaration.shape {
        DeclarationShape::BoundExpression { variable } => variable,
        _ => &declaration.name,
    }
}

/// A path without its extension and without `.` and `..` segments.
fn module_key(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.with_extension("").components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

struct SiteBinder<'a> {
    scope: &'a Scope,
    bound: Vec<(MacroKind, Arc<MacroDeclaration>, NodeId)>,
}

impl Visit for SiteBinder<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        if let Some((kind, name)) = macro_use_site(expr) {
            if let Some(declaration) = self.scope.get(&(kind, name.to_string())) {
                self.bound.push((kind, Arc::clone(declaration), expr.id));
            }
        }
        walk_expr(self, expr);
    }
}
