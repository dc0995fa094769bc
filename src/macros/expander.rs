//! Macro expansion over one source file.
//!
//! A single mutable traversal visits statements in source order. Bound
//! `name!(...)` and `` name`...` `` sites run through their transform hooks;
//! classes with a `derives` list run through the derive chain. Statements a
//! hook inserts next to its site are spliced into the innermost statement
//! list that holds the site. File-level patches are applied last, once.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use crate::ast::visit::{walk_expr_mut, VisitMut};
use crate::ast::{Expr, ExprKind, MacroKind, NodeFactory, NodeId, SourceFile, Stmt};
use crate::config::EngineConfig;
use crate::errors::{KilnError, Result};
use crate::macros::hooks::HookCache;
use crate::macros::registry::MacroRegistry;
use crate::macros::transform::{
    transform_call_expression_macro, transform_class_derives, transform_tagged_template_macro,
    FileContext,
};
use crate::macros::MacroDeclaration;
use crate::matchers::{is_derived_class, macro_use_site};

/// Counters for one expanded file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionStats {
    /// Expression sites run through their hooks.
    pub sites: usize,
    /// Classes run through a non-empty derive chain.
    pub derived_classes: usize,
    /// Statement patches inserted at file level.
    pub patches: usize,
}

/// Expands every bound macro site in `file` in place.
///
/// Errors from loading a macro or committing its edits abort the file.
/// Misses (unknown derive names, unmatched patch anchors) follow the
/// configured [`MissPolicy`](crate::config::MissPolicy).
pub fn expand_source_file(
    file: &mut SourceFile,
    registry: &MacroRegistry,
    cache: &mut HookCache,
    factory: &NodeFactory,
    config: &EngineConfig,
) -> Result<ExpansionStats> {
    let mut expander = Expander {
        registry,
        cache,
        factory,
        config,
        context: FileContext::new(file.path.clone(), file.statements.clone()),
        side: Vec::new(),
        expanding: Vec::new(),
        stats: ExpansionStats::default(),
        error: None,
    };
    expander.visit_file_mut(file);

    if let Some(error) = expander.error {
        return Err(error);
    }

    let Expander {
        context, mut stats, ..
    } = expander;
    let FileContext {
        path,
        statements: originals,
        patcher,
    } = context;
    stats.patches = patcher.len();

    if !patcher.is_empty() {
        let outcome = patcher.patch_against(&originals, mem::take(&mut file.statements));
        file.statements = outcome.statements;
        let dropped = outcome.dropped.len();
        stats.patches -= dropped;
        if dropped > 0 {
            config
                .unmatched_anchor
                .apply(|| KilnError::UnresolvedPatchAnchor {
                    path: path.clone(),
                    count: dropped,
                })?;
        }
    }

    debug!(
        file = %path.display(),
        sites = stats.sites,
        derived = stats.derived_classes,
        patches = stats.patches,
        "expanded macros"
    );
    Ok(stats)
}

/// Statements queued next to the statement currently being visited.
#[derive(Default)]
struct SideStatements {
    before: Vec<Stmt>,
    after: Vec<Stmt>,
}

struct Expander<'a> {
    registry: &'a MacroRegistry,
    cache: &'a mut HookCache,
    factory: &'a NodeFactory,
    config: &'a EngineConfig,
    context: FileContext,
    side: Vec<SideStatements>,
    /// Sites whose expansion is in progress, innermost last.
    expanding: Vec<NodeId>,
    stats: ExpansionStats,
    error: Option<KilnError>,
}

impl Expander<'_> {
    fn queue(&mut self, before: Vec<Stmt>, after: Vec<Stmt>) {
        if before.is_empty() && after.is_empty() {
            return;
        }
        match self.side.last_mut() {
            Some(frame) => {
                frame.before.extend(before);
                frame.after.extend(after);
            }
            // Sites outside any statement list fall back to file level.
            None => {
                for stmt in before {
                    self.context.patcher.prepend(stmt);
                }
                for stmt in after {
                    self.context.patcher.append(stmt);
                }
            }
        }
    }

    fn expand_class(&mut self, stmt: Stmt) -> Result<Option<Stmt>> {
        let Some(class) = stmt.as_class() else {
            return Ok(Some(stmt));
        };
        for name in self.registry.unresolved_derive_names(class) {
            self.config
                .unresolved_derive
                .apply(|| KilnError::UnresolvedDerive {
                    class: class.name.clone(),
                    name: name.to_string(),
                })?;
        }

        let declarations = self.registry.get_derive_macros(class);
        if declarations.is_empty() {
            return Ok(Some(stmt));
        }
        let mut derives = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            let hooks = self.cache.get_hooks_for_macro(&declaration)?;
            derives.push((declaration, hooks));
        }

        let id = stmt.id;
        let out = transform_class_derives(&derives, stmt, &mut self.context, self.factory);
        self.queue(out.before, out.after);
        self.stats.derived_classes += 1;
        // The rewritten class still occupies the original statement's slot.
        Ok(out.node.map(|stmt| Stmt { id, ..stmt }))
    }

    fn expand_site(
        &mut self,
        kind: MacroKind,
        declaration: &MacroDeclaration,
        expr: &mut Expr,
    ) -> Result<()> {
        let hooks = self.cache.get_hooks_for_macro(declaration)?;
        let placeholder = Expr {
            id: expr.id,
            span: expr.span,
            kind: ExprKind::Null,
        };
        let site = mem::replace(expr, placeholder);
        let out = match kind {
            MacroKind::TaggedTemplate => transform_tagged_template_macro(
                &hooks,
                declaration,
                site,
                &mut self.context,
                self.factory,
            )?,
            _ => transform_call_expression_macro(
                &hooks,
                declaration,
                site,
                &mut self.context,
                self.factory,
            )?,
        };
        *expr = out.node;
        self.queue(out.before, out.after);
        self.stats.sites += 1;
        Ok(())
    }
}

impl VisitMut for Expander<'_> {
    fn visit_stmts_mut(&mut self, stmts: &mut Vec<Stmt>) {
        for stmt in mem::take(stmts) {
            if self.error.is_some() {
                stmts.push(stmt);
                continue;
            }

            self.side.push(SideStatements::default());
            let stmt = if is_derived_class(&stmt) {
                match self.expand_class(stmt) {
                    Ok(stmt) => stmt,
                    Err(error) => {
                        self.error = Some(error);
                        None
                    }
                }
            } else {
                Some(stmt)
            };
            let stmt = stmt.map(|mut stmt| {
                self.visit_stmt_mut(&mut stmt);
                stmt
            });
            let frame = self.side.pop().unwrap_or_default();

            stmts.extend(frame.before);
            stmts.extend(stmt);
            stmts.extend(frame.after);
        }
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if self.error.is_some() {
            return;
        }
        let kind = macro_use_site(expr).map(|(kind, _)| kind);
        let declaration = kind
            .and_then(|kind| self.registry.get_macro_binding(kind, expr.id))
            .map(Arc::clone);

        if let (Some(kind), Some(declaration)) = (kind, declaration) {
            let site = expr.id;
            if !self.expanding.contains(&site) {
                self.expanding.push(site);
                let result = self.expand_site(kind, &declaration, expr);
                if let Err(error) = result {
                    self.error = Some(error);
                } else if expr.id != site {
                    // The replacement may itself be a bound site.
                    self.visit_expr_mut(expr);
                } else {
                    walk_expr_mut(self, expr);
                }
                self.expanding.pop();
                return;
            }
        }
        walk_expr_mut(self, expr);
    }
}
