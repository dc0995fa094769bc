//! Transform hook execution and the edit commit protocol.
//!
//! A use site is folded through its declaration's transform hooks, left to
//! right. Each hook sees the previous hook's output and requests edits through
//! a [`TransformApi`]. After every hook the requested edits are committed:
//! a removal wins over any replacement, the first replacement a hook asks
//! for wins over later ones and over the node as it was, and statement
//! insertions are routed to the containing statement list or to the file's
//! [`StatementPatcher`].

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::ast::{Expr, Node, NodeFactory, Stmt, StmtKind};
use crate::errors::{KilnError, Result};
use crate::macros::hooks::MacroHooks;
use crate::macros::{MacroDeclaration, MacroResult, MacroResults};
use crate::patcher::StatementPatcher;

// ============================================================================
// FILE CONTEXT
// ============================================================================

/// Per-file state shared by every hook that runs in one file.
#[derive(Debug)]
pub struct FileContext {
    pub path: PathBuf,
    /// The file's top-level statements as parsed, before any rewrite.
    pub statements: Vec<Stmt>,
    pub patcher: StatementPatcher,
}

impl FileContext {
    pub fn new(path: impl Into<PathBuf>, statements: Vec<Stmt>) -> Self {
        Self {
            path: path.into(),
            statements,
            patcher: StatementPatcher::new(),
        }
    }
}

// ============================================================================
// HOOK API
// ============================================================================

/// The use site as a hook sees it: the current node plus edit requests.
#[derive(Debug)]
pub struct TransformNode {
    node: Node,
    results: MacroResults,
}

impl TransformNode {
    fn new(node: Node) -> Self {
        Self {
            node,
            results: MacroResults::default(),
        }
    }

    pub fn replace(&mut self, node: impl Into<Node>) {
        self.results.replace(node.into());
    }

    pub fn remove(&mut self) {
        self.results.remove();
    }

    /// Inserts `stmt` before the statement holding this site.
    pub fn insert_before(&mut self, stmt: Stmt) {
        self.results.prepend(stmt);
    }

    /// Inserts `stmt` after the statement holding this site.
    pub fn insert_after(&mut self, stmt: Stmt) {
        self.results.append(stmt);
    }

    fn into_parts(self) -> (Node, MacroResults) {
        (self.node, self.results)
    }
}

impl Deref for TransformNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

/// The enclosing file as a hook sees it. Insertions are queued on the file's
/// patcher and applied after the whole file has been expanded.
pub struct SourceFileApi<'a> {
    path: &'a Path,
    statements: &'a [Stmt],
    patcher: &'a mut StatementPatcher,
    results: MacroResults,
}

impl<'a> SourceFileApi<'a> {
    fn new(file: &'a mut FileContext) -> Self {
        Self {
            path: &file.path,
            statements: &file.statements,
            patcher: &mut file.patcher,
            results: MacroResults::default(),
        }
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    /// Top-level statements as parsed.
    pub fn statements(&self) -> &[Stmt] {
        self.statements
    }

    pub fn prepend_statement(&mut self, stmt: Stmt) {
        self.results.prepend_all(stmt);
    }

    pub fn append_statement(&mut self, stmt: Stmt) {
        self.results.append_all(stmt);
    }

    pub fn insert_statement_before<M>(&mut self, stmt: Stmt, matcher: M)
    where
        M: Fn(&Stmt) -> bool + Send + Sync + 'static,
    {
        self.patcher.insert_before(stmt, Box::new(matcher));
    }

    pub fn insert_statement_after<M>(&mut self, stmt: Stmt, matcher: M)
    where
        M: Fn(&Stmt) -> bool + Send + Sync + 'static,
    {
        self.patcher.insert_after(stmt, Box::new(matcher));
    }

    fn into_results(self) -> MacroResults {
        self.results
    }
}

/// Everything a transform hook receives.
pub struct TransformApi<'a> {
    pub node: TransformNode,
    pub factory: &'a NodeFactory,
    pub declaration: &'a MacroDeclaration,
    pub source_file: SourceFileApi<'a>,
}

/// A committed site: its final node and the statements to put around the
/// statement that holds it.
#[derive(Debug)]
pub struct Transformed<T = Node> {
    pub node: T,
    pub before: Vec<Stmt>,
    pub after: Vec<Stmt>,
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Folds `node` through every transform hook of one declaration.
///
/// With no transform hooks the node comes back untouched. A removal turns
/// the node into [`Node::Void`], which later hooks still receive.
pub fn execute_transform_hook(
    hooks: &MacroHooks,
    declaration: &MacroDeclaration,
    node: Node,
    file: &mut FileContext,
    factory: &NodeFactory,
) -> Transformed {
    let mut current = node;
    let mut before = Vec::new();
    let mut after = Vec::new();

    for hook in &hooks.transform {
        let mut api = TransformApi {
            node: TransformNode::new(current),
            factory,
            declaration,
            source_file: SourceFileApi::new(file),
        };
        hook(&mut api);

        let TransformApi {
            node, source_file, ..
        } = api;
        let file_results = source_file.into_results();
        let (original, mut results) = node.into_parts();
        results.extend(file_results);
        current = commit(original, results, &mut before, &mut after, &mut file.patcher);
    }

    Transformed {
        node: current,
        before,
        after,
    }
}

fn commit(
    current: Node,
    results: MacroResults,
    before: &mut Vec<Stmt>,
    after: &mut Vec<Stmt>,
    patcher: &mut StatementPatcher,
) -> Node {
    let span = current.span();
    let mut replacement = None;
    let mut removed = false;

    for result in results {
        match result {
            MacroResult::Replace(node) if replacement.is_none() => replacement = Some(node),
            MacroResult::Replace(_) => {}
            MacroResult::Remove => removed = true,
            MacroResult::Prepend(stmt) => before.push(stmt),
            MacroResult::Append(stmt) => after.push(stmt),
            MacroResult::PrependAll(stmt) => patcher.prepend(stmt),
            MacroResult::AppendAll(stmt) => patcher.append(stmt),
        }
    }

    if removed {
        return Node::Void(span);
    }
    match replacement {
        Some(mut node) => {
            node.set_span(span);
            node
        }
        None => current,
    }
}

/// Runs a `name!(...)` site through its hooks.
pub fn transform_call_expression_macro(
    hooks: &MacroHooks,
    declaration: &MacroDeclaration,
    site: Expr,
    file: &mut FileContext,
    factory: &NodeFactory,
) -> Result<Transformed<Expr>> {
    transform_expression_site(hooks, declaration, site, file, factory)
}

/// Runs a `` tag`...` `` site through its hooks.
pub fn transform_tagged_template_macro(
    hooks: &MacroHooks,
    declaration: &MacroDeclaration,
    site: Expr,
    file: &mut FileContext,
    factory: &NodeFactory,
) -> Result<Transformed<Expr>> {
    transform_expression_site(hooks, declaration, site, file, factory)
}

fn transform_expression_site(
    hooks: &MacroHooks,
    declaration: &MacroDeclaration,
    site: Expr,
    file: &mut FileContext,
    factory: &NodeFactory,
) -> Result<Transformed<Expr>> {
    let Transformed {
        node,
        before,
        after,
    } = execute_transform_hook(hooks, declaration, Node::Expr(site), file, factory);

    let expr = match node {
        Node::Expr(expr) => expr,
        Node::Void(span) => {
            let mut placeholder = factory.void_zero();
            placeholder.span = span;
            placeholder
        }
        Node::Stmt(Stmt {
            kind: StmtKind::Expr(expr),
            ..
        }) => expr,
        Node::Stmt(_) => {
            return Err(KilnError::InvalidReplacement {
                macro_name: declaration.name.clone(),
                site: "expression",
                found: "statement",
            })
        }
    };

    Ok(Transformed {
        node: expr,
        before,
        after,
    })
}

/// Threads a class declaration through each derive macro in list order.
///
/// If any derive removes the class the chain stops there and the result is
/// `None`. Statements queued by the derives that already ran are kept.
pub fn transform_class_derives(
    derives: &[(Arc<MacroDeclaration>, Arc<MacroHooks>)],
    class: Stmt,
    file: &mut FileContext,
    factory: &NodeFactory,
) -> Transformed<Option<Stmt>> {
    let mut current = Node::Stmt(class);
    let mut before = Vec::new();
    let mut after = Vec::new();

    for (declaration, hooks) in derives {
        let step = execute_transform_hook(hooks, declaration, current, file, factory);
        before.extend(step.before);
        after.extend(step.after);

        if step.node.is_void() {
            debug!(derive = %declaration.name, "derive removed the class; chain aborted");
            return Transformed {
                node: None,
                before,
                after,
            };
        }
        current = step.node;
    }

    let stmt = match current {
        Node::Stmt(stmt) => Some(stmt),
        Node::Expr(expr) => {
            let span = expr.span;
            let mut stmt = factory.expr_stmt(expr);
            stmt.span = span;
            Some(stmt)
        }
        Node::Void(_) => None,
    };

    Transformed {
        node: stmt,
        before,
        after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, MacroKind, NodeId, Span};
    use crate::macros::hooks::MacroRegistrationApi;
    use crate::macros::DeclarationShape;

    fn declaration() -> MacroDeclaration {
        MacroDeclaration {
            id: NodeId(0),
            kind: MacroKind::Function,
            name: "m".into(),
            shape: DeclarationShape::Function {
                default_export: false,
            },
            file: PathBuf::from("m.kn"),
            span: Span::default(),
        }
    }

    fn hooks(register: impl FnOnce(&mut MacroRegistrationApi<'_>)) -> MacroHooks {
        let declaration = declaration();
        let mut hooks = MacroHooks::default();
        register(&mut MacroRegistrationApi::new(&mut hooks, &declaration));
        hooks
    }

    fn site(factory: &NodeFactory) -> Expr {
        factory.expr(
            ExprKind::MacroCall {
                name: "m".into(),
                args: vec![],
            },
            Span::new(3, 7),
        )
    }

    #[test]
    fn no_hooks_is_identity() {
        let factory = NodeFactory::new();
        let mut file = FileContext::new("a.kn", vec![]);
        let input = site(&factory);
        let out = execute_transform_hook(
            &MacroHooks::default(),
            &declaration(),
            Node::Expr(input.clone()),
            &mut file,
            &factory,
        );
        assert_eq!(out.node, Node::Expr(input));
        assert!(out.before.is_empty() && out.after.is_empty() && file.patcher.is_empty());
    }

    #[test]
    fn replacement_inherits_span_and_feeds_next_hook() {
        let factory = NodeFactory::new();
        let mut file = FileContext::new("a.kn", vec![]);
        let hooks = hooks(|api| {
            api.transform(|api| api.node.replace(api.factory.number(1)));
            api.transform(|api| {
                let ExprKind::Number(n) = &api.node.as_expr().unwrap().kind else {
                    panic!("second hook should see the first hook's output");
                };
                let next = api.factory.number(format!("{n}0"));
                api.node.replace(next);
            });
        });
        let out = transform_call_expression_macro(&hooks, &declaration(), site(&factory), &mut file, &factory).unwrap();
        assert!(matches!(&out.node.kind, ExprKind::Number(n) if n == "10"));
        assert_eq!(out.node.span, Span::new(3, 7));
    }

    #[test]
    fn first_replacement_in_a_hook_wins() {
        let factory = NodeFactory::new();
        let mut file = FileContext::new("a.kn", vec![]);
        let hooks = hooks(|api| {
            api.transform(|api| {
                api.node.replace(api.factory.number(1));
                api.node.replace(api.factory.number(2));
            });
        });
        let out = transform_call_expression_macro(&hooks, &declaration(), site(&factory), &mut file, &factory).unwrap();
        assert_eq!(crate::syntax::print_expr(&out.node), "1");
    }

    #[test]
    fn remove_beats_replace_and_commits_as_void_zero() {
        let factory = NodeFactory::new();
        let mut file = FileContext::new("a.kn", vec![]);
        let hooks = hooks(|api| {
            api.transform(|api| {
                api.node.replace(api.factory.number(1));
                api.node.remove();
            });
        });
        let out = transform_call_expression_macro(&hooks, &declaration(), site(&factory), &mut file, &factory).unwrap();
        assert_eq!(crate::syntax::print_expr(&out.node), "void 0");
    }

    #[test]
    fn statement_requests_are_routed() {
        let factory = NodeFactory::new();
        let mut file = FileContext::new("a.kn", vec![]);
        let hooks = hooks(|api| {
            api.transform(|api| {
                let f = api.factory;
                api.node.insert_before(f.expr_stmt(f.ident("before")));
                api.node.insert_after(f.expr_stmt(f.ident("after")));
                api.source_file.prepend_statement(f.expr_stmt(f.ident("top")));
                api.source_file.insert_statement_after(f.expr_stmt(f.ident("x")), |_| true);
            });
        });
        let out = transform_call_expression_macro(&hooks, &declaration(), site(&factory), &mut file, &factory).unwrap();
        assert_eq!((out.before.len(), out.after.len()), (1, 1));
        assert_eq!(file.patcher.len(), 2);
    }

    #[test]
    fn statement_replacement_at_expression_site_is_rejected() {
        let factory = NodeFactory::new();
        let mut file = FileContext::new("a.kn", vec![]);
        let hooks = hooks(|api| {
            api.transform(|api| {
                let stmt = api.factory.return_stmt(None);
                api.node.replace(stmt);
            });
        });
        let result = transform_call_expression_macro(&hooks, &declaration(), site(&factory), &mut file, &factory);
        assert!(matches!(result, Err(KilnError::InvalidReplacement { .. })));
    }
}
