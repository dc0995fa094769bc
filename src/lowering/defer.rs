//! `defer` lowering.
//!
//! A function body that contains `defer` statements is rewritten to
//!
//! ```text
//! const __defer = [];
//! let __deferred = false;
//! try {
//!     ...body, each `defer { B }` replaced by `__defer.push(() => { B });`
//! } finally {
//!     if (!__deferred) { cleanup }
//! }
//! ```
//!
//! where `cleanup` is `{ __deferred = true; for (const __action of __defer) { __action(); } }`.
//! The cleanup block is inserted before every `return` reachable without
//! entering a nested function, and after the last statement when control can
//! fall off the end. The `finally` guard covers throws. Actions run in
//! registration order, each at most once per invocation.
//!
//! Registration happens where the `defer` stood, so a `return` that is
//! reached before a `defer` runs only the actions registered so far.

use std::mem;

use tracing::debug;

use crate::ast::visit::{walk_expr, walk_stmt, Visit, VisitMut};
use crate::ast::{
    ArrowBody, ArrowFunction, Block, Expr, ExprKind, FunctionDecl, MethodDecl, NodeFactory,
    SourceFile, Span, Stmt, StmtKind, UnaryOp,
};
use crate::errors::{named_source, to_source_span, KilnError, Result};
use crate::matchers::{is_defer_statement, is_return_statement};

pub const DEFER_LIST: &str = "__defer";
pub const DEFERRED_FLAG: &str = "__deferred";
const ACTION: &str = "__action";

/// Where a function body stands with respect to `defer`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeferState {
    /// No `defer` statements; the body is left alone.
    NoDefer,
    /// The body was rewritten; `actions` defers were registered.
    Lowered { actions: usize },
}

/// Lowers every function-like body in `file`.
///
/// Returns the number of bodies rewritten. A `defer` that is not a direct
/// statement of a function body is an error.
pub fn lower_defers(file: &mut SourceFile, factory: &NodeFactory) -> Result<usize> {
    let mut pass = DeferLowering { factory, lowered: 0 };
    pass.visit_file_mut(file);

    let mut finder = MisplacedDefer { found: None };
    finder.visit_file(file);
    if let Some(span) = finder.found {
        return Err(KilnError::MisplacedDefer {
            path: file.path.clone(),
            src: named_source(&file.path, &file.text),
            span: to_source_span(span),
        });
    }

    if pass.lowered > 0 {
        debug!(file = %file.path.display(), bodies = pass.lowered, "lowered defer");
    }
    Ok(pass.lowered)
}

/// Rewrites one function body. Nested functions are not entered.
pub fn lower_function_body(body: &mut Block, is_async: bool, factory: &NodeFactory) -> DeferState {
    if !body.stmts.iter().any(is_defer_statement) {
        return DeferState::NoDefer;
    }

    let cleanup = Cleanup { factory, is_async };
    let mut actions = 0;
    let mut rest = Vec::with_capacity(body.stmts.len() + 1);

    for stmt in mem::take(&mut body.stmts) {
        let Stmt { id, span, kind } = stmt;
        match kind {
            StmtKind::Defer(block) => {
                actions += 1;
                let is_async_action = is_async && contains_await(&block);
                let closure = factory.arrow(Vec::new(), block, is_async_action);
                let push = factory.call(factory.member(factory.ident(DEFER_LIST), "push"), vec![closure]);
                let mut registration = factory.expr_stmt(push);
                registration.span = span;
                rest.push(registration);
            }
            kind => rest.push(Stmt { id, span, kind }),
        }
    }

    cleanup.cover_returns(&mut rest);
    if !rest.last().is_some_and(Stmt::is_exit) {
        rest.push(cleanup.block());
    }

    let guard = factory.if_stmt(
        factory.unary(UnaryOp::Not, factory.ident(DEFERRED_FLAG)),
        factory.block(vec![cleanup.block()]),
    );
    body.stmts = vec![
        factory.const_decl(DEFER_LIST, factory.array(Vec::new())),
        factory.let_decl(DEFERRED_FLAG, factory.boolean(false)),
        factory.try_finally(factory.block(rest), factory.block(vec![guard])),
    ];

    DeferState::Lowered { actions }
}

// ============================================================================
// CLEANUP INSERTION
// ============================================================================

struct Cleanup<'a> {
    factory: &'a NodeFactory,
    is_async: bool,
}

impl Cleanup<'_> {
    fn block(&self) -> Stmt {
        let f = self.factory;
        let mut call = f.call(f.ident(ACTION), Vec::new());
        if self.is_async {
            call = f.await_expr(call);
        }
        let run_all = f.for_of(ACTION, f.ident(DEFER_LIST), f.block(vec![f.expr_stmt(call)]));
        let mark = f.expr_stmt(f.assign(f.ident(DEFERRED_FLAG), f.boolean(true)));
        f.block_stmt(vec![mark, run_all])
    }

    fn cover_returns(&self, stmts: &mut Vec<Stmt>) {
        for mut stmt in mem::take(stmts) {
            if is_return_statement(&stmt) {
                stmts.push(self.block());
            } else {
                self.cover_nested(&mut stmt);
            }
            stmts.push(stmt);
        }
    }

    fn cover_nested(&self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.cover_returns(&mut then_branch.stmts);
                if let Some(else_branch) = else_branch {
                    if is_return_statement(else_branch) {
                        let ret = mem::replace(else_branch.as_mut(), self.factory.stmt(StmtKind::Empty));
                        **else_branch = self.factory.block_stmt(vec![self.block(), ret]);
                    } else {
                        self.cover_nested(else_branch);
                    }
                }
            }
            StmtKind::While { body, .. } | StmtKind::ForOf { body, .. } | StmtKind::Block(body) => {
                self.cover_returns(&mut body.stmts)
            }
            StmtKind::Try { block, finalizer } => {
                self.cover_returns(&mut block.stmts);
                self.cover_returns(&mut finalizer.stmts);
            }
            _ => {}
        }
    }
}

// ============================================================================
// TRAVERSALS
// ============================================================================

struct DeferLowering<'a> {
    factory: &'a NodeFactory,
    lowered: usize,
}

impl DeferLowering<'_> {
    fn lower(&mut self, body: &mut Block, is_async: bool) {
        if let DeferState::Lowered { .. } = lower_function_body(body, is_async, self.factory) {
            self.lowered += 1;
        }
    }
}

impl VisitMut for DeferLowering<'_> {
    fn visit_function_mut(&mut self, function: &mut FunctionDecl) {
        self.visit_block_mut(&mut function.body);
        self.lower(&mut function.body, function.is_async);
    }

    fn visit_method_mut(&mut self, method: &mut MethodDecl) {
        self.visit_block_mut(&mut method.body);
        self.lower(&mut method.body, method.is_async);
    }

    fn visit_arrow_mut(&mut self, arrow: &mut ArrowFunction) {
        match &mut arrow.body {
            ArrowBody::Block(block) => {
                self.visit_block_mut(block);
                let is_async = arrow.is_async;
                self.lower(block, is_async);
            }
            ArrowBody::Expr(expr) => self.visit_expr_mut(expr),
        }
    }
}

/// Finds a `defer` left behind after lowering.
struct MisplacedDefer {
    found: Option<Span>,
}

impl Visit for MisplacedDefer {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.found.is_some() {
            return;
        }
        if is_defer_statement(stmt) {
            self.found = Some(stmt.span);
            return;
        }
        walk_stmt(self, stmt);
    }
}

/// True when `block` awaits outside any nested function.
fn contains_await(block: &Block) -> bool {
    struct AwaitFinder(bool);

    impl Visit for AwaitFinder {
        fn visit_function(&mut self, _: &FunctionDecl) {}
        fn visit_method(&mut self, _: &MethodDecl) {}
        fn visit_arrow(&mut self, _: &ArrowFunction) {}

        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::Await(_) = expr.kind {
                self.0 = true;
            }
            walk_expr(self, expr);
        }
    }

    let mut finder = AwaitFinder(false);
    finder.visit_block(block);
    finder.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, print};

    fn lower(text: &str) -> Result<(usize, String)> {
        let factory = NodeFactory::new();
        let mut file = parse("t.kn", text, &factory)?;
        let count = lower_defers(&mut file, &factory)?;
        Ok((count, print(&file)))
    }

    #[test]
    fn bodies_without_defer_are_untouched() {
        let text = "function f(a) {\n    if (a) {\n        return 1;\n    }\n    return 2;\n}\n";
        let factory = NodeFactory::new();
        let original = parse("t.kn", text, &factory).unwrap();
        let mut file = original.clone();
        assert_eq!(lower_defers(&mut file, &factory).unwrap(), 0);
        assert_eq!(file, original);
    }

    #[test]
    fn every_return_and_fall_through_is_covered() {
        let (count, out) = lower(
            "function f(a) {\n    defer { log(1); }\n    if (a) { return 1; }\n    while (a) { if (a) { return 2; } }\n    work();\n}",
        )
        .unwrap();
        assert_eq!(count, 1);
        assert!(out.contains("__defer.push(() => {"));
        // two returns, one fall-through, one finally guard
        assert_eq!(out.matches("__deferred = true;").count(), 4);
        assert!(out.contains("} finally {\n        if (!__deferred) {"));
    }

    #[test]
    fn ending_in_return_has_no_trailing_cleanup() {
        let (_, out) = lower("function f() {\n    defer { a(); }\n    return 1;\n}").unwrap();
        assert_eq!(out.matches("__deferred = true;").count(), 2);
    }

    #[test]
    fn async_bodies_await_actions() {
        let (_, out) =
            lower("async function f() {\n    defer { await close(); }\n    defer { log(); }\n}").unwrap();
        assert!(out.contains("__defer.push(async () => {"));
        assert!(out.contains("__defer.push(() => {"));
        assert!(out.contains("await __action();"));
    }

    #[test]
    fn nested_functions_are_lowered_separately() {
        let (count, out) = lower(
            "function outer() {\n    defer { a(); }\n    const inner = () => {\n        defer { b(); }\n        return 1;\n    };\n}",
        )
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(out.matches("const __defer = [];").count(), 2);
    }

    #[test]
    fn defer_in_nested_block_is_rejected() {
        let result = lower("function f(a) {\n    if (a) { defer { x(); } }\n}");
        assert!(matches!(result, Err(KilnError::MisplacedDefer { .. })));
        let result = lower("defer { x(); }");
        assert!(matches!(result, Err(KilnError::MisplacedDefer { .. })));
    }
}
