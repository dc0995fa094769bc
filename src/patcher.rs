//! Deferred statement insertion.
//!
//! Hooks never edit a file's statement list directly. They register patches
//! here and the expander applies them once per file, after every node-level
//! rewrite in that file has been committed. Anchors are chosen among the
//! file's statements as parsed, never among rewritten ones.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::ast::{NodeId, Stmt};

/// Selects the anchor statement of a conditioned patch.
pub type StatementMatcher = Box<dyn Fn(&Stmt) -> bool + Send + Sync>;

pub struct StatementPatch {
    pub node: Stmt,
    pub condition: Option<StatementMatcher>,
}

impl fmt::Debug for StatementPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementPatch")
            .field("node", &self.node.id)
            .field("conditioned", &self.condition.is_some())
            .finish()
    }
}

/// Result of applying a patcher to a statement list.
#[derive(Debug)]
pub struct PatchOutcome {
    pub statements: Vec<Stmt>,
    /// Conditioned patches whose matcher selected nothing.
    pub dropped: Vec<Stmt>,
}

#[derive(Debug, Default)]
pub struct StatementPatcher {
    before: Vec<StatementPatch>,
    after: Vec<StatementPatch>,
}

impl StatementPatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `node` at the top of the file.
    pub fn prepend(&mut self, node: Stmt) {
        self.before.push(StatementPatch {
            node,
            condition: None,
        });
    }

    /// Appends `node` to the end of the file.
    pub fn append(&mut self, node: Stmt) {
        self.after.push(StatementPatch {
            node,
            condition: None,
        });
    }

    /// Inserts `node` before the first statement `matcher` accepts.
    pub fn insert_before(&mut self, node: Stmt, matcher: StatementMatcher) {
        self.before.push(StatementPatch {
            node,
            condition: Some(matcher),
        });
    }

    /// Inserts `node` after the first statement `matcher` accepts.
    pub fn insert_after(&mut self, node: Stmt, matcher: StatementMatcher) {
        self.after.push(StatementPatch {
            node,
            condition: Some(matcher),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    pub fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    /// Applies every registered patch to `statements`, matching anchors
    /// against the list itself. See [`patch_against`](Self::patch_against).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kiln::ast::{NodeFactory, StmtKind};
    /// use kiln::patcher::StatementPatcher;
    ///
    /// let factory = NodeFactory::new();
    /// let names = ["A", "B", "C"];
    /// let statements: Vec<_> = names
    ///     .iter()
    ///     .map(|name| factory.expr_stmt(factory.ident(*name)))
    ///     .collect();
    ///
    /// let mut patcher = StatementPatcher::new();
    /// patcher.insert_after(
    ///     factory.expr_stmt(factory.ident("X")),
    ///     Box::new(|stmt| matches!(&stmt.kind, StmtKind::Expr(e) if e.as_ident() == Some("B"))),
    /// );
    /// let outcome = patcher.patch(statements);
    /// let order: Vec<_> = outcome
    ///     .statements
    ///     .iter()
    ///     .map(|stmt| match &stmt.kind {
    ///         StmtKind::Expr(e) => e.as_ident().unwrap_or_default().to_string(),
    ///         _ => String::new(),
    ///     })
    ///     .collect();
    /// assert_eq!(order, ["A", "B", "X", "C"]);
    /// ```
    pub fn patch(self, statements: Vec<Stmt>) -> PatchOutcome {
        let originals = statements.clone();
        self.patch_against(&originals, statements)
    }

    /// Applies every registered patch to `statements`, the rewritten form of
    /// `originals`.
    ///
    /// Matchers only ever see `originals`. The first original a matcher
    /// accepts is the anchor, located in `statements` by its [`NodeId`]; a
    /// patch whose anchor matched nothing, or no longer exists, is dropped.
    /// Unconditioned `before` patches each go to index 0, so the last one
    /// registered ends up first. Patches sharing an anchor keep their
    /// registration order.
    pub fn patch_against(self, originals: &[Stmt], mut statements: Vec<Stmt>) -> PatchOutcome {
        let mut dropped = Vec::new();
        let (unconditioned_before, conditioned_before): (Vec<_>, Vec<_>) =
            self.before.into_iter().partition(|p| p.condition.is_none());
        let (unconditioned_after, conditioned_after): (Vec<_>, Vec<_>) =
            self.after.into_iter().partition(|p| p.condition.is_none());

        let anchor = |matcher: &StatementMatcher, statements: &[Stmt]| {
            let id = originals.iter().find(|&stmt| matcher(stmt))?.id;
            statements.iter().position(|stmt| stmt.id == id)
        };

        for patch in unconditioned_before {
            statements.insert(0, patch.node);
        }

        for patch in conditioned_before {
            let Some(matcher) = patch.condition else {
                continue;
            };
            match anchor(&matcher, &statements) {
                Some(index) => statements.insert(index, patch.node),
                None => dropped.push(patch.node),
            }
        }

        statements.extend(unconditioned_after.into_iter().map(|patch| patch.node));

        let mut inserted_after: HashMap<NodeId, usize> = HashMap::new();
        for patch in conditioned_after {
            let Some(matcher) = patch.condition else {
                continue;
            };
            match anchor(&matcher, &statements) {
                Some(index) => {
                    let count = inserted_after.entry(statements[index].id).or_insert(0);
                    let at = index + 1 + *count;
                    *count += 1;
                    statements.insert(at, patch.node);
                }
                None => dropped.push(patch.node),
            }
        }

        debug!(
            statements = statements.len(),
            dropped = dropped.len(),
            "applied statement patches"
        );
        PatchOutcome {
            statements,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeFactory, StmtKind};

    fn named(factory: &NodeFactory, name: &str) -> Stmt {
        factory.expr_stmt(factory.ident(name))
    }

    fn names(statements: &[Stmt]) -> Vec<String> {
        statements
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::Expr(expr) => expr.as_ident().unwrap_or("?").to_string(),
                _ => "?".to_string(),
            })
            .collect()
    }

    fn is(name: &'static str) -> StatementMatcher {
        Box::new(move |stmt| matches!(&stmt.kind, StmtKind::Expr(e) if e.as_ident() == Some(name)))
    }

    fn abc(factory: &NodeFactory) -> Vec<Stmt> {
        vec![named(factory, "A"), named(factory, "B"), named(factory, "C")]
    }

    #[test]
    fn unmatched_patch_is_dropped() {
        let factory = NodeFactory::new();
        let mut patcher = StatementPatcher::new();
        patcher.insert_after(named(&factory, "X"), is("Z"));
        let outcome = patcher.patch(abc(&factory));
        assert_eq!(names(&outcome.statements), ["A", "B", "C"]);
        assert_eq!(names(&outcome.dropped), ["X"]);
    }

    #[test]
    fn unconditioned_prepends_stack() {
        let factory = NodeFactory::new();
        let mut patcher = StatementPatcher::new();
        patcher.prepend(named(&factory, "P1"));
        patcher.prepend(named(&factory, "P2"));
        patcher.append(named(&factory, "Z"));
        let outcome = patcher.patch(abc(&factory));
        assert_eq!(names(&outcome.statements), ["P2", "P1", "A", "B", "C", "Z"]);
    }

    #[test]
    fn same_anchor_keeps_registration_order() {
        let factory = NodeFactory::new();
        let mut patcher = StatementPatcher::new();
        patcher.insert_before(named(&factory, "X1"), is("B"));
        patcher.insert_before(named(&factory, "X2"), is("B"));
        patcher.insert_after(named(&factory, "Y1"), is("B"));
        patcher.insert_after(named(&factory, "Y2"), is("B"));
        let outcome = patcher.patch(abc(&factory));
        assert_eq!(
            names(&outcome.statements),
            ["A", "X1", "X2", "B", "Y1", "Y2", "C"]
        );
    }

    #[test]
    fn anchors_are_matched_on_the_original_statements() {
        let factory = NodeFactory::new();
        let originals = abc(&factory);
        let mut rewritten = originals.clone();
        // B is rewritten to Q in place, and A is gone.
        rewritten[1].kind = named(&factory, "Q").kind;
        rewritten.remove(0);

        let mut patcher = StatementPatcher::new();
        patcher.insert_before(named(&factory, "X"), is("B"));
        patcher.insert_after(named(&factory, "Y"), is("Q"));
        patcher.insert_after(named(&factory, "Z"), is("A"));
        let outcome = patcher.patch_against(&originals, rewritten);
        assert_eq!(names(&outcome.statements), ["X", "Q", "C"]);
        assert_eq!(names(&outcome.dropped), ["Y", "Z"]);
    }

    #[test]
    fn first_match_only() {
        let factory = NodeFactory::new();
        let statements = vec![named(&factory, "B"), named(&factory, "B")];
        let mut patcher = StatementPatcher::new();
        patcher.insert_after(named(&factory, "X"), is("B"));
        let outcome = patcher.patch(statements);
        assert_eq!(names(&outcome.statements), ["B", "X", "B"]);
    }
}
