//! Operator overloading by call rewriting.
//!
//! A registered binary operator is lowered to a call of its callee path with
//! both operands as arguments: with `"+" -> "Vec.add"`, `a + b * c` becomes
//! `Vec.add(a, b * c)`. Operands are lowered first, so chains nest
//! inside-out.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::ast::visit::{walk_expr_mut, VisitMut};
use crate::ast::{BinaryOp, Expr, ExprKind, NodeFactory, SourceFile};
use crate::errors::{KilnError, Result};

/// Operator token to callee path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorTable {
    entries: HashMap<BinaryOp, String>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from configuration, rejecting unknown tokens.
    pub fn from_config(operators: &BTreeMap<String, String>) -> Result<Self> {
        let mut table = Self::new();
        for (token, callee) in operators {
            let Some(op) = BinaryOp::from_token(token) else {
                return Err(KilnError::Config {
                    message: format!("'{token}' is not an overloadable operator"),
                });
            };
            table.register(op, callee.clone());
        }
        Ok(table)
    }

    /// Registers `callee` for `op`, replacing any earlier registration.
    pub fn register(&mut self, op: BinaryOp, callee: impl Into<String>) {
        self.entries.insert(op, callee.into());
    }

    pub fn get(&self, op: BinaryOp) -> Option<&str> {
        self.entries.get(&op).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Rewrites every registered operator in `file`. Returns the rewrite count.
pub fn lower_operators(file: &mut SourceFile, table: &OperatorTable, factory: &NodeFactory) -> usize {
    if table.is_empty() {
        return 0;
    }
    let mut pass = OperatorLowering {
        table,
        factory,
        rewritten: 0,
    };
    pass.visit_file_mut(file);
    if pass.rewritten > 0 {
        debug!(file = %file.path.display(), rewritten = pass.rewritten, "lowered operators");
    }
    pass.rewritten
}

struct OperatorLowering<'a> {
    table: &'a OperatorTable,
    factory: &'a NodeFactory,
    rewritten: usize,
}

impl VisitMut for OperatorLowering<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);

        let ExprKind::Binary { op, .. } = &expr.kind else {
            return;
        };
        let Some(callee) = self.table.get(*op) else {
            return;
        };
        let callee = self.factory.path(callee);
        let placeholder = ExprKind::Null;
        let ExprKind::Binary { lhs, rhs, .. } = std::mem::replace(&mut expr.kind, placeholder) else {
            return;
        };
        expr.kind = ExprKind::Call {
            callee: Box::new(callee),
            args: vec![*lhs, *rhs],
        };
        self.rewritten += 1;
    }
}
