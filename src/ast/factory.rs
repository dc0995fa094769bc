//! Node construction for the parser, the lowering passes and macro hooks.
//!
//! Every node built here gets a fresh [`NodeId`] from the session counter and a
//! default span; the edit protocol moves replacements onto the span of the
//! node they replace.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::ast::{
    ArrowBody, ArrowFunction, BinaryOp, Block, ClassDecl, ClassMember, Export, Expr, ExprKind,
    FunctionDecl, MemberKind, MethodDecl, NodeId, SourceFile, Span, Stmt, StmtKind, UnaryOp,
    VarKind, VariableDecl,
};

/// Allocates node ids and builds nodes.
#[derive(Debug, Default)]
pub struct NodeFactory {
    next: AtomicU32,
}

impl NodeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> NodeId {
        NodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    // --- Expressions ---

    pub fn expr(&self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.next_id(),
            span,
            kind,
        }
    }

    pub fn ident(&self, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Ident(name.into()), Span::default())
    }

    pub fn string(&self, value: impl Into<String>) -> Expr {
        self.expr(ExprKind::Str(value.into()), Span::default())
    }

    pub fn number(&self, value: impl ToString) -> Expr {
        self.expr(ExprKind::Number(value.to_string()), Span::default())
    }

    pub fn boolean(&self, value: bool) -> Expr {
        self.expr(ExprKind::Bool(value), Span::default())
    }

    pub fn this(&self) -> Expr {
        self.expr(ExprKind::This, Span::default())
    }

    /// `void 0`, the placeholder a removed expression site commits as.
    pub fn void_zero(&self) -> Expr {
        self.unary(UnaryOp::Void, self.number(0))
    }

    pub fn unary(&self, op: UnaryOp, operand: Expr) -> Expr {
        self.expr(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            Span::default(),
        )
    }

    pub fn binary(&self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Span::default(),
        )
    }

    pub fn member(&self, object: Expr, property: impl Into<String>) -> Expr {
        self.expr(
            ExprKind::Member {
                object: Box::new(object),
                property: property.into(),
            },
            Span::default(),
        )
    }

    /// Builds `a.b.c` from a dotted path.
    pub fn path(&self, dotted: &str) -> Expr {
        let mut segments = dotted.split('.');
        let head = self.ident(segments.next().unwrap_or_default());
        segments.fold(head, |object, property| self.member(object, property))
    }

    pub fn call(&self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            Span::default(),
        )
    }

    pub fn array(&self, items: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Array(items), Span::default())
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        self.expr(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            Span::default(),
        )
    }

    pub fn await_expr(&self, operand: Expr) -> Expr {
        self.expr(ExprKind::Await(Box::new(operand)), Span::default())
    }

    pub fn arrow(&self, params: Vec<String>, body: Block, is_async: bool) -> Expr {
        self.expr(
            ExprKind::Arrow(ArrowFunction {
                params,
                body: ArrowBody::Block(body),
                is_async,
            }),
            Span::default(),
        )
    }

    // --- Statements ---

    pub fn stmt(&self, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.next_id(),
            span: Span::default(),
            kind,
        }
    }

    pub fn block(&self, stmts: Vec<Stmt>) -> Block {
        Block {
            id: self.next_id(),
            span: Span::default(),
            stmts,
        }
    }

    pub fn block_stmt(&self, stmts: Vec<Stmt>) -> Stmt {
        let block = self.block(stmts);
        self.stmt(StmtKind::Block(block))
    }

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn variable(&self, kind: VarKind, name: impl Into<String>, init: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Variable(VariableDecl {
            kind,
            name: name.into(),
            init,
            export: Export::None,
        }))
    }

    pub fn const_decl(&self, name: impl Into<String>, init: Expr) -> Stmt {
        self.variable(VarKind::Const, name, Some(init))
    }

    pub fn let_decl(&self, name: impl Into<String>, init: Expr) -> Stmt {
        self.variable(VarKind::Let, name, Some(init))
    }

    pub fn return_stmt(&self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    pub fn if_stmt(&self, condition: Expr, then_branch: Block) -> Stmt {
        self.stmt(StmtKind::If {
            condition,
            then_branch,
            else_branch: None,
        })
    }

    pub fn for_of(&self, binding: impl Into<String>, iterable: Expr, body: Block) -> Stmt {
        self.stmt(StmtKind::ForOf {
            kind: VarKind::Const,
            binding: binding.into(),
            iterable,
            body,
        })
    }

    pub fn try_finally(&self, block: Block, finalizer: Block) -> Stmt {
        self.stmt(StmtKind::Try { block, finalizer })
    }

    pub fn function(&self, name: impl Into<String>, params: Vec<String>, body: Block) -> Stmt {
        self.stmt(StmtKind::Function(FunctionDecl {
            name: Some(name.into()),
            params,
            body,
            is_async: false,
            macro_kind: None,
            export: Export::None,
        }))
    }

    pub fn class(&self, class: ClassDecl) -> Stmt {
        self.stmt(StmtKind::Class(class))
    }

    // --- Class members ---

    pub fn field(&self, name: impl Into<String>, init: Option<Expr>) -> ClassMember {
        ClassMember {
            id: self.next_id(),
            span: Span::default(),
            kind: MemberKind::Field {
                name: name.into(),
                init,
            },
        }
    }

    pub fn method(&self, name: impl Into<String>, params: Vec<String>, body: Block) -> ClassMember {
        ClassMember {
            id: self.next_id(),
            span: Span::default(),
            kind: MemberKind::Method(MethodDecl {
                name: name.into(),
                params,
                body,
                is_async: false,
            }),
        }
    }

    pub fn source_file(&self, path: impl Into<PathBuf>, statements: Vec<Stmt>) -> SourceFile {
        SourceFile {
            id: self.next_id(),
            path: path.into(),
            statements,
            span: Span::default(),
            text: Arc::from(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let factory = NodeFactory::new();
        let a = factory.ident("a");
        let b = factory.ident("b");
        assert!(a.id < b.id);
    }

    #[test]
    fn path_builds_member_chain() {
        let factory = NodeFactory::new();
        let expr = factory.path("Ops.vec.add");
        let ExprKind::Member { object, property } = &expr.kind else {
            panic!("expected member expression");
        };
        assert_eq!(property, "add");
        assert!(matches!(&object.kind, ExprKind::Member { property, .. } if property == "vec"));
    }
}
