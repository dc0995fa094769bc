//! Tree traversal.
//!
//! `Visit` walks a tree by shared reference, `VisitMut` by unique reference.
//! Override a `visit_*` method to intercept a node and call the matching
//! `walk_*` function to continue into its children.

use crate::ast::{
    ArrowBody, ArrowFunction, Block, ClassDecl, Expr, ExprKind, FunctionDecl, MemberKind,
    MethodDecl, SourceFile, Stmt, StmtKind,
};

// ============================================================================
// SHARED TRAVERSAL
// ============================================================================

pub trait Visit {
    fn visit_file(&mut self, file: &SourceFile) {
        self.visit_stmts(&file.statements);
    }

    fn visit_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_block(&mut self, block: &Block) {
        self.visit_stmts(&block.stmts);
    }

    fn visit_function(&mut self, function: &FunctionDecl) {
        self.visit_block(&function.body);
    }

    fn visit_class(&mut self, class: &ClassDecl) {
        walk_class(self, class);
    }

    fn visit_method(&mut self, method: &MethodDecl) {
        self.visit_block(&method.body);
    }

    fn visit_arrow(&mut self, arrow: &ArrowFunction) {
        match &arrow.body {
            ArrowBody::Block(block) => self.visit_block(block),
            ArrowBody::Expr(expr) => self.visit_expr(expr),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_stmt<V: Visit + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Import(_) | StmtKind::Empty => {}
        StmtKind::Function(function) => visitor.visit_function(function),
        StmtKind::Class(class) => visitor.visit_class(class),
        StmtKind::Variable(var) => {
            if let Some(init) = &var.init {
                visitor.visit_expr(init);
            }
        }
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => visitor.visit_expr(expr),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_block(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_block(body);
        }
        StmtKind::ForOf { iterable, body, .. } => {
            visitor.visit_expr(iterable);
            visitor.visit_block(body);
        }
        StmtKind::Block(block) | StmtKind::Defer(block) => visitor.visit_block(block),
        StmtKind::Try { block, finalizer } => {
            visitor.visit_block(block);
            visitor.visit_block(finalizer);
        }
    }
}

pub fn walk_class<V: Visit + ?Sized>(visitor: &mut V, class: &ClassDecl) {
    for member in &class.members {
        match &member.kind {
            MemberKind::Field { init, .. } => {
                if let Some(init) = init {
                    visitor.visit_expr(init);
                }
            }
            MemberKind::Method(method) => visitor.visit_method(method),
        }
    }
}

pub fn walk_expr<V: Visit + ?Sized>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Ident(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::This
        | ExprKind::Template(_)
        | ExprKind::TaggedTemplate { .. } => {}
        ExprKind::Array(items) => {
            for item in items {
                visitor.visit_expr(item);
            }
        }
        ExprKind::Object(properties) => {
            for property in properties {
                visitor.visit_expr(&property.value);
            }
        }
        ExprKind::Paren(inner) | ExprKind::Await(inner) => visitor.visit_expr(inner),
        ExprKind::Member { object, .. } => visitor.visit_expr(object),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr(callee);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::MacroCall { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        ExprKind::Assign { target, value } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        ExprKind::Arrow(arrow) => visitor.visit_arrow(arrow),
        ExprKind::Function(function) => visitor.visit_function(function),
    }
}

// ============================================================================
// MUTABLE TRAVERSAL
// ============================================================================

pub trait VisitMut {
    fn visit_file_mut(&mut self, file: &mut SourceFile) {
        self.visit_stmts_mut(&mut file.statements);
    }

    fn visit_stmts_mut(&mut self, stmts: &mut Vec<Stmt>) {
        for stmt in stmts.iter_mut() {
            self.visit_stmt_mut(stmt);
        }
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }

    fn visit_block_mut(&mut self, block: &mut Block) {
        self.visit_stmts_mut(&mut block.stmts);
    }

    fn visit_function_mut(&mut self, function: &mut FunctionDecl) {
        self.visit_block_mut(&mut function.body);
    }

    fn visit_class_mut(&mut self, class: &mut ClassDecl) {
        walk_class_mut(self, class);
    }

    fn visit_method_mut(&mut self, method: &mut MethodDecl) {
        self.visit_block_mut(&mut method.body);
    }

    fn visit_arrow_mut(&mut self, arrow: &mut ArrowFunction) {
        match &mut arrow.body {
            ArrowBody::Block(block) => self.visit_block_mut(block),
            ArrowBody::Expr(expr) => self.visit_expr_mut(expr),
        }
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }
}

pub fn walk_stmt_mut<V: VisitMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Import(_) | StmtKind::Empty => {}
        StmtKind::Function(function) => visitor.visit_function_mut(function),
        StmtKind::Class(class) => visitor.visit_class_mut(class),
        StmtKind::Variable(var) => {
            if let Some(init) = &mut var.init {
                visitor.visit_expr_mut(init);
            }
        }
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => visitor.visit_expr_mut(expr),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expr_mut(value);
            }
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr_mut(condition);
            visitor.visit_block_mut(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt_mut(else_branch);
            }
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr_mut(condition);
            visitor.visit_block_mut(body);
        }
        StmtKind::ForOf { iterable, body, .. } => {
            visitor.visit_expr_mut(iterable);
            visitor.visit_block_mut(body);
        }
        StmtKind::Block(block) | StmtKind::Defer(block) => visitor.visit_block_mut(block),
        StmtKind::Try { block, finalizer } => {
            visitor.visit_block_mut(block);
            visitor.visit_block_mut(finalizer);
        }
    }
}

pub fn walk_class_mut<V: VisitMut + ?Sized>(visitor: &mut V, class: &mut ClassDecl) {
    for member in &mut class.members {
        match &mut member.kind {
            MemberKind::Field { init, .. } => {
                if let Some(init) = init {
                    visitor.visit_expr_mut(init);
                }
            }
            MemberKind::Method(method) => visitor.visit_method_mut(method),
        }
    }
}

pub fn walk_expr_mut<V: VisitMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Ident(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::This
        | ExprKind::Template(_)
        | ExprKind::TaggedTemplate { .. } => {}
        ExprKind::Array(items) => {
            for item in items {
                visitor.visit_expr_mut(item);
            }
        }
        ExprKind::Object(properties) => {
            for property in properties {
                visitor.visit_expr_mut(&mut property.value);
            }
        }
        ExprKind::Paren(inner) | ExprKind::Await(inner) => visitor.visit_expr_mut(inner),
        ExprKind::Member { object, .. } => visitor.visit_expr_mut(object),
        ExprKind::Call { callee, args } => {
            visitor.visit_expr_mut(callee);
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
        ExprKind::MacroCall { args, .. } => {
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr_mut(operand),
        ExprKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expr_mut(lhs);
            visitor.visit_expr_mut(rhs);
        }
        ExprKind::Assign { target, value } => {
            visitor.visit_expr_mut(target);
            visitor.visit_expr_mut(value);
        }
        ExprKind::Arrow(arrow) => visitor.visit_arrow_mut(arrow),
        ExprKind::Function(function) => visitor.visit_function_mut(function),
    }
}
