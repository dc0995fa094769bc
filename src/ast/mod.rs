//! AST module for the Kiln host language
//!
//! This module provides the tree the macro engine rewrites: source files,
//! statements, expressions and class declarations, each carrying a span and a
//! session-unique [`NodeId`].
//!
//! **INVARIANT:** node identity is the `NodeId`, never structural equality.
//! Macro bindings and the hook cache are keyed by it, so a node that is cloned
//! keeps its binding and a node built by the [`NodeFactory`] never has one.

// ============================================================================
// IMPORTS
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

pub mod factory;
pub mod visit;

pub use factory::NodeFactory;

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// Represents a span in the source code.
///
/// ```rust
/// use kiln::ast::Span;
/// let span = Span { start: 0, end: 5 };
/// assert_eq!(span.len(), 5);
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity of a tree node within one compilation session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// The kind of a macro declaration, taken from its `macro` modifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum MacroKind {
    /// `macro function f() {}`, used as `f!(...)`.
    Function,
    /// `macro template function f() {}`, used as `` f`...` ``.
    TaggedTemplate,
    /// `macro derive function F() {}`, used as `class C derives F {}`.
    Derive,
}

impl MacroKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MacroKind::Function => "function",
            MacroKind::TaggedTemplate => "template",
            MacroKind::Derive => "derive",
        }
    }
}

impl std::fmt::Display for MacroKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export status of a top-level declaration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Default)]
pub enum Export {
    #[default]
    None,
    Named,
    Default,
}

/// A parsed source file: the root of one tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFile {
    pub id: NodeId,
    pub path: PathBuf,
    pub statements: Vec<Stmt>,
    pub span: Span,
    /// The text the file was parsed from; empty for built trees.
    #[serde(skip)]
    pub text: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    pub id: NodeId,
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtKind {
    Import(ImportDecl),
    Function(FunctionDecl),
    Class(ClassDecl),
    Variable(VariableDecl),
    Expr(Expr),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_branch: Block,
        /// Either another `If` statement (`else if`) or a `Block` statement.
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    ForOf {
        kind: VarKind,
        binding: String,
        iterable: Expr,
        body: Block,
    },
    Block(Block),
    Defer(Block),
    Try {
        block: Block,
        finalizer: Block,
    },
    Throw(Expr),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportDecl {
    pub names: Vec<String>,
    pub source: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum VarKind {
    Const,
    Let,
}

impl VarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarKind::Const => "const",
            VarKind::Let => "let",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDecl {
    pub kind: VarKind,
    pub name: String,
    pub init: Option<Expr>,
    pub export: Export,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Block,
    pub is_async: bool,
    /// Present when the function carries the `macro` modifier.
    pub macro_kind: Option<MacroKind>,
    pub export: Export,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDecl {
    pub name: String,
    /// Names listed after `derives`, in source order.
    pub derives: Vec<String>,
    pub members: Vec<ClassMember>,
    pub export: Export,
}

impl ClassDecl {
    /// Names of the class's fields, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().filter_map(|member| match &member.kind {
            MemberKind::Field { name, .. } => Some(name.as_str()),
            MemberKind::Method(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMember {
    pub id: NodeId,
    pub span: Span,
    pub kind: MemberKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MemberKind {
    Field { name: String, init: Option<Expr> },
    Method(MethodDecl),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    Ident(String),
    /// Numeric literal, kept as written.
    Number(String),
    Str(String),
    Bool(bool),
    Null,
    This,
    /// Untagged template literal, raw text between the backticks.
    Template(String),
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Paren(Box<Expr>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `name!(args)`
    MacroCall {
        name: String,
        args: Vec<Expr>,
    },
    /// `` tag`raw` ``
    TaggedTemplate {
        tag: String,
        raw: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Await(Box<Expr>),
    Arrow(ArrowFunction),
    Function(Box<FunctionDecl>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub key: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrowFunction {
    pub params: Vec<String>,
    pub body: ArrowBody,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrowBody {
    Block(Block),
    Expr(Box<Expr>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Void,
    Typeof,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Void => "void",
            UnaryOp::Typeof => "typeof",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Or,
    And,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "||" => BinaryOp::Or,
            "&&" => BinaryOp::And,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNe,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            _ => return None,
        })
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::StrictEq | BinaryOp::StrictNe | BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Le | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Gt => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
            BinaryOp::Pow => 7,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, BinaryOp::Pow)
    }
}

// ============================================================================
// MACRO SITE NODES
// ============================================================================

/// A use-site node handed to macro hooks.
///
/// Expression sites (`f!(...)`, `` f`...` ``) arrive as `Expr`, class
/// declarations as `Stmt`. `Void` is the placeholder left behind by
/// `remove()`: it commits as `void 0` in expression position and as nothing
/// in statement position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Node {
    Expr(Expr),
    Stmt(Stmt),
    Void(Span),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Expr(expr) => expr.span,
            Node::Stmt(stmt) => stmt.span,
            Node::Void(span) => *span,
        }
    }

    /// Moves the node to `span`; replacements inherit the source position of
    /// the node they replace.
    pub fn set_span(&mut self, span: Span) {
        match self {
            Node::Expr(expr) => expr.span = span,
            Node::Stmt(stmt) => stmt.span = span,
            Node::Void(old) => *old = span,
        }
    }

    pub fn id(&self) -> Option<NodeId> {
        match self {
            Node::Expr(expr) => Some(expr.id),
            Node::Stmt(stmt) => Some(stmt.id),
            Node::Void(_) => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Node::Void(_))
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            Node::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    pub fn as_stmt(&self) -> Option<&Stmt> {
        match self {
            Node::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassDecl> {
        let Node::Stmt(Stmt {
            kind: StmtKind::Class(class),
            ..
        }) = self
        else {
            return None;
        };
        Some(class)
    }

    /// Arguments of a `name!(...)` site.
    pub fn macro_args(&self) -> Option<&[Expr]> {
        let Node::Expr(Expr {
            kind: ExprKind::MacroCall { args, .. },
            ..
        }) = self
        else {
            return None;
        };
        Some(args)
    }

    /// Raw text of a `` tag`...` `` site.
    pub fn template_raw(&self) -> Option<&str> {
        let Node::Expr(Expr {
            kind: ExprKind::TaggedTemplate { raw, .. },
            ..
        }) = self
        else {
            return None;
        };
        Some(raw)
    }
}

impl From<Expr> for Node {
    fn from(expr: Expr) -> Self {
        Node::Expr(expr)
    }
}

impl From<Stmt> for Node {
    fn from(stmt: Stmt) -> Self {
        Node::Stmt(stmt)
    }
}

// ============================================================================
// CONVENIENCE ACCESSORS
// ============================================================================

impl Expr {
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl Stmt {
    pub fn as_class(&self) -> Option<&ClassDecl> {
        match &self.kind {
            StmtKind::Class(class) => Some(class),
            _ => None,
        }
    }

    /// True for statements after which control never falls through.
    pub fn is_exit(&self) -> bool {
        matches!(self.kind, StmtKind::Return(_) | StmtKind::Throw(_))
    }
}

impl Block {
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}
