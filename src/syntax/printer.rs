//! Source printer.
//!
//! Turns a tree back into Kiln source text. Output is normalised (four-space
//! indentation, double-quoted strings, minimal parentheses) so printing a
//! re-parsed file yields the same text again.

use crate::ast::{
    ArrowBody, ArrowFunction, Block, ClassDecl, Export, Expr, ExprKind, FunctionDecl, MacroKind,
    MemberKind, SourceFile, Stmt, StmtKind, UnaryOp,
};

const INDENT: &str = "    ";

/// Print a whole source file.
///
/// # Examples
///
/// ```rust
/// use kiln::ast::NodeFactory;
/// use kiln::syntax::{parse, print};
///
/// let factory = NodeFactory::new();
/// let file = parse("a.kn", "const   x=1+2 ;", &factory).unwrap();
/// assert_eq!(print(&file), "const x = 1 + 2;\n");
/// ```
pub fn print(file: &SourceFile) -> String {
    let mut printer = Printer::default();
    for stmt in &file.statements {
        printer.stmt(stmt);
    }
    printer.out
}

pub fn print_stmt(stmt: &Stmt) -> String {
    let mut printer = Printer::default();
    printer.stmt(stmt);
    printer.out
}

pub fn print_expr(expr: &Expr) -> String {
    let mut printer = Printer::default();
    printer.expr(expr, 0);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

// Binding levels for expressions without a binary operator.
const LEVEL_ASSIGN: u8 = 0;
const LEVEL_UNARY: u8 = 8;
const LEVEL_POSTFIX: u8 = 9;
const LEVEL_PRIMARY: u8 = 10;

impl Printer {
    fn start_line(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn stmt(&mut self, stmt: &Stmt) {
        self.start_line();
        self.stmt_inline(stmt);
        self.out.push('\n');
    }

    fn stmt_inline(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import(import) => {
                self.push("import { ");
                self.push(&import.names.join(", "));
                self.push(" } from ");
                self.push(&quote(&import.source));
                self.push(";");
            }
            StmtKind::Function(function) => self.function(function),
            StmtKind::Class(class) => self.class(class),
            StmtKind::Variable(var) => {
                self.export(var.export);
                self.push(var.kind.as_str());
                self.push(" ");
                self.push(&var.name);
                if let Some(init) = &var.init {
                    self.push(" = ");
                    self.expr(init, LEVEL_ASSIGN);
                }
                self.push(";");
            }
            StmtKind::Expr(expr) => {
                let needs_parens = matches!(expr.kind, ExprKind::Object(_) | ExprKind::Function(_));
                if needs_parens {
                    self.push("(");
                }
                self.expr(expr, LEVEL_ASSIGN);
                if needs_parens {
                    self.push(")");
                }
                self.push(";");
            }
            StmtKind::Return(value) => {
                self.push("return");
                if let Some(value) = value {
                    self.push(" ");
                    self.expr(value, LEVEL_ASSIGN);
                }
                self.push(";");
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.push("if (");
                self.expr(condition, LEVEL_ASSIGN);
                self.push(") ");
                self.block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.push(" else ");
                    self.stmt_inline(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                self.push("while (");
                self.expr(condition, LEVEL_ASSIGN);
                self.push(") ");
                self.block(body);
            }
            StmtKind::ForOf {
                kind,
                binding,
                iterable,
                body,
            } => {
                self.push("for (");
                self.push(kind.as_str());
                self.push(" ");
                self.push(binding);
                self.push(" of ");
                self.expr(iterable, LEVEL_ASSIGN);
                self.push(") ");
                self.block(body);
            }
            StmtKind::Block(block) => self.block(block),
            StmtKind::Defer(block) => {
                self.push("defer ");
                self.block(block);
            }
            StmtKind::Try { block, finalizer } => {
                self.push("try ");
                self.block(block);
                self.push(" finally ");
                self.block(finalizer);
            }
            StmtKind::Throw(value) => {
                self.push("throw ");
                self.expr(value, LEVEL_ASSIGN);
                self.push(";");
            }
            StmtKind::Empty => self.push(";"),
        }
    }

    fn block(&mut self, block: &Block) {
        if block.is_empty() {
            self.push("{}");
            return;
        }
        self.push("{\n");
        self.indent += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.start_line();
        self.push("}");
    }

    fn export(&mut self, export: Export) {
        match export {
            Export::None => {}
            Export::Named => self.push("export "),
            Export::Default => self.push("export default "),
        }
    }

    fn function(&mut self, function: &FunctionDecl) {
        self.export(function.export);
        match function.macro_kind {
            Some(MacroKind::Function) => self.push("macro "),
            Some(MacroKind::TaggedTemplate) => self.push("macro template "),
            Some(MacroKind::Derive) => self.push("macro derive "),
            None => {}
        }
        if function.is_async {
            self.push("async ");
        }
        self.push("function");
        if let Some(name) = &function.name {
            self.push(" ");
            self.push(name);
        }
        self.params(&function.params);
        self.push(" ");
        self.block(&function.body);
    }

    fn class(&mut self, class: &ClassDecl) {
        self.export(class.export);
        self.push("class ");
        self.push(&class.name);
        if !class.derives.is_empty() {
            self.push(" derives ");
            self.push(&class.derives.join(", "));
        }
        if class.members.is_empty() {
            self.push(" {}");
            return;
        }
        self.push(" {\n");
        self.indent += 1;
        for member in &class.members {
            self.start_line();
            match &member.kind {
                MemberKind::Field { name, init } => {
                    self.push(name);
                    if let Some(init) = init {
                        self.push(" = ");
                        self.expr(init, LEVEL_ASSIGN);
                    }
                    self.push(";");
                }
                MemberKind::Method(method) => {
                    if method.is_async {
                        self.push("async ");
                    }
                    self.push(&method.name);
                    self.params(&method.params);
                    self.push(" ");
                    self.block(&method.body);
                }
            }
            self.out.push('\n');
        }
        self.indent -= 1;
        self.start_line();
        self.push("}");
    }

    fn params(&mut self, params: &[String]) {
        self.push("(");
        self.push(&params.join(", "));
        self.push(")");
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Prints `expr`, parenthesised when it binds looser than `min`.
    fn expr(&mut self, expr: &Expr, min: u8) {
        let level = level(expr);
        if level < min {
            self.push("(");
            self.expr_unwrapped(expr);
            self.push(")");
        } else {
            self.expr_unwrapped(expr);
        }
    }

    fn expr_unwrapped(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => self.push(name),
            ExprKind::Number(value) => self.push(value),
            ExprKind::Str(value) => self.push(&quote(value)),
            ExprKind::Bool(value) => self.push(if *value { "true" } else { "false" }),
            ExprKind::Null => self.push("null"),
            ExprKind::This => self.push("this"),
            ExprKind::Template(raw) => {
                self.push("`");
                self.push(raw);
                self.push("`");
            }
            ExprKind::Array(items) => {
                self.push("[");
                self.list(items);
                self.push("]");
            }
            ExprKind::Object(properties) => {
                if properties.is_empty() {
                    self.push("{}");
                    return;
                }
                self.push("{ ");
                for (i, property) in properties.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    if is_identifier(&property.key) {
                        self.push(&property.key);
                    } else {
                        self.push(&quote(&property.key));
                    }
                    self.push(": ");
                    self.expr(&property.value, LEVEL_ASSIGN);
                }
                self.push(" }");
            }
            ExprKind::Paren(inner) => {
                self.push("(");
                self.expr(inner, LEVEL_ASSIGN);
                self.push(")");
            }
            ExprKind::Member { object, property } => {
                self.expr(object, LEVEL_POSTFIX);
                self.push(".");
                self.push(property);
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee, LEVEL_POSTFIX);
                self.push("(");
                self.list(args);
                self.push(")");
            }
            ExprKind::MacroCall { name, args } => {
                self.push(name);
                self.push("!(");
                self.list(args);
                self.push(")");
            }
            ExprKind::TaggedTemplate { tag, raw } => {
                self.push(tag);
                self.push("`");
                self.push(raw);
                self.push("`");
            }
            ExprKind::Unary { op, operand } => {
                self.push(op.as_str());
                if matches!(op, UnaryOp::Void | UnaryOp::Typeof) {
                    self.push(" ");
                }
                self.expr(operand, LEVEL_UNARY);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let precedence = op.precedence();
                let (lhs_min, rhs_min) = if op.is_right_associative() {
                    (LEVEL_POSTFIX, precedence)
                } else {
                    (precedence, precedence + 1)
                };
                self.expr(lhs, lhs_min);
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.expr(rhs, rhs_min);
            }
            ExprKind::Assign { target, value } => {
                self.expr(target, LEVEL_POSTFIX);
                self.push(" = ");
                self.expr(value, LEVEL_ASSIGN);
            }
            ExprKind::Await(operand) => {
                self.push("await ");
                self.expr(operand, LEVEL_UNARY);
            }
            ExprKind::Arrow(arrow) => self.arrow(arrow),
            ExprKind::Function(function) => self.function(function),
        }
    }

    fn arrow(&mut self, arrow: &ArrowFunction) {
        if arrow.is_async {
            self.push("async ");
        }
        self.params(&arrow.params);
        self.push(" => ");
        match &arrow.body {
            ArrowBody::Block(block) => self.block(block),
            ArrowBody::Expr(body) if matches!(body.kind, ExprKind::Object(_)) => {
                self.push("(");
                self.expr(body, LEVEL_ASSIGN);
                self.push(")");
            }
            ArrowBody::Expr(body) => self.expr(body, LEVEL_ASSIGN),
        }
    }

    fn list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(item, LEVEL_ASSIGN);
        }
    }
}

fn level(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } | ExprKind::Arrow(_) => LEVEL_ASSIGN,
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } | ExprKind::Await(_) => LEVEL_UNARY,
        ExprKind::Member { .. }
        | ExprKind::Call { .. }
        | ExprKind::MacroCall { .. }
        | ExprKind::TaggedTemplate { .. } => LEVEL_POSTFIX,
        _ => LEVEL_PRIMARY,
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Double-quoted, escaped string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
