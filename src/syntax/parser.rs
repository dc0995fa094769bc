//! Kiln Parser
//!
//! Converts Kiln source text into a [`SourceFile`] tree with span tracking.
//! The parser is purely syntactic: macro declarations and use sites are only
//! recognised by shape here, and bound to each other later by the binder.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use pest::error::{Error as PestError, InputLocation};
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use crate::ast::{
    ArrowBody, ArrowFunction, BinaryOp, Block, ClassDecl, ClassMember, Export, Expr, ExprKind,
    FunctionDecl, ImportDecl, MacroKind, MemberKind, MethodDecl, NodeFactory, Property,
    SourceFile, Span, Stmt, StmtKind, UnaryOp, VarKind, VariableDecl,
};
use crate::errors::{named_source, to_source_span, KilnError, Result};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct KilnParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parse Kiln source text into a source file.
///
/// # Examples
///
/// ```rust
/// use kiln::ast::{NodeFactory, StmtKind};
/// use kiln::syntax::parse;
///
/// let factory = NodeFactory::new();
/// let file = parse("main.kn", "const x = double!(21);", &factory).unwrap();
/// assert!(matches!(file.statements[0].kind, StmtKind::Variable(_)));
/// ```
pub fn parse(path: impl AsRef<Path>, text: &str, factory: &NodeFactory) -> Result<SourceFile> {
    let path = path.as_ref();
    let builder = TreeBuilder {
        factory,
        path,
        text,
    };

    let mut pairs =
        KilnParser::parse(Rule::program, text).map_err(|e| builder.convert_error(e))?;
    let program = builder.expect(pairs.next(), "program", Span::default())?;
    let span = span_of(&program);

    let statements = program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| builder.stmt(p))
        .collect::<Result<Vec<_>>>()?;

    let mut file = factory.source_file(path, statements);
    file.span = span;
    file.text = Arc::from(text);
    Ok(file)
}

// ============================================================================
// TREE BUILDER
// ============================================================================

struct TreeBuilder<'a> {
    factory: &'a NodeFactory,
    path: &'a Path,
    text: &'a str,
}

impl<'a> TreeBuilder<'a> {
    fn stmt(&self, pair: Pair<Rule>) -> Result<Stmt> {
        let span = span_of(&pair);
        let kind = match pair.as_rule() {
            Rule::import_stmt => {
                let mut names = Vec::new();
                let mut source = String::new();
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::identifier => names.push(inner.as_str().to_string()),
                        Rule::string => source = self.string_value(inner)?,
                        _ => {}
                    }
                }
                StmtKind::Import(ImportDecl { names, source })
            }

            Rule::function_decl => StmtKind::Function(self.function(pair)?),

            Rule::class_decl => StmtKind::Class(self.class(pair)?),

            Rule::variable_stmt => {
                let mut export = Export::None;
                let mut kind = VarKind::Const;
                let mut name = String::new();
                let mut init = None;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::export_named => export = Export::Named,
                        Rule::export_default => export = Export::Default,
                        Rule::var_const => kind = VarKind::Const,
                        Rule::var_let => kind = VarKind::Let,
                        Rule::identifier => name = inner.as_str().to_string(),
                        Rule::expression => init = Some(self.expr(inner)?),
                        _ => {}
                    }
                }
                StmtKind::Variable(VariableDecl {
                    kind,
                    name,
                    init,
                    export,
                })
            }

            Rule::return_stmt => {
                let value = significant(pair).next().map(|p| self.expr(p)).transpose()?;
                StmtKind::Return(value)
            }

            Rule::if_stmt => {
                let mut inner = significant(pair);
                let condition = self.expr(self.expect(inner.next(), "if condition", span)?)?;
                let then_branch = self.block(self.expect(inner.next(), "if body", span)?)?;
                let else_branch = inner
                    .next()
                    .map(|p| self.stmt(p).map(Box::new))
                    .transpose()?;
                StmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }

            Rule::while_stmt => {
                let mut inner = significant(pair);
                let condition = self.expr(self.expect(inner.next(), "while condition", span)?)?;
                let body = self.block(self.expect(inner.next(), "while body", span)?)?;
                StmtKind::While { condition, body }
            }

            Rule::for_of_stmt => {
                let mut inner = significant(pair);
                let kind = match self.expect(inner.next(), "for binding kind", span)?.as_rule() {
                    Rule::var_let => VarKind::Let,
                    _ => VarKind::Const,
                };
                let binding = self
                    .expect(inner.next(), "for binding", span)?
                    .as_str()
                    .to_string();
                let iterable = self.expr(self.expect(inner.next(), "for iterable", span)?)?;
                let body = self.block(self.expect(inner.next(), "for body", span)?)?;
                StmtKind::ForOf {
                    kind,
                    binding,
                    iterable,
                    body,
                }
            }

            Rule::defer_stmt => {
                let body = self.expect(significant(pair).next(), "defer body", span)?;
                StmtKind::Defer(self.block(body)?)
            }

            Rule::try_stmt => {
                let mut inner = significant(pair);
                let block = self.block(self.expect(inner.next(), "try block", span)?)?;
                let finalizer = self.block(self.expect(inner.next(), "finally block", span)?)?;
                StmtKind::Try { block, finalizer }
            }

            Rule::throw_stmt => {
                let value = self.expect(significant(pair).next(), "thrown value", span)?;
                StmtKind::Throw(self.expr(value)?)
            }

            Rule::block => StmtKind::Block(self.block(pair)?),

            Rule::empty_stmt => StmtKind::Empty,

            Rule::expr_stmt => {
                let value = self.expect(pair.into_inner().next(), "expression", span)?;
                StmtKind::Expr(self.expr(value)?)
            }

            other => return Err(self.error(format!("unexpected {other:?} in statement position"), span)),
        };

        Ok(Stmt {
            id: self.factory.next_id(),
            span,
            kind,
        })
    }

    fn block(&self, pair: Pair<Rule>) -> Result<Block> {
        let span = span_of(&pair);
        let stmts = pair
            .into_inner()
            .map(|p| self.stmt(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Block {
            id: self.factory.next_id(),
            span,
            stmts,
        })
    }

    /// Shared by function declarations and function expressions.
    fn function(&self, pair: Pair<Rule>) -> Result<FunctionDecl> {
        let span = span_of(&pair);
        let mut name = None;
        let mut params = Vec::new();
        let mut body = None;
        let mut is_async = false;
        let mut macro_kind = None;
        let mut export = Export::None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::export_named => export = Export::Named,
                Rule::export_default => export = Export::Default,
                Rule::macro_modifier => {
                    macro_kind = Some(match significant(inner).next().map(|p| p.as_rule()) {
                        Some(Rule::macro_template) => MacroKind::TaggedTemplate,
                        Some(Rule::macro_derive) => MacroKind::Derive,
                        _ => MacroKind::Function,
                    });
                }
                Rule::async_kw => is_async = true,
                Rule::identifier => name = Some(inner.as_str().to_string()),
                Rule::params => params = identifiers(inner),
                Rule::block => body = Some(self.block(inner)?),
                _ => {}
            }
        }

        let Some(body) = body else {
            return Err(self.error("function without a body", span));
        };

        Ok(FunctionDecl {
            name,
            params,
            body,
            is_async,
            macro_kind,
            export,
        })
    }

    fn class(&self, pair: Pair<Rule>) -> Result<ClassDecl> {
        let mut class = ClassDecl {
            name: String::new(),
            derives: Vec::new(),
            members: Vec::new(),
            export: Export::None,
        };

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::export_named => class.export = Export::Named,
                Rule::export_default => class.export = Export::Default,
                Rule::identifier => class.name = inner.as_str().to_string(),
                Rule::derives_clause => class.derives = identifiers(inner),
                Rule::method_member | Rule::field_member => class.members.push(self.member(inner)?),
                _ => {}
            }
        }

        Ok(class)
    }

    fn member(&self, pair: Pair<Rule>) -> Result<ClassMember> {
        let span = span_of(&pair);
        let kind = match pair.as_rule() {
            Rule::method_member => {
                let mut method = MethodDecl {
                    name: String::new(),
                    params: Vec::new(),
                    body: self.factory.block(Vec::new()),
                    is_async: false,
                };
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::async_kw => method.is_async = true,
                        Rule::property_name => method.name = inner.as_str().to_string(),
                        Rule::params => method.params = identifiers(inner),
                        Rule::block => method.body = self.block(inner)?,
                        _ => {}
                    }
                }
                MemberKind::Method(method)
            }
            _ => {
                let mut inner = pair.into_inner();
                let name = self
                    .expect(inner.next(), "field name", span)?
                    .as_str()
                    .to_string();
                let init = inner.next().map(|p| self.expr(p)).transpose()?;
                MemberKind::Field { name, init }
            }
        };

        Ok(ClassMember {
            id: self.factory.next_id(),
            span,
            kind,
        })
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expr(&self, pair: Pair<Rule>) -> Result<Expr> {
        let span = span_of(&pair);
        match pair.as_rule() {
            Rule::expression => {
                let mut inner = pair.into_inner();
                let target = self.expr(self.expect(inner.next(), "expression", span)?)?;
                let Some(value) = inner.next() else {
                    return Ok(target);
                };
                let value = self.expr(value)?;
                Ok(self.node(
                    ExprKind::Assign {
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    span,
                ))
            }
            Rule::binary => self.binary(pair),
            other => Err(self.error(format!("unexpected {other:?} in expression position"), span)),
        }
    }

    fn binary(&self, pair: Pair<Rule>) -> Result<Expr> {
        pratt()
            .map_primary(|operand| self.prefixed(operand))
            .map_infix(|lhs, op, rhs| {
                let (lhs, rhs) = (lhs?, rhs?);
                let span = span_of(&op);
                let Some(op) = binary_op(op.as_rule()) else {
                    return Err(self.error(format!("unknown operator '{}'", op.as_str()), span));
                };
                let span = Span::new(lhs.span.start, rhs.span.end);
                Ok(self.node(
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                ))
            })
            .parse(pair.into_inner())
    }

    fn prefixed(&self, pair: Pair<Rule>) -> Result<Expr> {
        let span = span_of(&pair);
        let mut ops = Vec::new();
        let mut operand = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::prefix_op => ops.push((inner.as_str(), span_of(&inner))),
                _ => operand = Some(self.postfix(inner)?),
            }
        }

        let Some(mut expr) = operand else {
            return Err(self.error("missing operand", span));
        };

        for (op, op_span) in ops.into_iter().rev() {
            let span = Span::new(op_span.start, expr.span.end);
            let operand = Box::new(expr);
            let kind = match op {
                "await" => ExprKind::Await(operand),
                "!" => ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand,
                },
                "-" => ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand,
                },
                "void" => ExprKind::Unary {
                    op: UnaryOp::Void,
                    operand,
                },
                _ => ExprKind::Unary {
                    op: UnaryOp::Typeof,
                    operand,
                },
            };
            expr = self.node(kind, span);
        }
        Ok(expr)
    }

    fn postfix(&self, pair: Pair<Rule>) -> Result<Expr> {
        let span = span_of(&pair);
        let mut inner = pair.into_inner();
        let mut expr = self.primary(self.expect(inner.next(), "primary expression", span)?)?;

        for suffix in inner {
            let span = Span::new(expr.span.start, span_of(&suffix).end);
            expr = match suffix.as_rule() {
                Rule::call_args => {
                    let args = self.args(suffix)?;
                    self.node(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    )
                }
                _ => {
                    let property = self.expect(suffix.into_inner().next(), "property name", span)?;
                    self.node(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: property.as_str().to_string(),
                        },
                        span,
                    )
                }
            };
        }
        Ok(expr)
    }

    fn primary(&self, pair: Pair<Rule>) -> Result<Expr> {
        let span = span_of(&pair);
        let kind = match pair.as_rule() {
            Rule::identifier => ExprKind::Ident(pair.as_str().to_string()),
            Rule::number => ExprKind::Number(pair.as_str().to_string()),
            Rule::string => ExprKind::Str(self.string_value(pair)?),
            Rule::template => ExprKind::Template(template_raw(pair)),
            Rule::boolean => ExprKind::Bool(pair.as_str() == "true"),
            Rule::null_lit => ExprKind::Null,
            Rule::this_lit => ExprKind::This,

            Rule::array => ExprKind::Array(
                pair.into_inner()
                    .map(|p| self.expr(p))
                    .collect::<Result<Vec<_>>>()?,
            ),

            Rule::object => {
                let mut properties = Vec::new();
                for property in pair.into_inner() {
                    let property_span = span_of(&property);
                    let mut inner = property.into_inner();
                    let key = self.expect(inner.next(), "property key", property_span)?;
                    let key = match key.as_rule() {
                        Rule::string => self.string_value(key)?,
                        _ => key.as_str().to_string(),
                    };
                    let value = self.expr(self.expect(inner.next(), "property value", property_span)?)?;
                    properties.push(Property { key, value });
                }
                ExprKind::Object(properties)
            }

            Rule::paren => {
                let inner = self.expect(pair.into_inner().next(), "parenthesized expression", span)?;
                ExprKind::Paren(Box::new(self.expr(inner)?))
            }

            Rule::macro_call => {
                let mut inner = pair.into_inner();
                let name = self.expect(inner.next(), "macro name", span)?.as_str().to_string();
                let args = self.args(self.expect(inner.next(), "macro arguments", span)?)?;
                ExprKind::MacroCall { name, args }
            }

            Rule::tagged_template => {
                let mut inner = pair.into_inner();
                let tag = self.expect(inner.next(), "template tag", span)?.as_str().to_string();
                let raw = template_raw(self.expect(inner.next(), "template", span)?);
                ExprKind::TaggedTemplate { tag, raw }
            }

            Rule::arrow_fn => {
                let mut arrow = ArrowFunction {
                    params: Vec::new(),
                    body: ArrowBody::Block(self.factory.block(Vec::new())),
                    is_async: false,
                };
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::async_kw => arrow.is_async = true,
                        Rule::arrow_params => arrow.params = identifiers(inner),
                        Rule::block => arrow.body = ArrowBody::Block(self.block(inner)?),
                        _ => arrow.body = ArrowBody::Expr(Box::new(self.expr(inner)?)),
                    }
                }
                ExprKind::Arrow(arrow)
            }

            Rule::function_expr => ExprKind::Function(Box::new(self.function(pair)?)),

            other => return Err(self.error(format!("unexpected {other:?}"), span)),
        };
        Ok(self.node(kind, span))
    }

    fn args(&self, pair: Pair<Rule>) -> Result<Vec<Expr>> {
        pair.into_inner().map(|p| self.expr(p)).collect()
    }

    fn node(&self, kind: ExprKind, span: Span) -> Expr {
        self.factory.expr(kind, span)
    }

    fn string_value(&self, pair: Pair<Rule>) -> Result<String> {
        let span = span_of(&pair);
        let inner = self.expect(pair.into_inner().next(), "string body", span)?;
        Ok(unescape(inner.as_str()))
    }

    // ------------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------------

    fn expect<'i>(&self, pair: Option<Pair<'i, Rule>>, what: &str, span: Span) -> Result<Pair<'i, Rule>> {
        pair.ok_or_else(|| self.error(format!("malformed {what}"), span))
    }

    fn error(&self, message: impl Into<String>, span: Span) -> KilnError {
        KilnError::Parse {
            path: self.path.to_path_buf(),
            message: message.into(),
            src: named_source(self.path, self.text),
            span: to_source_span(span),
        }
    }

    fn convert_error(&self, error: PestError<Rule>) -> KilnError {
        let span = match error.location {
            InputLocation::Pos(pos) => Span::new(pos, pos),
            InputLocation::Span((start, end)) => Span::new(start, end),
        };
        self.error(error.variant.message().to_string(), span)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::op_or, Assoc::Left))
            .op(Op::infix(Rule::op_and, Assoc::Left))
            .op(Op::infix(Rule::op_strict_eq, Assoc::Left)
                | Op::infix(Rule::op_strict_ne, Assoc::Left)
                | Op::infix(Rule::op_eq, Assoc::Left)
                | Op::infix(Rule::op_ne, Assoc::Left))
            .op(Op::infix(Rule::op_le, Assoc::Left)
                | Op::infix(Rule::op_ge, Assoc::Left)
                | Op::infix(Rule::op_lt, Assoc::Left)
                | Op::infix(Rule::op_gt, Assoc::Left))
            .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
            .op(Op::infix(Rule::op_mul, Assoc::Left)
                | Op::infix(Rule::op_div, Assoc::Left)
                | Op::infix(Rule::op_mod, Assoc::Left))
            .op(Op::infix(Rule::op_pow, Assoc::Right))
    })
}

fn binary_op(rule: Rule) -> Option<BinaryOp> {
    Some(match rule {
        Rule::op_or => BinaryOp::Or,
        Rule::op_and => BinaryOp::And,
        Rule::op_strict_eq => BinaryOp::StrictEq,
        Rule::op_strict_ne => BinaryOp::StrictNe,
        Rule::op_eq => BinaryOp::Eq,
        Rule::op_ne => BinaryOp::Ne,
        Rule::op_le => BinaryOp::Le,
        Rule::op_ge => BinaryOp::Ge,
        Rule::op_lt => BinaryOp::Lt,
        Rule::op_gt => BinaryOp::Gt,
        Rule::op_add => BinaryOp::Add,
        Rule::op_sub => BinaryOp::Sub,
        Rule::op_mul => BinaryOp::Mul,
        Rule::op_div => BinaryOp::Div,
        Rule::op_mod => BinaryOp::Mod,
        Rule::op_pow => BinaryOp::Pow,
        _ => return None,
    })
}

fn span_of(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    Span::new(span.start(), span.end())
}

/// Inner pairs of `pair` without its keyword tokens.
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_import
            | Rule::kw_from
            | Rule::kw_function
            | Rule::kw_class
            | Rule::kw_derives
            | Rule::kw_return
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_of
            | Rule::kw_defer
            | Rule::kw_try
            | Rule::kw_finally
            | Rule::kw_throw
            | Rule::kw_macro
    )
}

fn identifiers(pair: Pair<Rule>) -> Vec<String> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::identifier)
        .map(|p| p.as_str().to_string())
        .collect()
}

fn template_raw(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|raw| raw.as_str().to_string())
        .unwrap_or_default()
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> SourceFile {
        parse("test.kn", text, &NodeFactory::new()).unwrap()
    }

    #[test]
    fn parses_macro_declaration_kinds() {
        let file = parse_ok(
            "macro function a() {}\nmacro template function b() {}\nexport macro derive function C() {}",
        );
        let kinds: Vec<_> = file
            .statements
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::Function(f) => (f.macro_kind, f.export),
                _ => panic!("expected function"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                (Some(MacroKind::Function), Export::None),
                (Some(MacroKind::TaggedTemplate), Export::None),
                (Some(MacroKind::Derive), Export::Named),
            ]
        );
    }

    #[test]
    fn parses_macro_call_and_tagged_template() {
        let file = parse_ok("f!(1, \"a\");\nsql`select 1`;");
        let StmtKind::Expr(call) = &file.statements[0].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(&call.kind, ExprKind::MacroCall { name, args } if name == "f" && args.len() == 2));
        let StmtKind::Expr(tagged) = &file.statements[1].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(&tagged.kind, ExprKind::TaggedTemplate { tag, raw } if tag == "sql" && raw == "select 1"));
    }

    #[test]
    fn not_equal_is_not_a_macro_call() {
        let file = parse_ok("a != (b);");
        let StmtKind::Expr(expr) = &file.statements[0].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Ne, .. }));
    }

    #[test]
    fn respects_operator_precedence() {
        let file = parse_ok("x = 1 + 2 * 3;");
        let StmtKind::Expr(Expr {
            kind: ExprKind::Assign { value, .. },
            ..
        }) = &file.statements[0].kind
        else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op, rhs, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_class_with_derives_and_defer() {
        let file = parse_ok(
            "class Point derives Clone, Fields { x = 0; y; norm() { return this.x; } }\nfunction f() { defer { close(); } return 1; }",
        );
        let class = file.statements[0].as_class().unwrap();
        assert_eq!(class.derives, vec!["Clone", "Fields"]);
        assert_eq!(class.field_names().collect::<Vec<_>>(), vec!["x", "y"]);
        let StmtKind::Function(f) = &file.statements[1].kind else {
            panic!("expected function");
        };
        assert!(matches!(f.body.stmts[0].kind, StmtKind::Defer(_)));
    }

    #[test]
    fn parses_keyword_led_statements() {
        let file = parse_ok(
            "class A {}\nfunction f() { return 1; }\nthrow e;\nclass B derives A {}\nif (x) { return; } else if (y) {} else {}\nfor (const item of items) {}\ntry {} finally {}\nimport { a } from \"./a\";",
        );
        assert_eq!(file.statements.len(), 8);
        assert_eq!(file.statements[0].as_class().map(|c| c.name.as_str()), Some("A"));

        let StmtKind::Function(f) = &file.statements[1].kind else {
            panic!("expected function");
        };
        assert_eq!(f.name.as_deref(), Some("f"));
        assert_eq!(f.macro_kind, None);
        assert!(matches!(
            &f.body.stmts[0].kind,
            StmtKind::Return(Some(Expr { kind: ExprKind::Number(n), .. })) if n == "1"
        ));
        assert!(matches!(&file.statements[2].kind, StmtKind::Throw(e) if e.as_ident() == Some("e")));
        assert_eq!(file.statements[3].as_class().map(|c| c.derives.clone()), Some(vec!["A".to_string()]));

        let StmtKind::If { else_branch: Some(branch), .. } = &file.statements[4].kind else {
            panic!("expected if with else");
        };
        assert!(matches!(branch.kind, StmtKind::If { else_branch: Some(_), .. }));
        assert!(matches!(&file.statements[5].kind, StmtKind::ForOf { binding, .. } if binding == "item"));
        assert!(matches!(file.statements[6].kind, StmtKind::Try { .. }));
        assert!(matches!(&file.statements[7].kind, StmtKind::Import(i) if i.source == "./a"));
    }

    #[test]
    fn keyword_prefixed_identifiers_are_identifiers() {
        let file = parse_ok("format(returned, classes);\nconst ifx = iffy;");
        let StmtKind::Expr(Expr { kind: ExprKind::Call { callee, args }, .. }) = &file.statements[0].kind else {
            panic!("expected call");
        };
        assert_eq!(callee.as_ident(), Some("format"));
        assert_eq!(args[0].as_ident(), Some("returned"));
        assert!(matches!(&file.statements[1].kind, StmtKind::Variable(v) if v.name == "ifx"));
    }

    #[test]
    fn anonymous_macro_function_expressions_keep_their_kind() {
        let file = parse_ok("const t = macro template function() {};\nconst d = macro derive function () {};");
        let kinds: Vec<_> = file
            .statements
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::Variable(VariableDecl { init: Some(Expr { kind: ExprKind::Function(f), .. }), .. }) => f.macro_kind,
                _ => panic!("expected function expression"),
            })
            .collect();
        assert_eq!(kinds, vec![Some(MacroKind::TaggedTemplate), Some(MacroKind::Derive)]);
    }

    #[test]
    fn unescapes_string_literals() {
        let file = parse_ok(r#"const s = "a\"b\n";"#);
        let StmtKind::Variable(var) = &file.statements[0].kind else {
            panic!("expected variable");
        };
        assert_eq!(var.init.as_ref().and_then(Expr::as_str_literal), Some("a\"b\n"));
    }

    #[test]
    fn reports_parse_errors_with_path() {
        let result = parse("broken.kn", "const = ;", &NodeFactory::new());
        let Err(KilnError::Parse { path, .. }) = result else {
            panic!("expected parse error");
        };
        assert_eq!(path, Path::new("broken.kn"));
    }
}
