//! Engine-level properties, exercised through `CompilationSession`.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kiln::ast::visit::Visit;
use kiln::ast::{ExprKind, NodeFactory, Stmt, StmtKind};
use kiln::lowering::defer::DEFERRED_FLAG;
use kiln::lowering::{lower_function_body, DeferState};
use kiln::macros::check::{IntrinsicType, NullChecker, TypeDefinitionFactory};
use kiln::macros::transform::{execute_transform_hook, FileContext};
use kiln::macros::{MacroHooks, MacroModule};
use kiln::syntax::{parse, print, print_stmt};

use common::{add_field, compile, counting_module, label_offsets, member_names, session_with};

// ============================================================================
// HOOK CACHE
// ============================================================================

#[test]
fn hooks_materialize_once_per_declaration() {
    let (module, runs) = counting_module("twice", |api| {
        let Some(arg) = api.node.macro_args().and_then(|args| args.first()).cloned() else {
            return;
        };
        let f = api.factory;
        api.node.replace(f.binary(kiln::ast::BinaryOp::Mul, arg, f.number(2)));
    });
    let mut session = session_with(module);
    let file = session
        .parse("main.kn", "macro function twice() {}\nconst a = twice!(1);\nconst b = twice!(2);")
        .unwrap();
    session.register_files(std::slice::from_ref(&file)).unwrap();

    let declaration = Arc::clone(&session.registry.get_macro_declarations()[0]);
    let first = session.hooks.get_hooks_for_macro(&declaration).unwrap();
    let second = session.hooks.get_hooks_for_macro(&declaration).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let mut file = file;
    let report = session.transform_file(&mut file).unwrap();
    assert_eq!(report.sites, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(print(&file).ends_with("const a = 1 * 2;\nconst b = 2 * 2;\n"));
}

#[test]
fn reset_forgets_cached_hooks() {
    let (module, runs) = counting_module("noop", |_| {});
    let mut session = session_with(module);
    let text = "macro function noop() {}\nnoop!();";
    compile(&mut session, text);
    session.reset();
    compile(&mut session, text);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn recompiling_a_path_replaces_its_declarations() {
    let (module, runs) = counting_module("m", |api| api.node.replace(api.factory.number(1)));
    let mut session = session_with(module);
    compile(&mut session, "macro function m() {}\nconst a = m!();");

    let second = "const pad = 0;\nmacro function m() {}\nconst b = m!();";
    let out = compile(&mut session, second);
    assert!(out.ends_with("const b = 1;\n"));

    let declarations = session.registry.get_macro_declarations();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0].span.start, second.find("macro").unwrap());
    // the second site ran against the new declaration's own hooks
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

// ============================================================================
// TRANSFORM AND CHECK HOOKS
// ============================================================================

#[test]
fn no_transform_hooks_is_the_identity() {
    let module = MacroModule::new().export("noop", |_| {});
    let mut session = session_with(module);
    let text = "macro function noop() {}\nconst x = noop!(1, 2);\n";
    assert_eq!(compile(&mut session, text), text);

    let factory = NodeFactory::new();
    let file = parse("main.kn", text, &factory).unwrap();
    let site = file.statements[1].clone();
    let declaration = kiln::macros::MacroDeclaration {
        id: file.statements[0].id,
        kind: kiln::ast::MacroKind::Function,
        name: "noop".to_string(),
        shape: kiln::macros::DeclarationShape::Function {
            default_export: false,
        },
        file: "main.kn".into(),
        span: file.statements[0].span,
    };
    let mut context = FileContext::new("main.kn", file.statements.clone());
    let out = execute_transform_hook(
        &MacroHooks::default(),
        &declaration,
        site.clone().into(),
        &mut context,
        &factory,
    );
    assert_eq!(out.node, site.into());
    assert!(out.before.is_empty() && out.after.is_empty());
}

#[test]
fn only_the_last_check_hook_runs() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let module = MacroModule::new().export("typed", move |api| {
        for (name, ty) in [
            ("h1", IntrinsicType::String),
            ("h2", IntrinsicType::Boolean),
            ("h3", IntrinsicType::Number),
        ] {
            let log = Arc::clone(&log);
            api.check(move |api| {
                log.lock().unwrap().push(name);
                Some(api.factory.create_intrinsic(ty))
            });
        }
    });
    let mut session = session_with(module);
    let file = session
        .parse("main.kn", "macro function typed() {}\nconst v = typed!();")
        .unwrap();
    session.register_files(std::slice::from_ref(&file)).unwrap();

    let report = session.check_file(&file, &NullChecker).unwrap();
    assert_eq!(*calls.lock().unwrap(), ["h3"]);
    assert_eq!(report.sites.len(), 1);
    assert_eq!(
        report.sites[0].return_type,
        Some(TypeDefinitionFactory.create_intrinsic(IntrinsicType::Number))
    );
}

#[test]
fn a_statement_replacement_at_an_expression_site_is_rejected() {
    let module = MacroModule::new().export("bad", |api| {
        api.transform(|api| {
            let stmt = api.factory.return_stmt(None);
            api.node.replace(stmt);
        });
    });
    let mut session = session_with(module);
    let result = session.compile_source("main.kn", "macro function bad() {}\nconst x = bad!();");
    assert!(matches!(result, Err(kiln::KilnError::InvalidReplacement { .. })));
}

// ============================================================================
// STATEMENT PATCHER
// ============================================================================

fn anchor_module(anchor: &'static str) -> MacroModule {
    MacroModule::new().export("after_b", move |api| {
        api.transform(move |api| {
            let x = api.factory.expr_stmt(api.factory.ident("X"));
            api.source_file
                .insert_statement_after(x, move |stmt| print_stmt(stmt).trim() == anchor);
            api.node.replace(api.factory.number(1));
        });
    })
}

#[test]
fn insert_after_lands_behind_its_anchor() {
    let mut session = session_with(anchor_module("b();"));
    let out = compile(&mut session, "macro function after_b() {}\na(after_b!());\nb();\nc();");
    assert_eq!(out, "macro function after_b() {}\na(1);\nb();\nX;\nc();\n");
}

#[test]
fn anchors_match_statements_as_parsed() {
    let module = MacroModule::new().export("mac", |api| {
        api.transform(|api| {
            let x = api.factory.expr_stmt(api.factory.ident("X"));
            api.source_file
                .insert_statement_before(x, |stmt| print_stmt(stmt).contains("mac!("));
            api.node.replace(api.factory.number(1));
        });
    });
    let mut session = session_with(module);
    let out = compile(&mut session, "macro function mac() {}\nconst y = mac!();\nz();");
    assert_eq!(out, "macro function mac() {}\nX;\nconst y = 1;\nz();\n");
}

#[test]
fn unmatched_anchor_drops_only_that_patch() {
    let mut session = session_with(anchor_module("nowhere();"));
    let out = compile(&mut session, "macro function after_b() {}\na(after_b!());\nb();\nc();");
    assert_eq!(out, "macro function after_b() {}\na(1);\nb();\nc();\n");
}

// ============================================================================
// DERIVE CHAINING
// ============================================================================

const FOO: &str = "macro derive function Bar() {}\nmacro derive function Baz() {}\nclass Foo derives Bar, Baz {\n    a = 1;\n}\nconst keep = 1;\n";

#[test]
fn derives_apply_in_list_order() {
    let module = MacroModule::new()
        .export("Bar", |api| api.transform(|api| add_field(api, "bar")))
        .export("Baz", |api| {
            api.transform(|api| {
                let Some(mut stmt) = api.node.as_stmt().cloned() else {
                    return;
                };
                if let StmtKind::Class(class) = &mut stmt.kind {
                    let body = api.factory.block(Vec::new());
                    class.members.push(api.factory.method("baz", Vec::new(), body));
                }
                api.node.replace(stmt);
            });
        });
    let mut session = session_with(module);
    let out = compile(&mut session, FOO);
    assert!(out.contains("class Foo derives Bar, Baz {\n    a = 1;\n    bar;\n    baz() {}\n}\n"));

    let file = session.parse("main.kn", &out).unwrap();
    let class = file.statements[2].as_class().unwrap();
    assert_eq!(member_names(class), ["a", "bar", "baz"]);
}

#[test]
fn removal_stops_the_chain_and_elides_the_class() {
    let baz_runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&baz_runs);
    let module = MacroModule::new()
        .export("Bar", |api| api.transform(|api| api.node.remove()))
        .export("Baz", move |api| {
            let counter = Arc::clone(&counter);
            api.transform(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
    let mut session = session_with(module);
    let out = compile(&mut session, FOO);
    assert_eq!(
        out,
        "macro derive function Bar() {}\nmacro derive function Baz() {}\nconst keep = 1;\n"
    );
    assert_eq!(baz_runs.load(Ordering::SeqCst), 0);
}

// ============================================================================
// DEFER LOWERING
// ============================================================================

#[test]
fn bodies_without_defer_are_untouched() {
    let factory = NodeFactory::new();
    let text = "function f(x) {\n    if (x) {\n        return 1;\n    }\n    return 2;\n}\n";
    let mut file = parse("main.kn", text, &factory).unwrap();
    let StmtKind::Function(function) = &mut file.statements[0].kind else {
        panic!("expected a function");
    };
    let before = function.body.clone();
    assert_eq!(
        lower_function_body(&mut function.body, false, &factory),
        DeferState::NoDefer
    );
    assert_eq!(function.body, before);
    assert_eq!(print(&file), text);
}

fn is_cleanup(stmt: &Stmt) -> bool {
    let StmtKind::Block(block) = &stmt.kind else {
        return false;
    };
    matches!(
        block.stmts.first().map(|s| &s.kind),
        Some(StmtKind::Expr(expr)) if matches!(
            &expr.kind,
            ExprKind::Assign { target, .. } if target.as_ident() == Some(DEFERRED_FLAG)
        )
    )
}

/// Counts returns, and returns not directly preceded by a cleanup block.
#[derive(Default)]
struct ReturnAudit {
    returns: usize,
    uncovered: usize,
}

impl Visit for ReturnAudit {
    fn visit_stmts(&mut self, stmts: &[Stmt]) {
        for (i, stmt) in stmts.iter().enumerate() {
            if matches!(stmt.kind, StmtKind::Return(_)) {
                self.returns += 1;
                if i == 0 || !is_cleanup(&stmts[i - 1]) {
                    self.uncovered += 1;
                }
            }
            self.visit_stmt(stmt);
        }
    }
}

#[test]
fn every_exit_runs_the_registered_actions() {
    let mut session = session_with(MacroModule::new());
    let out = compile(
        &mut session,
        "function f(x) {\n    defer {\n        one();\n    }\n    if (x) {\n        return 1;\n    }\n    defer {\n        two();\n    }\n    while (x) {\n        return 2;\n    }\n    work();\n}",
    );
    // two returns, the fall-through exit and the finally guard
    assert_eq!(out.matches("__deferred = true;").count(), 4);
    assert_eq!(out.matches("__defer.push(").count(), 2);
    assert!(out.find("one();").unwrap() < out.find("return 1;").unwrap());
    assert!(out.find("return 1;").unwrap() < out.find("two();").unwrap());

    let file = session.parse("main.kn", &out).unwrap();
    let mut audit = ReturnAudit::default();
    audit.visit_file(&file);
    assert_eq!(audit.returns, 2);
    assert_eq!(audit.uncovered, 0);
}

#[test]
fn async_bodies_await_their_actions() {
    let mut session = session_with(MacroModule::new());
    let out = compile(
        &mut session,
        "async function f() {\n    defer {\n        await flush();\n    }\n    defer {\n        close();\n    }\n}",
    );
    assert!(out.contains("__defer.push(async () => {"));
    assert!(out.contains("__defer.push(() => {"));
    assert!(out.contains("await __action();"));
}

#[test]
fn defer_outside_a_function_body_is_an_error() {
    let mut session = session_with(MacroModule::new());
    let text = "function f() {}\ndefer {\n    x();\n}";
    let result = session.compile_source("main.kn", text);
    let Err(error @ kiln::KilnError::MisplacedDefer { .. }) = result else {
        panic!("expected a misplaced defer");
    };
    assert_eq!(label_offsets(&error), [text.find("defer").unwrap()]);
}

// ============================================================================
// ROUND TRIP
// ============================================================================

#[test]
fn files_without_macros_round_trip() {
    let factory = NodeFactory::new();
    let text = "import { a } from \"./a\";\nexport function add(x, y) {\n    return x + y * 2;\n}\nconst o = { k: [1, 2], \"q r\": null };\nlet t = typeof o === \"object\" && !(a || false);\n";
    let expected = print(&parse("main.kn", text, &factory).unwrap());
    let mut session = session_with(MacroModule::new());
    assert_eq!(compile(&mut session, text), expected);
    assert_eq!(expected, text);
}
