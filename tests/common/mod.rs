//! # Kiln Test Harness
//!
//! Shared helpers for the integration tests: sessions wired to in-process
//! macro modules, and a loader for the golden expansion cases under
//! `tests/fixtures/expand`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use miette::Diagnostic;
use walkdir::WalkDir;

use kiln::ast::{ClassDecl, MemberKind, StmtKind};
use kiln::config::EngineConfig;
use kiln::macros::std::std_module;
use kiln::macros::{MacroModule, ModuleTable, TransformApi};
use kiln::CompilationSession;

/// A golden case: `<name>.kn` compiled with the standard macros must print
/// exactly `<name>.out`.
#[derive(Debug, Clone)]
pub struct GoldenCase {
    pub name: String,
    pub path: PathBuf,
    pub input: String,
    pub expected: String,
}

/// Discovers every `.kn` file in `dir` that has a sibling `.out` file.
pub fn load_golden_cases(dir: &Path) -> Vec<GoldenCase> {
    let mut cases = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "kn") {
            continue;
        }
        let expected_path = path.with_extension("out");
        let Ok(expected) = std::fs::read_to_string(&expected_path) else {
            continue;
        };
        let input = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("failed to read '{}': {e}", path.display()));
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        cases.push(GoldenCase {
            name,
            path: path.to_path_buf(),
            input,
            expected,
        });
    }
    cases
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// A session whose `main.kn` macros come from `module`. Any other declaring
/// file falls back to the standard macros.
pub fn session_with(module: MacroModule) -> CompilationSession {
    session_with_modules(vec![("main.kn", module)])
}

pub fn session_with_modules(modules: Vec<(&str, MacroModule)>) -> CompilationSession {
    let mut table = ModuleTable::new().with_fallback(std_module());
    for (path, module) in modules {
        table.insert(path, module);
    }
    CompilationSession::new(EngineConfig::default(), table).expect("default config is valid")
}

/// Compiles one `main.kn` source and returns the printed result.
pub fn compile(session: &mut CompilationSession, text: &str) -> String {
    session
        .compile_source("main.kn", text)
        .unwrap_or_else(|e| panic!("compilation failed: {e}"))
}

/// Compiles several `(path, text)` inputs as one program.
pub fn compile_program(session: &mut CompilationSession, inputs: &[(&str, &str)]) -> Vec<String> {
    let inputs: Vec<(PathBuf, String)> = inputs
        .iter()
        .map(|(path, text)| (PathBuf::from(path), text.to_string()))
        .collect();
    session
        .compile_files(&inputs)
        .unwrap_or_else(|e| panic!("compilation failed: {e}"))
        .into_iter()
        .map(|file| file.text)
        .collect()
}

/// A module exporting `name` whose body bumps the returned counter each time
/// it runs and registers `transform` as its only transform hook.
pub fn counting_module<F>(name: &str, transform: F) -> (MacroModule, Arc<AtomicUsize>)
where
    F: Fn(&mut TransformApi<'_>) + Send + Sync + Clone + 'static,
{
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let module = MacroModule::new().export(name, move |api| {
        counter.fetch_add(1, Ordering::SeqCst);
        api.transform(transform.clone());
    });
    (module, runs)
}

/// Start offsets of a diagnostic's labels. Panics if it carries no source.
pub fn label_offsets(diagnostic: &dyn Diagnostic) -> Vec<usize> {
    assert!(diagnostic.source_code().is_some(), "diagnostic has no source code");
    diagnostic
        .labels()
        .map(|labels| labels.map(|label| label.offset()).collect())
        .unwrap_or_default()
}

/// Member names of a class in declaration order.
pub fn member_names(class: &ClassDecl) -> Vec<String> {
    class
        .members
        .iter()
        .map(|member| match &member.kind {
            MemberKind::Field { name, .. } => name.clone(),
            MemberKind::Method(method) => method.name.clone(),
        })
        .collect()
}

/// Appends a field named `field` to the class at the site.
pub fn add_field(api: &mut TransformApi<'_>, field: &str) {
    let Some(mut stmt) = api.node.as_stmt().cloned() else {
        return;
    };
    if let StmtKind::Class(class) = &mut stmt.kind {
        class.members.push(api.factory.field(field, None));
    }
    api.node.replace(stmt);
}
